//! Uploaded image records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agrolens_core::{ImageId, UserId};

/// One uploaded field photo.
///
/// `public_url` is browser-reachable; `internal_url` is what the worker uses
/// to fetch bytes from inside the deployment. `object_name` is the blob store
/// key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredImage {
    pub image_id: ImageId,
    pub user_id: UserId,
    pub public_url: String,
    pub internal_url: String,
    pub object_name: String,
    pub created_at: DateTime<Utc>,
}
