//! Registered model artifacts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agrolens_core::{Credits, ModelId};

/// A priced, externally versioned model the service offers.
///
/// `artifact_path` is an opaque reference the inference engine resolves
/// (e.g. "entity/project/artifact:v3"); the pipeline never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model_id: ModelId,
    pub name: String,
    pub description: String,
    pub cost: Credits,
    pub artifact_path: String,
    pub created_at: DateTime<Utc>,
}

/// Input for registering a new model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub description: String,
    pub cost: Credits,
    pub artifact_path: String,
}
