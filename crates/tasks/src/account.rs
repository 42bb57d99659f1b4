//! User accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agrolens_core::{Credits, UserId};

/// A prepaid account.
///
/// The balance is mutated only through ledger operations that append a
/// matching transaction row; it never goes negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub balance: Credits,
    pub created_at: DateTime<Utc>,
}
