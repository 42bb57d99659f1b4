use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use agrolens_core::{Credits, TransactionId, UserId};

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Deduct,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Deduct => "deduct",
        }
    }
}

impl core::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only ledger entry. Amounts are always positive; the kind
/// carries the sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: TransactionId,
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub amount: Credits,
    pub created_at: DateTime<Utc>,
}

/// Ledger rule violation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Amount was zero or negative.
    #[error("amount must be positive")]
    InvalidAmount,

    /// Deduction larger than the current balance.
    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        available: Credits,
        requested: Credits,
    },
}

/// Apply a deposit to a balance.
pub fn deposit(balance: Credits, amount: Credits) -> Result<Credits, LedgerError> {
    if !amount.is_positive() {
        return Err(LedgerError::InvalidAmount);
    }
    balance
        .checked_add(amount)
        .ok_or(LedgerError::InvalidAmount)
}

/// Apply a deduction to a balance. Never lets the balance go negative.
pub fn deduct(balance: Credits, amount: Credits) -> Result<Credits, LedgerError> {
    if !amount.is_positive() {
        return Err(LedgerError::InvalidAmount);
    }
    balance
        .checked_sub(amount)
        .ok_or(LedgerError::InsufficientFunds {
            available: balance,
            requested: amount,
        })
}

/// Recompute a balance from the transaction log.
///
/// The log is the source of truth: a stored balance that disagrees with the
/// replayed value indicates a broken invariant.
pub fn replay<'a, I>(entries: I) -> Credits
where
    I: IntoIterator<Item = &'a Transaction>,
{
    entries
        .into_iter()
        .fold(Credits::ZERO, |acc, entry| match entry.kind {
            TransactionKind::Deposit => acc
                .checked_add(entry.amount)
                .unwrap_or(acc),
            TransactionKind::Deduct => acc
                .checked_sub(entry.amount)
                .unwrap_or(acc),
        })
}
