//! `agrolens-ledger` — balance ledger rules.
//!
//! Pure domain logic for the prepaid credit ledger: every balance mutation is
//! paired with exactly one append-only transaction entry. Storage backends
//! call into this crate so the rules exist in one place.

pub mod ledger;

pub use ledger::{deduct, deposit, replay, LedgerError, Transaction, TransactionKind};
