//! `agrolens-core` — shared domain primitives.
//!
//! Identifiers, money and the domain error type. No infrastructure concerns.

pub mod credits;
pub mod error;
pub mod id;

pub use credits::Credits;
pub use error::{DomainError, DomainResult};
pub use id::{ImageId, ModelId, PredictionId, TaskId, TransactionId, UserId};
