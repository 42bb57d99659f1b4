//! `agrolens-pipeline` — producer and consumer of the inference task queue.
//!
//! The producer validates a submission, writes the task row and publishes the
//! broker message. The consumer drains the queue, runs inference and settles
//! each task (prediction + completion + charge) in one atomic store
//! operation. Both sides are generic over the trait seams in
//! `agrolens-infra` and `agrolens-inference`, so every test here runs against
//! the in-memory backends.

pub mod consumer;
pub mod producer;

pub use consumer::{Consumer, ConsumerConfig, ConsumerHandle, ConsumerStats};
pub use producer::{Producer, SubmissionReceipt, SubmitError};
