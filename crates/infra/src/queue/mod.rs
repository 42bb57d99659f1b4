//! Durable task queue abstraction.
//!
//! The queue is the handoff between the producer and consumer processes:
//! - **Durable**: published messages survive a broker restart.
//! - **At-least-once**: an unacknowledged message is eventually redelivered
//!   to some consumer; consumers must be idempotent.
//! - **Manual acknowledgment**: a message is acknowledged only after its
//!   settlement is durably committed, never before.
//! - **No requeue on reject**: rejected messages go to a dead-letter stream;
//!   the owning task is marked failed instead of being retried.
//! - **No ordering guarantees** across tasks, even for the same user.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis_streams;

use std::sync::Arc;
use std::time::Duration;

use agrolens_tasks::TaskMessage;

/// A message handed to the consumer, with the broker bookkeeping needed to
/// ack or reject it later.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub message: TaskMessage,
    /// Broker-assigned delivery tag (stream entry id).
    pub tag: String,
    /// True when the broker knows a previous delivery attempt existed.
    pub redelivered: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("broker connection error: {0}")]
    Connection(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("receive failed: {0}")]
    Receive(String),

    #[error("acknowledge failed: {0}")]
    Acknowledge(String),

    #[error("malformed message: {0}")]
    Decode(String),
}

/// Producer/consumer handle onto the durable task queue.
///
/// Each process owns its own queue handle; handles are never shared across
/// processes. `receive` returns at most one delivery so the consumer stays
/// strictly sequential.
#[async_trait::async_trait]
pub trait TaskQueue: Send + Sync {
    /// Publish with persistent delivery.
    async fn publish(&self, message: &TaskMessage) -> Result<(), QueueError>;

    /// Wait up to `timeout` for the next delivery.
    async fn receive(&self, timeout: Duration) -> Result<Option<Delivery>, QueueError>;

    /// Mark a delivery as processed. Must happen only after the settlement
    /// commit.
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Negative-acknowledge without requeueing (dead-letter path).
    async fn reject(&self, delivery: &Delivery) -> Result<(), QueueError>;
}

#[async_trait::async_trait]
impl<Q> TaskQueue for Arc<Q>
where
    Q: TaskQueue + ?Sized,
{
    async fn publish(&self, message: &TaskMessage) -> Result<(), QueueError> {
        (**self).publish(message).await
    }

    async fn receive(&self, timeout: Duration) -> Result<Option<Delivery>, QueueError> {
        (**self).receive(timeout).await
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        (**self).ack(delivery).await
    }

    async fn reject(&self, delivery: &Delivery) -> Result<(), QueueError> {
        (**self).reject(delivery).await
    }
}
