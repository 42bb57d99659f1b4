//! `agrolens-infra` — storage and broker implementations.
//!
//! Everything here implements a trait seam the pipeline depends on:
//! - [`store::ServiceStore`]: the task ledger store (in-memory and Postgres);
//! - [`queue::TaskQueue`]: the durable task queue (in-memory and Redis
//!   Streams behind the `redis` feature);
//! - [`retry`]: the bounded exponential backoff used when connecting to
//!   external services.
//!
//! In-memory implementations are first-class citizens: tests and dev mode run
//! against them with identical semantics.

pub mod queue;
pub mod retry;
pub mod store;

pub use queue::{Delivery, QueueError, TaskQueue};
pub use queue::in_memory::InMemoryTaskQueue;
#[cfg(feature = "redis")]
pub use queue::redis_streams::{RedisQueueConfig, RedisStreamsQueue};
pub use retry::{connect_with_retry, RetryPolicy};
pub use store::{ServiceStore, StoreError};
pub use store::in_memory::InMemoryStore;
pub use store::postgres::PostgresStore;
