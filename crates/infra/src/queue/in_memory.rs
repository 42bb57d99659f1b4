//! In-memory task queue for tests/dev.
//!
//! Same contract as the Redis Streams backend: at-least-once with manual
//! acks, reject dead-letters instead of requeueing. An unacked delivery stays
//! invisible until a test calls [`InMemoryTaskQueue::redeliver_unacked`],
//! which models a broker recovering abandoned deliveries after a consumer
//! crash.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use agrolens_tasks::TaskMessage;
use tokio::sync::Notify;

use super::{Delivery, QueueError, TaskQueue};

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Delivery>,
    unacked: HashMap<String, Delivery>,
    dead_lettered: Vec<TaskMessage>,
    next_tag: u64,
}

/// In-memory queue with the durable-broker contract.
#[derive(Debug, Default)]
pub struct InMemoryTaskQueue {
    state: Mutex<QueueState>,
    published: Notify,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, QueueState>, QueueError> {
        self.state
            .lock()
            .map_err(|_| QueueError::Connection("queue state poisoned".to_string()))
    }

    /// Number of messages waiting for a consumer.
    pub fn pending_len(&self) -> usize {
        self.state.lock().map(|s| s.pending.len()).unwrap_or(0)
    }

    /// Messages rejected onto the dead-letter side.
    pub fn dead_letters(&self) -> Vec<TaskMessage> {
        self.state
            .lock()
            .map(|s| s.dead_lettered.clone())
            .unwrap_or_default()
    }

    /// Put every delivered-but-unacked message back at the front of the
    /// queue, flagged as redelivered. Models broker recovery after a
    /// consumer crash.
    pub fn redeliver_unacked(&self) {
        if let Ok(mut state) = self.state.lock() {
            let mut abandoned: Vec<Delivery> = state.unacked.drain().map(|(_, d)| d).collect();
            abandoned.sort_by(|a, b| a.tag.cmp(&b.tag));
            for mut delivery in abandoned.into_iter().rev() {
                delivery.redelivered = true;
                state.pending.push_front(delivery);
            }
            self.published.notify_waiters();
        }
    }
}

#[async_trait::async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn publish(&self, message: &TaskMessage) -> Result<(), QueueError> {
        {
            let mut state = self.lock()?;
            let tag = format!("{:016}", state.next_tag);
            state.next_tag += 1;
            state.pending.push_back(Delivery {
                message: message.clone(),
                tag,
                redelivered: false,
            });
        }
        self.published.notify_waiters();
        Ok(())
    }

    async fn receive(&self, timeout: Duration) -> Result<Option<Delivery>, QueueError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.published.notified();
            {
                let mut state = self.lock()?;
                if let Some(delivery) = state.pending.pop_front() {
                    state.unacked.insert(delivery.tag.clone(), delivery.clone());
                    return Ok(Some(delivery));
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut state = self.lock()?;
        state
            .unacked
            .remove(&delivery.tag)
            .map(|_| ())
            .ok_or_else(|| QueueError::Acknowledge(format!("unknown delivery tag {}", delivery.tag)))
    }

    async fn reject(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut state = self.lock()?;
        let delivery = state
            .unacked
            .remove(&delivery.tag)
            .ok_or_else(|| QueueError::Acknowledge(format!("unknown delivery tag {}", delivery.tag)))?;
        state.dead_lettered.push(delivery.message);
        Ok(())
    }
}
