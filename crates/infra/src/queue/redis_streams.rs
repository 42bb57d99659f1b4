//! Redis Streams-backed task queue (durable, at-least-once delivery).
//!
//! Uses Redis Streams (XADD/XREADGROUP) to provide:
//! - **Durable delivery**: messages persist until acknowledged
//! - **At-least-once**: unacked messages are reclaimed and redelivered
//! - **Consumer groups**: multiple workers share one stream
//! - **Dead-letter handling**: rejected messages move to a DLQ stream
//!
//! Stream layout:
//! - stream key: `agrolens:tasks`
//! - consumer group: `agrolens.workers`
//! - dead-letter stream: `agrolens:tasks:dlq`
//!
//! The redis client is sync; every command runs under
//! `tokio::task::spawn_blocking` so the worker's async loop never blocks a
//! runtime thread.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use agrolens_tasks::TaskMessage;
use tracing::warn;

use super::{Delivery, QueueError, TaskQueue};

const DEFAULT_STREAM_KEY: &str = "agrolens:tasks";
const DEFAULT_DLQ_KEY: &str = "agrolens:tasks:dlq";
const DEFAULT_GROUP: &str = "agrolens.workers";

/// Pending entries idle longer than this are reclaimed for redelivery.
const DEFAULT_CLAIM_IDLE_MS: u64 = 60_000;

#[derive(Debug, Clone)]
pub struct RedisQueueConfig {
    pub url: String,
    pub stream_key: String,
    pub dlq_key: String,
    pub group: String,
    /// Unique consumer name within the group.
    pub consumer: String,
    pub claim_idle_ms: u64,
}

impl RedisQueueConfig {
    pub fn new(url: impl Into<String>, consumer: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            stream_key: DEFAULT_STREAM_KEY.to_string(),
            dlq_key: DEFAULT_DLQ_KEY.to_string(),
            group: DEFAULT_GROUP.to_string(),
            consumer: consumer.into(),
            claim_idle_ms: DEFAULT_CLAIM_IDLE_MS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedisStreamsQueue {
    client: Arc<redis::Client>,
    config: RedisQueueConfig,
}

impl RedisStreamsQueue {
    /// Open the client and ensure the consumer group exists.
    pub fn connect(config: RedisQueueConfig) -> Result<Self, QueueError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        let queue = Self {
            client: Arc::new(client),
            config,
        };
        queue.ensure_consumer_group()?;
        Ok(queue)
    }

    fn conn(&self) -> Result<redis::Connection, QueueError> {
        self.client
            .get_connection()
            .map_err(|e| QueueError::Connection(e.to_string()))
    }

    /// Idempotent: the "BUSYGROUP" error from an existing group is ignored.
    fn ensure_consumer_group(&self) -> Result<(), QueueError> {
        let mut conn = self.conn()?;

        // XGROUP CREATE with MKSTREAM creates the stream if it doesn't exist.
        let _: Result<String, _> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_key)
            .arg(&self.config.group)
            .arg("0")
            .arg("MKSTREAM")
            .query(&mut conn);

        Ok(())
    }

    fn publish_sync(&self, message: &TaskMessage) -> Result<(), QueueError> {
        let payload = message
            .encode()
            .map_err(|e| QueueError::Publish(e.to_string()))?;

        let mut conn = self.conn()?;
        let _: String = redis::cmd("XADD")
            .arg(&self.config.stream_key)
            .arg("*")
            .arg("task_id")
            .arg(message.task_id.as_i64().to_string())
            .arg("payload")
            .arg(&payload)
            .query(&mut conn)
            .map_err(|e| QueueError::Publish(format!("XADD failed: {e}")))?;

        Ok(())
    }

    fn receive_sync(&self, block_ms: u64) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.conn()?;

        // Abandoned deliveries first, then new entries.
        if let Some(delivery) = self.claim_pending_sync(&mut conn)? {
            return Ok(Some(delivery));
        }
        self.read_new_sync(&mut conn, block_ms)
    }

    /// Reclaim one pending entry that has been idle past the claim threshold.
    fn claim_pending_sync(
        &self,
        conn: &mut redis::Connection,
    ) -> Result<Option<Delivery>, QueueError> {
        let pending: redis::RedisResult<Vec<(String, String, u64, u64)>> = redis::cmd("XPENDING")
            .arg(&self.config.stream_key)
            .arg(&self.config.group)
            .arg("IDLE")
            .arg(self.config.claim_idle_ms.to_string())
            .arg("-")
            .arg("+")
            .arg("1")
            .query(conn);

        let pending_ids: Vec<String> = match pending {
            Ok(entries) => entries.into_iter().map(|(id, _, _, _)| id).collect(),
            Err(_) => return Ok(None),
        };
        if pending_ids.is_empty() {
            return Ok(None);
        }

        let claimed: Vec<redis::Value> = redis::cmd("XCLAIM")
            .arg(&self.config.stream_key)
            .arg(&self.config.group)
            .arg(&self.config.consumer)
            .arg(self.config.claim_idle_ms.to_string())
            .arg(&pending_ids[..])
            .query(conn)
            .map_err(|e| QueueError::Receive(format!("XCLAIM failed: {e}")))?;

        for entry in claimed {
            match self.parse_entry(entry, true) {
                Ok(delivery) => return Ok(Some(delivery)),
                Err(e) => warn!(error = %e, "skipping unparseable claimed entry"),
            }
        }
        Ok(None)
    }

    fn read_new_sync(
        &self,
        conn: &mut redis::Connection,
        block_ms: u64,
    ) -> Result<Option<Delivery>, QueueError> {
        let result: redis::RedisResult<HashMap<String, Vec<redis::Value>>> =
            redis::cmd("XREADGROUP")
                .arg("GROUP")
                .arg(&self.config.group)
                .arg(&self.config.consumer)
                .arg("COUNT")
                .arg("1")
                .arg("BLOCK")
                .arg(block_ms.to_string())
                .arg("STREAMS")
                .arg(&self.config.stream_key)
                .arg(">")
                .query(conn);

        let stream_data = match result {
            Ok(data) => data,
            // Nil reply means the blocking read timed out with nothing new.
            Err(e) if e.kind() == redis::ErrorKind::TypeError => return Ok(None),
            Err(e) => return Err(QueueError::Receive(format!("XREADGROUP failed: {e}"))),
        };

        let entries = stream_data
            .get(&self.config.stream_key)
            .cloned()
            .unwrap_or_default();

        for entry in entries {
            match self.parse_entry(entry, false) {
                Ok(delivery) => return Ok(Some(delivery)),
                Err(e) => warn!(error = %e, "skipping unparseable stream entry"),
            }
        }
        Ok(None)
    }

    fn ack_sync(&self, tag: &str) -> Result<(), QueueError> {
        let mut conn = self.conn()?;
        let _: u64 = redis::cmd("XACK")
            .arg(&self.config.stream_key)
            .arg(&self.config.group)
            .arg(tag)
            .query(&mut conn)
            .map_err(|e| QueueError::Acknowledge(format!("XACK failed: {e}")))?;
        Ok(())
    }

    /// Move the entry to the DLQ stream and ack it on the main stream, so it
    /// is never requeued.
    fn reject_sync(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let payload = delivery
            .message
            .encode()
            .map_err(|e| QueueError::Acknowledge(e.to_string()))?;

        let mut conn = self.conn()?;
        let _: String = redis::cmd("XADD")
            .arg(&self.config.dlq_key)
            .arg("*")
            .arg("original_message_id")
            .arg(&delivery.tag)
            .arg("failed_at")
            .arg(chrono::Utc::now().to_rfc3339())
            .arg("payload")
            .arg(&payload)
            .query(&mut conn)
            .map_err(|e| QueueError::Acknowledge(format!("DLQ XADD failed: {e}")))?;

        warn!(
            message_id = %delivery.tag,
            task_id = delivery.message.task_id.as_i64(),
            "message sent to dead-letter queue"
        );

        let _: u64 = redis::cmd("XACK")
            .arg(&self.config.stream_key)
            .arg(&self.config.group)
            .arg(&delivery.tag)
            .query(&mut conn)
            .map_err(|e| QueueError::Acknowledge(format!("XACK failed: {e}")))?;
        Ok(())
    }

    /// Entry format: [message_id, [field1, value1, field2, value2, ...]].
    fn parse_entry(&self, entry: redis::Value, redelivered: bool) -> Result<Delivery, QueueError> {
        let entry_vec = match entry {
            redis::Value::Bulk(v) => v,
            _ => return Err(QueueError::Decode("invalid entry format".to_string())),
        };
        if entry_vec.len() < 2 {
            return Err(QueueError::Decode("entry too short".to_string()));
        }

        let tag = match &entry_vec[0] {
            redis::Value::Data(data) => String::from_utf8_lossy(data).to_string(),
            _ => return Err(QueueError::Decode("invalid message id format".to_string())),
        };

        let fields_vec = match &entry_vec[1] {
            redis::Value::Bulk(v) => v,
            _ => return Err(QueueError::Decode("invalid fields format".to_string())),
        };

        let mut payload: Option<&[u8]> = None;
        for chunk in fields_vec.chunks(2) {
            if let [redis::Value::Data(key), redis::Value::Data(value)] = chunk {
                if key.as_slice() == b"payload" {
                    payload = Some(value);
                }
            }
        }

        let payload =
            payload.ok_or_else(|| QueueError::Decode("missing payload field".to_string()))?;
        let message = TaskMessage::decode(payload)
            .map_err(|e| QueueError::Decode(e.to_string()))?;

        Ok(Delivery {
            message,
            tag,
            redelivered,
        })
    }
}

#[async_trait::async_trait]
impl TaskQueue for RedisStreamsQueue {
    async fn publish(&self, message: &TaskMessage) -> Result<(), QueueError> {
        let queue = self.clone();
        let message = message.clone();
        tokio::task::spawn_blocking(move || queue.publish_sync(&message))
            .await
            .map_err(|e| QueueError::Publish(e.to_string()))?
    }

    async fn receive(&self, timeout: Duration) -> Result<Option<Delivery>, QueueError> {
        let queue = self.clone();
        let block_ms = timeout.as_millis().min(u128::from(u64::MAX)) as u64;
        tokio::task::spawn_blocking(move || queue.receive_sync(block_ms))
            .await
            .map_err(|e| QueueError::Receive(e.to_string()))?
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let queue = self.clone();
        let tag = delivery.tag.clone();
        tokio::task::spawn_blocking(move || queue.ack_sync(&tag))
            .await
            .map_err(|e| QueueError::Acknowledge(e.to_string()))?
    }

    async fn reject(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let queue = self.clone();
        let delivery = delivery.clone();
        tokio::task::spawn_blocking(move || queue.reject_sync(&delivery))
            .await
            .map_err(|e| QueueError::Acknowledge(e.to_string()))?
    }
}
