//! Worker process: drains the task queue and settles tasks.
//!
//! Backend wiring mirrors the api binary: `DATABASE_URL` selects Postgres,
//! `REDIS_URL` the Redis Streams queue (with the `redis` feature),
//! `BLOB_PUBLIC_URL`/`BLOB_INTERNAL_URL` the HTTP blob store, otherwise
//! everything runs in-memory. The inference engine itself is deployment
//! specific; without one configured the worker answers with the fixed labels
//! from `ENGINE_LABELS` (a JSON object), which is the dev mode.

use std::sync::Arc;

use agrolens_inference::{BlobStore, HttpBlobStore, InMemoryBlobStore, NoEnrichment, StaticEngine};
use agrolens_infra::{InMemoryStore, InMemoryTaskQueue, ServiceStore, TaskQueue};
use agrolens_pipeline::{Consumer, ConsumerConfig};
use agrolens_tasks::LabelMap;

#[tokio::main]
async fn main() {
    agrolens_observability::init();

    let store: Arc<dyn ServiceStore> = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .connect_lazy(&url)
                .expect("invalid DATABASE_URL");
            let store = agrolens_infra::PostgresStore::new(pool);
            store.migrate().await.expect("database migration failed");
            tracing::info!("using postgres store");
            Arc::new(store)
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set; using in-memory store");
            Arc::new(InMemoryStore::new())
        }
    };

    let queue: Arc<dyn TaskQueue> = match std::env::var("REDIS_URL") {
        #[cfg(feature = "redis")]
        Ok(url) => {
            use agrolens_infra::{connect_with_retry, RedisQueueConfig, RetryPolicy};
            let config = RedisQueueConfig::new(url, format!("worker-{}", uuid::Uuid::now_v7()));
            let queue = connect_with_retry(&RetryPolicy::default(), || {
                agrolens_infra::RedisStreamsQueue::connect(config.clone())
            })
            .await
            .expect("could not connect to redis");
            tracing::info!("using redis streams queue");
            Arc::new(queue)
        }
        #[cfg(not(feature = "redis"))]
        Ok(_) => {
            tracing::warn!("REDIS_URL set but the redis feature is disabled; using in-memory queue");
            Arc::new(InMemoryTaskQueue::new())
        }
        Err(_) => {
            tracing::warn!("REDIS_URL not set; using in-memory queue");
            Arc::new(InMemoryTaskQueue::new())
        }
    };

    let blobs: Arc<dyn BlobStore> = match (
        std::env::var("BLOB_PUBLIC_URL"),
        std::env::var("BLOB_INTERNAL_URL"),
    ) {
        (Ok(public), Ok(internal)) => {
            tracing::info!("using http blob store");
            Arc::new(HttpBlobStore::new(public, internal))
        }
        _ => {
            tracing::warn!("BLOB_PUBLIC_URL/BLOB_INTERNAL_URL not set; using in-memory blob store");
            Arc::new(InMemoryBlobStore::new())
        }
    };

    let labels: LabelMap = std::env::var("ENGINE_LABELS")
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default();
    if labels.is_empty() {
        tracing::warn!("no inference backend configured; answering with empty labels");
    }

    let consumer = Consumer::new(
        store,
        queue,
        StaticEngine::answering(labels),
        blobs,
        NoEnrichment,
    )
    .with_config(ConsumerConfig::default());

    let handle = consumer.spawn();

    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    tracing::info!("shutdown signal received");
    handle.shutdown().await;
}
