//! Backend wiring for the HTTP surface.
//!
//! `DATABASE_URL` selects the Postgres store, `REDIS_URL` the Redis Streams
//! queue (requires the `redis` feature), `BLOB_PUBLIC_URL` plus
//! `BLOB_INTERNAL_URL` the HTTP blob store. Without them everything runs
//! in-memory, which is the dev and test mode.

use std::sync::Arc;

use agrolens_inference::{BlobStore, HttpBlobStore, InMemoryBlobStore};
use agrolens_infra::{InMemoryStore, InMemoryTaskQueue, ServiceStore, TaskQueue};
use agrolens_pipeline::Producer;

/// Everything the handlers need, behind trait objects so the same router
/// serves any backend combination.
pub struct AppServices {
    pub store: Arc<dyn ServiceStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub queue: Arc<dyn TaskQueue>,
    pub producer: Producer<Arc<dyn ServiceStore>, Arc<dyn TaskQueue>>,
}

impl AppServices {
    pub fn new(
        store: Arc<dyn ServiceStore>,
        queue: Arc<dyn TaskQueue>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        let producer = Producer::new(store.clone(), queue.clone());
        Self {
            store,
            blobs,
            queue,
            producer,
        }
    }

    /// Fully in-memory wiring for tests and dev mode.
    pub fn in_memory() -> Arc<Self> {
        Arc::new(Self::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryTaskQueue::new()),
            Arc::new(InMemoryBlobStore::new()),
        ))
    }
}

/// Build services from the environment.
pub async fn build_services() -> Arc<AppServices> {
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
            let config = RedisQueueConfig::new(url, format!("api-{}", uuid::Uuid::now_v7()));
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

    Arc::new(AppServices::new(store, queue, blobs))
}
