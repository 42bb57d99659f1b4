//! Worker side of the pipeline.
//!
//! The consumer drains the task queue one message at a time. Per delivery:
//! duplicate check, fetch the referenced rows, fetch the image bytes, run
//! inference, bucket severity, optionally enrich the growth stage, look up
//! the recommendation, then settle atomically (prediction + task completion +
//! charge). The delivery is acked only after the settlement commit; any
//! processing failure marks the task failed and dead-letters the message.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use agrolens_inference::{BlobError, BlobStore, EngineError, GrowthStageProvider, InferenceEngine};
use agrolens_infra::{Delivery, QueueError, ServiceStore, StoreError, TaskQueue};
use agrolens_tasks::{
    labels::GROWTH_STAGE_HEAD, PredictionDraft, Severity, TaskMessage, FALLBACK_ADVICE,
};

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// How long one receive call blocks before the loop re-checks shutdown.
    pub receive_timeout: Duration,
    /// Name for logging.
    pub name: String,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            receive_timeout: Duration::from_secs(1),
            name: "worker".to_string(),
        }
    }
}

/// Consumer runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ConsumerStats {
    pub messages_processed: u64,
    pub tasks_settled: u64,
    pub duplicates_skipped: u64,
    pub tasks_failed: u64,
}

/// Handle to a spawned consumer.
pub struct ConsumerHandle {
    shutdown: mpsc::Sender<()>,
    join: JoinHandle<()>,
    stats: Arc<Mutex<ConsumerStats>>,
}

impl ConsumerHandle {
    /// Request graceful shutdown and wait for the loop to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(()).await;
        let _ = self.join.await;
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Why a single message could not be processed. The task is failed and the
/// message dead-lettered with this as the recorded cause.
#[derive(Debug, thiserror::Error)]
enum ProcessError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

enum Outcome {
    Settled,
    /// The task already has a prediction; the delivery is a duplicate.
    Duplicate,
}

/// Queue-driven worker, generic over every collaborator seam.
pub struct Consumer<S, Q, E, B, G> {
    store: S,
    queue: Q,
    engine: E,
    blobs: B,
    enrichment: G,
    config: ConsumerConfig,
    stats: Arc<Mutex<ConsumerStats>>,
}

impl<S, Q, E, B, G> Consumer<S, Q, E, B, G>
where
    S: ServiceStore,
    Q: TaskQueue,
    E: InferenceEngine,
    B: BlobStore,
    G: GrowthStageProvider,
{
    pub fn new(store: S, queue: Q, engine: E, blobs: B, enrichment: G) -> Self {
        Self {
            store,
            queue,
            engine,
            blobs,
            enrichment,
            config: ConsumerConfig::default(),
            stats: Arc::new(Mutex::new(ConsumerStats::default())),
        }
    }

    pub fn with_config(mut self, config: ConsumerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Run until a shutdown signal arrives.
    pub async fn run(&self, mut shutdown: mpsc::Receiver<()>) {
        info!(consumer = %self.config.name, "consumer started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                received = self.queue.receive(self.config.receive_timeout) => match received {
                    Ok(Some(delivery)) => self.handle_delivery(delivery).await,
                    Ok(None) => {}
                    Err(e) => {
                        error!(consumer = %self.config.name, error = %e, "receive failed");
                        tokio::time::sleep(self.config.receive_timeout).await;
                    }
                },
            }
        }
        info!(consumer = %self.config.name, "consumer stopped");
    }

    /// Receive and handle at most one message. Returns whether a message was
    /// handled. For tests and synchronous draining.
    pub async fn process_next(&self, timeout: Duration) -> Result<bool, QueueError> {
        match self.queue.receive(timeout).await? {
            Some(delivery) => {
                self.handle_delivery(delivery).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn handle_delivery(&self, delivery: Delivery) {
        self.bump(|s| s.messages_processed += 1);
        let task_id = delivery.message.task_id;

        // Duplicate check before any work: at-least-once delivery means a
        // settled task can come around again.
        match self.store.prediction_for_task(task_id).await {
            Ok(Some(_)) => {
                debug!(task_id = task_id.as_i64(), redelivered = delivery.redelivered,
                       "task already settled, acking duplicate");
                self.bump(|s| s.duplicates_skipped += 1);
                self.ack(&delivery).await;
                return;
            }
            Ok(None) => {}
            Err(e) => {
                // Cannot even check; leave the message unacked so the broker
                // redelivers it once the store recovers.
                error!(task_id = task_id.as_i64(), error = %e, "duplicate check failed");
                return;
            }
        }

        match self.process(&delivery.message).await {
            Ok(Outcome::Settled) => {
                info!(task_id = task_id.as_i64(), "task settled");
                self.bump(|s| s.tasks_settled += 1);
                self.ack(&delivery).await;
            }
            Ok(Outcome::Duplicate) => {
                self.bump(|s| s.duplicates_skipped += 1);
                self.ack(&delivery).await;
            }
            Err(e) => {
                warn!(task_id = task_id.as_i64(), error = %e, "task processing failed");
                self.bump(|s| s.tasks_failed += 1);
                if let Err(mark_err) =
                    self.store.mark_task_failed(task_id, &e.to_string()).await
                {
                    warn!(task_id = task_id.as_i64(), error = %mark_err, "could not fail task");
                }
                if let Err(reject_err) = self.queue.reject(&delivery).await {
                    error!(task_id = task_id.as_i64(), error = %reject_err, "reject failed");
                }
            }
        }
    }

    async fn process(&self, message: &TaskMessage) -> Result<Outcome, ProcessError> {
        // The message is a pointer into the store; re-fetch everything it
        // references instead of trusting its payload.
        let model = self.store.model(message.model_id).await?;
        let image = self.store.image(message.image_id).await?;

        let bytes = self.blobs.get(&image.internal_url).await?;
        let mut labels = self.engine.infer(&message.artifact_path, &bytes).await?;

        let severity = Severity::from_extent(labels.extent());

        if let Some((latitude, longitude)) = message.coordinates() {
            match self.enrichment.growth_stage(latitude, longitude).await {
                // Satellite data beats the model's own stage estimate.
                Ok(Some(stage)) => labels.insert(GROWTH_STAGE_HEAD, stage.as_str()),
                Ok(None) => {}
                Err(e) => {
                    warn!(task_id = message.task_id.as_i64(), error = %e,
                          "growth stage enrichment failed");
                    labels.insert_if_absent(GROWTH_STAGE_HEAD, "unknown");
                }
            }
        }

        let damage = labels.damage().unwrap_or("unknown").to_string();
        let growth_stage = labels.growth_stage().unwrap_or("unknown").to_string();
        let (recommendation, source) = match self
            .store
            .recommendation(&damage, &growth_stage, severity)
            .await?
        {
            Some(rec) => (rec.advice, rec.source),
            None => (FALLBACK_ADVICE.to_string(), None),
        };

        let draft = PredictionDraft {
            task_id: message.task_id,
            user_id: message.user_id,
            model_id: message.model_id,
            object_name: image.object_name,
            photo_url: image.public_url,
            latitude: message.latitude,
            longitude: message.longitude,
            result: labels,
            severity,
            recommendation,
            source,
            cost: model.cost,
        };

        match self.store.settle_task(draft).await {
            Ok(_) => Ok(Outcome::Settled),
            // Another worker settled the same task between our duplicate
            // check and the commit.
            Err(e) if e.is_conflict() => Ok(Outcome::Duplicate),
            Err(e) => Err(e.into()),
        }
    }

    async fn ack(&self, delivery: &Delivery) {
        if let Err(e) = self.queue.ack(delivery).await {
            error!(tag = %delivery.tag, error = %e, "ack failed");
        }
    }

    fn bump(&self, f: impl FnOnce(&mut ConsumerStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }
}

impl<S, Q, E, B, G> Consumer<S, Q, E, B, G>
where
    S: ServiceStore + Send + Sync + 'static,
    Q: TaskQueue + Send + Sync + 'static,
    E: InferenceEngine + Send + Sync + 'static,
    B: BlobStore + Send + Sync + 'static,
    G: GrowthStageProvider + Send + Sync + 'static,
{
    /// Spawn the consumer loop onto the runtime.
    pub fn spawn(self) -> ConsumerHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let stats = self.stats.clone();
        let join = tokio::spawn(async move {
            self.run(shutdown_rx).await;
        });
        ConsumerHandle {
            shutdown: shutdown_tx,
            join,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use agrolens_core::{Credits, ImageId, ModelId, TaskId, UserId};
    use agrolens_inference::{
        InMemoryBlobStore, NoEnrichment, StaticEngine, StaticGrowthStage,
    };
    use agrolens_infra::{InMemoryStore, InMemoryTaskQueue};
    use agrolens_tasks::{
        GrowthStage, LabelMap, ModelSpec, Recommendation, TaskStatus,
    };

    const TICK: Duration = Duration::from_millis(10);

    struct Fixture {
        store: Arc<InMemoryStore>,
        queue: Arc<InMemoryTaskQueue>,
        blobs: Arc<InMemoryBlobStore>,
        user_id: UserId,
        model_id: ModelId,
        image_id: ImageId,
        internal_url: String,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(InMemoryTaskQueue::new());
        let blobs = Arc::new(InMemoryBlobStore::new());

        let user = store.create_user("ida", "ida@example.com").await.unwrap();
        store
            .deposit(user.user_id, Credits::from_whole(20))
            .await
            .unwrap();
        let model = store
            .register_model(ModelSpec {
                name: "crop-damage".to_string(),
                description: String::new(),
                cost: Credits::from_whole(5),
                artifact_path: "agri/crop-damage:v3".to_string(),
            })
            .await
            .unwrap();

        let urls = blobs.put("a.jpg", b"jpeg bytes".to_vec()).await.unwrap();
        let image = store
            .record_image(user.user_id, &urls.public_url, &urls.internal_url, "a.jpg")
            .await
            .unwrap();

        Fixture {
            store,
            queue,
            blobs,
            user_id: user.user_id,
            model_id: model.model_id,
            image_id: image.image_id,
            internal_url: urls.internal_url,
        }
    }

    async fn queued_task(fx: &Fixture, latitude: Option<f64>, longitude: Option<f64>) -> TaskId {
        let task = fx
            .store
            .create_task(fx.user_id, fx.model_id, fx.image_id)
            .await
            .unwrap();
        fx.queue
            .publish(&TaskMessage {
                task_id: task.task_id,
                user_id: fx.user_id,
                model_id: fx.model_id,
                artifact_path: "agri/crop-damage:v3".to_string(),
                image_id: fx.image_id,
                latitude,
                longitude,
            })
            .await
            .unwrap();
        task.task_id
    }

    fn labels(entries: &[(&str, &str)]) -> LabelMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn settles_a_task_end_to_end() {
        let fx = fixture().await;
        fx.store
            .upsert_recommendation(Recommendation {
                damage_type: "DR".to_string(),
                growth_stage: "V".to_string(),
                severity: Severity::Medium,
                advice: "Irrigate within 48 hours".to_string(),
                source: Some("agronomy handbook".to_string()),
            })
            .await
            .unwrap();
        let task_id = queued_task(&fx, None, None).await;

        let consumer = Consumer::new(
            fx.store.clone(),
            fx.queue.clone(),
            StaticEngine::answering(labels(&[
                ("damage", "DR"),
                ("growth_stage", "V"),
                ("extent", "55"),
            ])),
            fx.blobs.clone(),
            NoEnrichment,
        );

        assert!(consumer.process_next(TICK).await.unwrap());

        let task = fx.store.task(task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Complete);

        let prediction = fx
            .store
            .prediction_for_task(task_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prediction.severity, Severity::Medium);
        assert_eq!(prediction.recommendation, "Irrigate within 48 hours");
        assert_eq!(prediction.source.as_deref(), Some("agronomy handbook"));
        assert_eq!(prediction.cost, Credits::from_whole(5));

        // Charged exactly once, and the message is gone.
        let user = fx.store.user(fx.user_id).await.unwrap();
        assert_eq!(user.balance, Credits::from_whole(15));
        assert_eq!(fx.queue.pending_len(), 0);
        fx.queue.redeliver_unacked();
        assert_eq!(fx.queue.pending_len(), 0);

        let stats = consumer.stats();
        assert_eq!(stats.tasks_settled, 1);
        assert_eq!(stats.tasks_failed, 0);
    }

    #[tokio::test]
    async fn missing_catalog_row_uses_the_fallback_advice() {
        let fx = fixture().await;
        let task_id = queued_task(&fx, None, None).await;

        let consumer = Consumer::new(
            fx.store.clone(),
            fx.queue.clone(),
            StaticEngine::answering(labels(&[("damage", "WD"), ("extent", "80")])),
            fx.blobs.clone(),
            NoEnrichment,
        );
        consumer.process_next(TICK).await.unwrap();

        let prediction = fx
            .store
            .prediction_for_task(task_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prediction.severity, Severity::High);
        assert_eq!(prediction.recommendation, FALLBACK_ADVICE);
        assert_eq!(prediction.source, None);
    }

    #[tokio::test]
    async fn output_without_an_extent_head_settles_at_low_severity() {
        let fx = fixture().await;
        let task_id = queued_task(&fx, None, None).await;

        let consumer = Consumer::new(
            fx.store.clone(),
            fx.queue.clone(),
            StaticEngine::answering(labels(&[("damage", "DR")])),
            fx.blobs.clone(),
            NoEnrichment,
        );
        consumer.process_next(TICK).await.unwrap();

        let task = fx.store.task(task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Complete);

        let prediction = fx
            .store
            .prediction_for_task(task_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prediction.severity, Severity::Low);
        assert_eq!(
            fx.store.user(fx.user_id).await.unwrap().balance,
            Credits::from_whole(15)
        );
    }

    #[tokio::test]
    async fn engine_failure_fails_the_task_without_charging() {
        let fx = fixture().await;
        let task_id = queued_task(&fx, None, None).await;

        let consumer = Consumer::new(
            fx.store.clone(),
            fx.queue.clone(),
            StaticEngine::failing("cuda on fire"),
            fx.blobs.clone(),
            NoEnrichment,
        );
        consumer.process_next(TICK).await.unwrap();

        let task = fx.store.task(task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.error.as_deref().unwrap().contains("cuda on fire"));

        // No charge, and the message went to the dead-letter side, not back
        // into the queue.
        let user = fx.store.user(fx.user_id).await.unwrap();
        assert_eq!(user.balance, Credits::from_whole(20));
        assert_eq!(fx.queue.pending_len(), 0);
        assert_eq!(fx.queue.dead_letters().len(), 1);
        assert_eq!(consumer.stats().tasks_failed, 1);
    }

    #[tokio::test]
    async fn missing_image_bytes_fail_the_task() {
        let fx = fixture().await;
        // Image row points at a blob that was never stored.
        let orphan = fx
            .store
            .record_image(fx.user_id, "https://cdn/o.jpg", "http://blob/o.jpg", "o.jpg")
            .await
            .unwrap();
        let task = fx
            .store
            .create_task(fx.user_id, fx.model_id, orphan.image_id)
            .await
            .unwrap();
        fx.queue
            .publish(&TaskMessage {
                task_id: task.task_id,
                user_id: fx.user_id,
                model_id: fx.model_id,
                artifact_path: "agri/crop-damage:v3".to_string(),
                image_id: orphan.image_id,
                latitude: None,
                longitude: None,
            })
            .await
            .unwrap();

        let consumer = Consumer::new(
            fx.store.clone(),
            fx.queue.clone(),
            StaticEngine::answering(labels(&[("damage", "DR")])),
            fx.blobs.clone(),
            NoEnrichment,
        );
        consumer.process_next(TICK).await.unwrap();

        let task = fx.store.task(task.task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(fx.queue.dead_letters().len(), 1);
    }

    #[tokio::test]
    async fn insufficient_balance_at_settlement_fails_the_task() {
        let fx = fixture().await;
        let pricey = fx
            .store
            .register_model(ModelSpec {
                name: "expensive".to_string(),
                description: String::new(),
                cost: Credits::from_whole(100),
                artifact_path: "agri/expensive:v1".to_string(),
            })
            .await
            .unwrap();
        let task = fx
            .store
            .create_task(fx.user_id, pricey.model_id, fx.image_id)
            .await
            .unwrap();
        fx.queue
            .publish(&TaskMessage {
                task_id: task.task_id,
                user_id: fx.user_id,
                model_id: pricey.model_id,
                artifact_path: "agri/expensive:v1".to_string(),
                image_id: fx.image_id,
                latitude: None,
                longitude: None,
            })
            .await
            .unwrap();

        let consumer = Consumer::new(
            fx.store.clone(),
            fx.queue.clone(),
            StaticEngine::answering(labels(&[("damage", "DR"), ("extent", "30")])),
            fx.blobs.clone(),
            NoEnrichment,
        );
        consumer.process_next(TICK).await.unwrap();

        let task = fx.store.task(task.task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.error.as_deref().unwrap().contains("insufficient funds"));
        assert_eq!(
            fx.store.user(fx.user_id).await.unwrap().balance,
            Credits::from_whole(20)
        );
        assert!(fx
            .store
            .prediction_for_task(task.task_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn duplicate_delivery_is_acked_without_a_second_charge() {
        let fx = fixture().await;
        let task_id = queued_task(&fx, None, None).await;

        let consumer = Consumer::new(
            fx.store.clone(),
            fx.queue.clone(),
            StaticEngine::answering(labels(&[("damage", "DR"), ("extent", "55")])),
            fx.blobs.clone(),
            NoEnrichment,
        );
        consumer.process_next(TICK).await.unwrap();

        // The broker delivers the same message again.
        fx.queue
            .publish(&TaskMessage {
                task_id,
                user_id: fx.user_id,
                model_id: fx.model_id,
                artifact_path: "agri/crop-damage:v3".to_string(),
                image_id: fx.image_id,
                latitude: None,
                longitude: None,
            })
            .await
            .unwrap();
        consumer.process_next(TICK).await.unwrap();

        let stats = consumer.stats();
        assert_eq!(stats.tasks_settled, 1);
        assert_eq!(stats.duplicates_skipped, 1);

        let user = fx.store.user(fx.user_id).await.unwrap();
        assert_eq!(user.balance, Credits::from_whole(15));
        assert_eq!(
            fx.store.transactions_for(fx.user_id).await.unwrap().len(),
            2
        );
        assert_eq!(fx.queue.pending_len(), 0);
        assert_eq!(fx.queue.dead_letters().len(), 0);
    }

    #[tokio::test]
    async fn redelivered_message_after_crash_settles_once() {
        let fx = fixture().await;
        queued_task(&fx, None, None).await;

        // A worker received the delivery and died before acking.
        let _abandoned = fx.queue.receive(TICK).await.unwrap().unwrap();
        fx.queue.redeliver_unacked();

        let consumer = Consumer::new(
            fx.store.clone(),
            fx.queue.clone(),
            StaticEngine::answering(labels(&[("damage", "DR"), ("extent", "55")])),
            fx.blobs.clone(),
            NoEnrichment,
        );
        consumer.process_next(TICK).await.unwrap();

        assert_eq!(consumer.stats().tasks_settled, 1);
        assert_eq!(
            fx.store.user(fx.user_id).await.unwrap().balance,
            Credits::from_whole(15)
        );
    }

    #[tokio::test]
    async fn satellite_stage_overrides_the_model_estimate() {
        let fx = fixture().await;
        let task_id = queued_task(&fx, Some(52.5), Some(13.4)).await;
        fx.store
            .upsert_recommendation(Recommendation {
                damage_type: "DR".to_string(),
                growth_stage: "F".to_string(),
                severity: Severity::Medium,
                advice: "Protect the flowers".to_string(),
                source: None,
            })
            .await
            .unwrap();

        let consumer = Consumer::new(
            fx.store.clone(),
            fx.queue.clone(),
            StaticEngine::answering(labels(&[
                ("damage", "DR"),
                ("growth_stage", "V"),
                ("extent", "55"),
            ])),
            fx.blobs.clone(),
            StaticGrowthStage::answering(GrowthStage::Flowering),
        );
        consumer.process_next(TICK).await.unwrap();

        let prediction = fx
            .store
            .prediction_for_task(task_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prediction.result.growth_stage(), Some("F"));
        assert_eq!(prediction.recommendation, "Protect the flowers");
    }

    #[tokio::test]
    async fn enrichment_failure_degrades_but_still_settles() {
        let fx = fixture().await;
        let task_id = queued_task(&fx, Some(52.5), Some(13.4)).await;

        let consumer = Consumer::new(
            fx.store.clone(),
            fx.queue.clone(),
            StaticEngine::answering(labels(&[("damage", "DR"), ("extent", "55")])),
            fx.blobs.clone(),
            StaticGrowthStage::failing("satellite api down"),
        );
        consumer.process_next(TICK).await.unwrap();

        let task = fx.store.task(task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Complete);

        // No model estimate either, so the head is filled with "unknown".
        let prediction = fx
            .store
            .prediction_for_task(task_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prediction.result.growth_stage(), Some("unknown"));
    }

    #[tokio::test]
    async fn enrichment_failure_keeps_the_model_estimate_when_present() {
        let fx = fixture().await;
        let task_id = queued_task(&fx, Some(52.5), Some(13.4)).await;

        let consumer = Consumer::new(
            fx.store.clone(),
            fx.queue.clone(),
            StaticEngine::answering(labels(&[
                ("damage", "DR"),
                ("growth_stage", "V"),
                ("extent", "55"),
            ])),
            fx.blobs.clone(),
            StaticGrowthStage::failing("satellite api down"),
        );
        consumer.process_next(TICK).await.unwrap();

        let prediction = fx
            .store
            .prediction_for_task(task_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prediction.result.growth_stage(), Some("V"));
    }

    #[tokio::test]
    async fn provider_is_not_consulted_without_both_coordinates() {
        let fx = fixture().await;
        let task_id = queued_task(&fx, Some(52.5), None).await;

        // A failing provider would insert "unknown" if it were called.
        let consumer = Consumer::new(
            fx.store.clone(),
            fx.queue.clone(),
            StaticEngine::answering(labels(&[("damage", "DR"), ("extent", "55")])),
            fx.blobs.clone(),
            StaticGrowthStage::failing("satellite api down"),
        );
        consumer.process_next(TICK).await.unwrap();

        let prediction = fx
            .store
            .prediction_for_task(task_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prediction.result.growth_stage(), None);
    }

    #[tokio::test]
    async fn spawned_consumer_drains_and_shuts_down() {
        let fx = fixture().await;
        queued_task(&fx, None, None).await;

        let consumer = Consumer::new(
            fx.store.clone(),
            fx.queue.clone(),
            StaticEngine::answering(labels(&[("damage", "DR"), ("extent", "55")])),
            fx.blobs.clone(),
            NoEnrichment,
        )
        .with_config(ConsumerConfig {
            receive_timeout: Duration::from_millis(20),
            name: "test-worker".to_string(),
        });

        let handle = consumer.spawn();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let stats = handle.stats();
        handle.shutdown().await;

        assert_eq!(stats.tasks_settled, 1);
        assert_eq!(
            fx.store.user(fx.user_id).await.unwrap().balance,
            Credits::from_whole(15)
        );
    }
}
