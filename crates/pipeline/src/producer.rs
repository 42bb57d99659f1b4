//! Submission side of the pipeline.

use agrolens_core::{Credits, ImageId, ModelId, TaskId, UserId};
use agrolens_infra::{QueueError, ServiceStore, StoreError, TaskQueue};
use agrolens_tasks::TaskMessage;
use tracing::{info, warn};

/// What a successful submission returns: the task is queued, not done.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionReceipt {
    pub task_id: TaskId,
    /// Price the task will settle at if it completes.
    pub cost: Credits,
    pub message: &'static str,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("user not found")]
    UserNotFound,

    #[error("model not found")]
    ModelNotFound,

    #[error("no image available for this user")]
    ImageNotFound,

    /// The balance cannot cover the model's price. Nothing is charged at
    /// submission time; this is a pre-check so users learn about the
    /// shortfall before the task exists.
    #[error("insufficient balance: available {available}, required {required}")]
    InsufficientBalance {
        available: Credits,
        required: Credits,
        deficit: Credits,
    },

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Validates submissions, creates task rows and publishes broker messages.
#[derive(Debug, Clone)]
pub struct Producer<S, Q> {
    store: S,
    queue: Q,
}

impl<S, Q> Producer<S, Q>
where
    S: ServiceStore,
    Q: TaskQueue,
{
    pub fn new(store: S, queue: Q) -> Self {
        Self { store, queue }
    }

    /// Submit an inference task.
    ///
    /// Checks run in a fixed order so callers get the most actionable error:
    /// user, model, image, then balance. The task row is created only after
    /// every check passes; a task that exists was a valid submission.
    ///
    /// When `image_id` is `None` the user's most recent upload is used.
    pub async fn submit(
        &self,
        user_id: UserId,
        model_id: ModelId,
        image_id: Option<ImageId>,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<SubmissionReceipt, SubmitError> {
        let user = match self.store.user(user_id).await {
            Ok(user) => user,
            Err(StoreError::NotFound(_)) => return Err(SubmitError::UserNotFound),
            Err(e) => return Err(SubmitError::Store(e)),
        };

        let model = match self.store.model(model_id).await {
            Ok(model) => model,
            Err(StoreError::NotFound(_)) => return Err(SubmitError::ModelNotFound),
            Err(e) => return Err(SubmitError::Store(e)),
        };

        let image = match image_id {
            Some(image_id) => match self.store.image(image_id).await {
                Ok(image) if image.user_id == user_id => image,
                Ok(_) | Err(StoreError::NotFound(_)) => return Err(SubmitError::ImageNotFound),
                Err(e) => return Err(SubmitError::Store(e)),
            },
            None => self
                .store
                .latest_image_for(user_id)
                .await
                .map_err(SubmitError::Store)?
                .ok_or(SubmitError::ImageNotFound)?,
        };

        if user.balance < model.cost {
            return Err(SubmitError::InsufficientBalance {
                available: user.balance,
                required: model.cost,
                deficit: user.balance.deficit_against(model.cost),
            });
        }

        let task = self
            .store
            .create_task(user_id, model_id, image.image_id)
            .await
            .map_err(SubmitError::Store)?;

        let message = TaskMessage {
            task_id: task.task_id,
            user_id,
            model_id,
            artifact_path: model.artifact_path.clone(),
            image_id: image.image_id,
            latitude,
            longitude,
        };

        if let Err(e) = self.queue.publish(&message).await {
            // The task row exists but no worker will ever see it; close it
            // out so it does not sit in `created` forever.
            warn!(task_id = task.task_id.as_i64(), error = %e, "publish failed, failing task");
            if let Err(mark_err) = self
                .store
                .mark_task_failed(task.task_id, &format!("publish failed: {e}"))
                .await
            {
                warn!(task_id = task.task_id.as_i64(), error = %mark_err, "could not fail task");
            }
            return Err(e.into());
        }

        info!(
            task_id = task.task_id.as_i64(),
            user_id = user_id.as_i64(),
            model_id = model_id.as_i64(),
            cost = %model.cost,
            "task queued"
        );

        Ok(SubmissionReceipt {
            task_id: task.task_id,
            cost: model.cost,
            message: "Task queued",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use agrolens_infra::{InMemoryStore, InMemoryTaskQueue};
    use agrolens_tasks::{ModelSpec, TaskStatus};

    async fn fixture() -> (Arc<InMemoryStore>, Arc<InMemoryTaskQueue>, Producer<Arc<InMemoryStore>, Arc<InMemoryTaskQueue>>) {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(InMemoryTaskQueue::new());
        let producer = Producer::new(store.clone(), queue.clone());
        (store, queue, producer)
    }

    async fn seed(store: &InMemoryStore) -> (UserId, ModelId, ImageId) {
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
        let image = store
            .record_image(user.user_id, "https://cdn/a.jpg", "http://blob/a.jpg", "a.jpg")
            .await
            .unwrap();
        (user.user_id, model.model_id, image.image_id)
    }

    #[tokio::test]
    async fn submit_creates_task_and_publishes_message() {
        let (store, queue, producer) = fixture().await;
        let (user_id, model_id, image_id) = seed(&store).await;

        let receipt = producer
            .submit(user_id, model_id, Some(image_id), Some(52.5), Some(13.4))
            .await
            .unwrap();

        assert_eq!(receipt.cost, Credits::from_whole(5));
        assert_eq!(receipt.message, "Task queued");

        let task = store.task(receipt.task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Created);

        let delivery = queue
            .receive(Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.message.task_id, receipt.task_id);
        assert_eq!(delivery.message.artifact_path, "agri/crop-damage:v3");
        assert_eq!(delivery.message.coordinates(), Some((52.5, 13.4)));
    }

    #[tokio::test]
    async fn submission_never_touches_the_balance() {
        let (store, _, producer) = fixture().await;
        let (user_id, model_id, image_id) = seed(&store).await;

        producer
            .submit(user_id, model_id, Some(image_id), None, None)
            .await
            .unwrap();

        let user = store.user(user_id).await.unwrap();
        assert_eq!(user.balance, Credits::from_whole(20));
        assert_eq!(store.transactions_for(user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_image_falls_back_to_latest_upload() {
        let (store, queue, producer) = fixture().await;
        let (user_id, model_id, _) = seed(&store).await;
        let newer = store
            .record_image(user_id, "https://cdn/b.jpg", "http://blob/b.jpg", "b.jpg")
            .await
            .unwrap();

        producer
            .submit(user_id, model_id, None, None, None)
            .await
            .unwrap();

        let delivery = queue
            .receive(Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.message.image_id, newer.image_id);
    }

    #[tokio::test]
    async fn another_users_image_is_rejected() {
        let (store, _, producer) = fixture().await;
        let (user_id, model_id, _) = seed(&store).await;
        let other = store.create_user("bo", "bo@example.com").await.unwrap();
        let foreign = store
            .record_image(other.user_id, "https://cdn/x.jpg", "http://blob/x.jpg", "x.jpg")
            .await
            .unwrap();

        let err = producer
            .submit(user_id, model_id, Some(foreign.image_id), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::ImageNotFound));
    }

    #[tokio::test]
    async fn insufficient_balance_reports_the_deficit() {
        let (store, queue, producer) = fixture().await;
        let (user_id, _, image_id) = seed(&store).await;
        let pricey = store
            .register_model(ModelSpec {
                name: "expensive".to_string(),
                description: String::new(),
                cost: Credits::from_whole(50),
                artifact_path: "agri/expensive:v1".to_string(),
            })
            .await
            .unwrap();

        let err = producer
            .submit(user_id, pricey.model_id, Some(image_id), None, None)
            .await
            .unwrap_err();

        match err {
            SubmitError::InsufficientBalance {
                available,
                required,
                deficit,
            } => {
                assert_eq!(available, Credits::from_whole(20));
                assert_eq!(required, Credits::from_whole(50));
                assert_eq!(deficit, Credits::from_whole(30));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // No task, no message.
        assert_eq!(queue.pending_len(), 0);
    }

    #[tokio::test]
    async fn checks_run_user_first() {
        let (store, _, producer) = fixture().await;
        seed(&store).await;

        let err = producer
            .submit(UserId::new(999), ModelId::new(999), None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::UserNotFound));
    }

    #[tokio::test]
    async fn unknown_model_is_reported_before_image_checks() {
        let (store, _, producer) = fixture().await;
        let (user_id, _, _) = seed(&store).await;

        let err = producer
            .submit(user_id, ModelId::new(999), None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::ModelNotFound));
    }
}
