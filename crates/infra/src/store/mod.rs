//! Service store seam.
//!
//! One trait covers everything the producer, consumer and HTTP surface need
//! to persist: accounts and the credit ledger, model artifacts, uploaded
//! images, tasks, predictions and the recommendation catalog.
//!
//! The critical operation is [`ServiceStore::settle_task`]: prediction
//! insert, task completion and the balance debit with its ledger entry either
//! all land or none do, and the unique `task_id` on predictions makes the
//! whole thing an idempotency barrier against broker redeliveries.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use agrolens_core::{Credits, ImageId, ModelId, TaskId, UserId};
use agrolens_ledger::{LedgerError, Transaction};
use agrolens_tasks::{
    ModelArtifact, ModelSpec, Prediction, PredictionDraft, Recommendation, Severity, StoredImage,
    Task, UserAccount,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Referenced row does not exist. The payload names the entity kind.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A uniqueness or lifecycle rule blocked the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Backend failure (connection, query, serialization).
    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    /// True when the settlement failed because the task is already settled,
    /// i.e. a duplicate delivery raced us. The caller acks and moves on.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Persistence seam for the whole service.
///
/// Two implementations: [`in_memory::InMemoryStore`] for tests and dev mode,
/// [`postgres::PostgresStore`] for production. Both uphold the same rules:
/// balances never go negative, every balance change appends a matching
/// transaction row, tasks only move forward, at most one prediction per task.
#[async_trait::async_trait]
pub trait ServiceStore: Send + Sync {
    // accounts and ledger

    async fn create_user(&self, username: &str, email: &str) -> Result<UserAccount, StoreError>;

    async fn user(&self, user_id: UserId) -> Result<UserAccount, StoreError>;

    /// Add credit and append the deposit transaction. Returns the updated
    /// account.
    async fn deposit(&self, user_id: UserId, amount: Credits) -> Result<UserAccount, StoreError>;

    /// Ledger entries for a user, oldest first.
    async fn transactions_for(&self, user_id: UserId) -> Result<Vec<Transaction>, StoreError>;

    // model catalog

    async fn register_model(&self, spec: ModelSpec) -> Result<ModelArtifact, StoreError>;

    async fn model(&self, model_id: ModelId) -> Result<ModelArtifact, StoreError>;

    async fn models(&self) -> Result<Vec<ModelArtifact>, StoreError>;

    // uploaded images

    async fn record_image(
        &self,
        user_id: UserId,
        public_url: &str,
        internal_url: &str,
        object_name: &str,
    ) -> Result<StoredImage, StoreError>;

    async fn image(&self, image_id: ImageId) -> Result<StoredImage, StoreError>;

    /// The user's most recent upload, if any. Used when a submission names no
    /// explicit image.
    async fn latest_image_for(&self, user_id: UserId) -> Result<Option<StoredImage>, StoreError>;

    // tasks and predictions

    async fn create_task(
        &self,
        user_id: UserId,
        model_id: ModelId,
        image_id: ImageId,
    ) -> Result<Task, StoreError>;

    async fn task(&self, task_id: TaskId) -> Result<Task, StoreError>;

    /// Move a task to `failed`, recording the cause. No charge happens.
    async fn mark_task_failed(&self, task_id: TaskId, error: &str) -> Result<(), StoreError>;

    /// The settled outcome for a task, if the task has one. This is the
    /// consumer's duplicate-delivery check.
    async fn prediction_for_task(&self, task_id: TaskId)
        -> Result<Option<Prediction>, StoreError>;

    async fn predictions_for(&self, user_id: UserId) -> Result<Vec<Prediction>, StoreError>;

    /// Atomically: insert the prediction, complete the task, debit the
    /// user's balance by `draft.cost` and append the deduct transaction.
    ///
    /// Fails with [`StoreError::Conflict`] if the task already has a
    /// prediction, and with [`LedgerError::InsufficientFunds`] if the balance
    /// cannot cover the cost; in both cases nothing is written.
    async fn settle_task(&self, draft: PredictionDraft) -> Result<Prediction, StoreError>;

    // recommendation catalog

    async fn upsert_recommendation(&self, rec: Recommendation) -> Result<(), StoreError>;

    async fn recommendation(
        &self,
        damage: &str,
        growth_stage: &str,
        severity: Severity,
    ) -> Result<Option<Recommendation>, StoreError>;
}

#[async_trait::async_trait]
impl<S> ServiceStore for Arc<S>
where
    S: ServiceStore + ?Sized,
{
    async fn create_user(&self, username: &str, email: &str) -> Result<UserAccount, StoreError> {
        (**self).create_user(username, email).await
    }

    async fn user(&self, user_id: UserId) -> Result<UserAccount, StoreError> {
        (**self).user(user_id).await
    }

    async fn deposit(&self, user_id: UserId, amount: Credits) -> Result<UserAccount, StoreError> {
        (**self).deposit(user_id, amount).await
    }

    async fn transactions_for(&self, user_id: UserId) -> Result<Vec<Transaction>, StoreError> {
        (**self).transactions_for(user_id).await
    }

    async fn register_model(&self, spec: ModelSpec) -> Result<ModelArtifact, StoreError> {
        (**self).register_model(spec).await
    }

    async fn model(&self, model_id: ModelId) -> Result<ModelArtifact, StoreError> {
        (**self).model(model_id).await
    }

    async fn models(&self) -> Result<Vec<ModelArtifact>, StoreError> {
        (**self).models().await
    }

    async fn record_image(
        &self,
        user_id: UserId,
        public_url: &str,
        internal_url: &str,
        object_name: &str,
    ) -> Result<StoredImage, StoreError> {
        (**self)
            .record_image(user_id, public_url, internal_url, object_name)
            .await
    }

    async fn image(&self, image_id: ImageId) -> Result<StoredImage, StoreError> {
        (**self).image(image_id).await
    }

    async fn latest_image_for(&self, user_id: UserId) -> Result<Option<StoredImage>, StoreError> {
        (**self).latest_image_for(user_id).await
    }

    async fn create_task(
        &self,
        user_id: UserId,
        model_id: ModelId,
        image_id: ImageId,
    ) -> Result<Task, StoreError> {
        (**self).create_task(user_id, model_id, image_id).await
    }

    async fn task(&self, task_id: TaskId) -> Result<Task, StoreError> {
        (**self).task(task_id).await
    }

    async fn mark_task_failed(&self, task_id: TaskId, error: &str) -> Result<(), StoreError> {
        (**self).mark_task_failed(task_id, error).await
    }

    async fn prediction_for_task(
        &self,
        task_id: TaskId,
    ) -> Result<Option<Prediction>, StoreError> {
        (**self).prediction_for_task(task_id).await
    }

    async fn predictions_for(&self, user_id: UserId) -> Result<Vec<Prediction>, StoreError> {
        (**self).predictions_for(user_id).await
    }

    async fn settle_task(&self, draft: PredictionDraft) -> Result<Prediction, StoreError> {
        (**self).settle_task(draft).await
    }

    async fn upsert_recommendation(&self, rec: Recommendation) -> Result<(), StoreError> {
        (**self).upsert_recommendation(rec).await
    }

    async fn recommendation(
        &self,
        damage: &str,
        growth_stage: &str,
        severity: Severity,
    ) -> Result<Option<Recommendation>, StoreError> {
        (**self).recommendation(damage, growth_stage, severity).await
    }
}
