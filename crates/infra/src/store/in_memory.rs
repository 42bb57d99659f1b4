//! In-memory store for tests/dev.
//!
//! One mutex over the whole state gives the same atomicity the Postgres
//! backend gets from transactions: settlement either applies every write or
//! none, and no reader observes a half-settled task.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use agrolens_core::{Credits, ImageId, ModelId, PredictionId, TaskId, TransactionId, UserId};
use agrolens_ledger::{self as ledger, Transaction, TransactionKind};
use agrolens_tasks::{
    ModelArtifact, ModelSpec, Prediction, PredictionDraft, Recommendation, Severity, StoredImage,
    Task, UserAccount,
};

use super::{ServiceStore, StoreError};

#[derive(Debug, Default)]
struct State {
    users: HashMap<UserId, UserAccount>,
    transactions: Vec<Transaction>,
    models: HashMap<ModelId, ModelArtifact>,
    images: HashMap<ImageId, StoredImage>,
    tasks: HashMap<TaskId, Task>,
    predictions: HashMap<PredictionId, Prediction>,
    recommendations: Vec<Recommendation>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user_mut(&mut self, user_id: UserId) -> Result<&mut UserAccount, StoreError> {
        self.users
            .get_mut(&user_id)
            .ok_or(StoreError::NotFound("user"))
    }

    fn append_transaction(&mut self, user_id: UserId, kind: TransactionKind, amount: Credits) {
        let transaction_id = TransactionId::new(self.next_id());
        self.transactions.push(Transaction {
            transaction_id,
            user_id,
            kind,
            amount,
            created_at: Utc::now(),
        });
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Storage("store state poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl ServiceStore for InMemoryStore {
    async fn create_user(&self, username: &str, email: &str) -> Result<UserAccount, StoreError> {
        let mut state = self.lock()?;
        if state.users.values().any(|u| u.email == email) {
            return Err(StoreError::Conflict(format!(
                "email {email} is already registered"
            )));
        }
        let user_id = UserId::new(state.next_id());
        let account = UserAccount {
            user_id,
            username: username.to_string(),
            email: email.to_string(),
            balance: Credits::ZERO,
            created_at: Utc::now(),
        };
        state.users.insert(user_id, account.clone());
        Ok(account)
    }

    async fn user(&self, user_id: UserId) -> Result<UserAccount, StoreError> {
        self.lock()?
            .users
            .get(&user_id)
            .cloned()
            .ok_or(StoreError::NotFound("user"))
    }

    async fn deposit(&self, user_id: UserId, amount: Credits) -> Result<UserAccount, StoreError> {
        let mut state = self.lock()?;
        let balance = state.user_mut(user_id)?.balance;
        let next = ledger::deposit(balance, amount)?;
        state.user_mut(user_id)?.balance = next;
        state.append_transaction(user_id, TransactionKind::Deposit, amount);
        Ok(state.users[&user_id].clone())
    }

    async fn transactions_for(&self, user_id: UserId) -> Result<Vec<Transaction>, StoreError> {
        Ok(self
            .lock()?
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn register_model(&self, spec: ModelSpec) -> Result<ModelArtifact, StoreError> {
        let mut state = self.lock()?;
        let model_id = ModelId::new(state.next_id());
        let artifact = ModelArtifact {
            model_id,
            name: spec.name,
            description: spec.description,
            cost: spec.cost,
            artifact_path: spec.artifact_path,
            created_at: Utc::now(),
        };
        state.models.insert(model_id, artifact.clone());
        Ok(artifact)
    }

    async fn model(&self, model_id: ModelId) -> Result<ModelArtifact, StoreError> {
        self.lock()?
            .models
            .get(&model_id)
            .cloned()
            .ok_or(StoreError::NotFound("model"))
    }

    async fn models(&self) -> Result<Vec<ModelArtifact>, StoreError> {
        let mut all: Vec<_> = self.lock()?.models.values().cloned().collect();
        all.sort_by_key(|m| m.model_id);
        Ok(all)
    }

    async fn record_image(
        &self,
        user_id: UserId,
        public_url: &str,
        internal_url: &str,
        object_name: &str,
    ) -> Result<StoredImage, StoreError> {
        let mut state = self.lock()?;
        if !state.users.contains_key(&user_id) {
            return Err(StoreError::NotFound("user"));
        }
        let image_id = ImageId::new(state.next_id());
        let image = StoredImage {
            image_id,
            user_id,
            public_url: public_url.to_string(),
            internal_url: internal_url.to_string(),
            object_name: object_name.to_string(),
            created_at: Utc::now(),
        };
        state.images.insert(image_id, image.clone());
        Ok(image)
    }

    async fn image(&self, image_id: ImageId) -> Result<StoredImage, StoreError> {
        self.lock()?
            .images
            .get(&image_id)
            .cloned()
            .ok_or(StoreError::NotFound("image"))
    }

    async fn latest_image_for(&self, user_id: UserId) -> Result<Option<StoredImage>, StoreError> {
        Ok(self
            .lock()?
            .images
            .values()
            .filter(|img| img.user_id == user_id)
            .max_by_key(|img| img.image_id)
            .cloned())
    }

    async fn create_task(
        &self,
        user_id: UserId,
        model_id: ModelId,
        image_id: ImageId,
    ) -> Result<Task, StoreError> {
        let mut state = self.lock()?;
        if !state.users.contains_key(&user_id) {
            return Err(StoreError::NotFound("user"));
        }
        if !state.models.contains_key(&model_id) {
            return Err(StoreError::NotFound("model"));
        }
        if !state.images.contains_key(&image_id) {
            return Err(StoreError::NotFound("image"));
        }
        let task_id = TaskId::new(state.next_id());
        let task = Task::new(task_id, user_id, model_id, image_id);
        state.tasks.insert(task_id, task.clone());
        Ok(task)
    }

    async fn task(&self, task_id: TaskId) -> Result<Task, StoreError> {
        self.lock()?
            .tasks
            .get(&task_id)
            .cloned()
            .ok_or(StoreError::NotFound("task"))
    }

    async fn mark_task_failed(&self, task_id: TaskId, error: &str) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let task = state
            .tasks
            .get_mut(&task_id)
            .ok_or(StoreError::NotFound("task"))?;
        task.fail(error)
            .map_err(|e| StoreError::Conflict(e.to_string()))
    }

    async fn prediction_for_task(
        &self,
        task_id: TaskId,
    ) -> Result<Option<Prediction>, StoreError> {
        Ok(self
            .lock()?
            .predictions
            .values()
            .find(|p| p.task_id == task_id)
            .cloned())
    }

    async fn predictions_for(&self, user_id: UserId) -> Result<Vec<Prediction>, StoreError> {
        let mut all: Vec<_> = self
            .lock()?
            .predictions
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        all.sort_by_key(|p| p.prediction_id);
        Ok(all)
    }

    async fn settle_task(&self, draft: PredictionDraft) -> Result<Prediction, StoreError> {
        let mut state = self.lock()?;

        // Validate everything before the first write so a failure leaves no
        // trace.
        if state.predictions.values().any(|p| p.task_id == draft.task_id) {
            return Err(StoreError::Conflict(format!(
                "task {} is already settled",
                draft.task_id
            )));
        }
        let task = state
            .tasks
            .get(&draft.task_id)
            .ok_or(StoreError::NotFound("task"))?;
        if task.status.is_terminal() {
            return Err(StoreError::Conflict(format!(
                "task {} is already {}",
                task.task_id, task.status
            )));
        }
        let balance = state.user_mut(draft.user_id)?.balance;
        let next_balance = ledger::deduct(balance, draft.cost)?;

        let prediction_id = PredictionId::new(state.next_id());
        let prediction = draft.clone().into_prediction(prediction_id);

        let task = state
            .tasks
            .get_mut(&draft.task_id)
            .ok_or(StoreError::NotFound("task"))?;
        task.complete(prediction_id, draft.result.clone())
            .map_err(|e| StoreError::Conflict(e.to_string()))?;

        state.user_mut(draft.user_id)?.balance = next_balance;
        state.append_transaction(draft.user_id, TransactionKind::Deduct, draft.cost);
        state.predictions.insert(prediction_id, prediction.clone());

        Ok(prediction)
    }

    async fn upsert_recommendation(&self, rec: Recommendation) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if let Some(existing) = state
            .recommendations
            .iter_mut()
            .find(|r| r.matches(&rec.damage_type, &rec.growth_stage, rec.severity))
        {
            *existing = rec;
        } else {
            state.recommendations.push(rec);
        }
        Ok(())
    }

    async fn recommendation(
        &self,
        damage: &str,
        growth_stage: &str,
        severity: Severity,
    ) -> Result<Option<Recommendation>, StoreError> {
        Ok(self
            .lock()?
            .recommendations
            .iter()
            .find(|r| r.matches(damage, growth_stage, severity))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrolens_ledger::LedgerError;
    use agrolens_tasks::{LabelMap, TaskStatus};

    async fn seeded() -> (InMemoryStore, UserAccount, ModelArtifact, StoredImage) {
        let store = InMemoryStore::new();
        let user = store.create_user("ida", "ida@example.com").await.unwrap();
        let user = store
            .deposit(user.user_id, Credits::from_whole(20))
            .await
            .unwrap();
        let model = store
            .register_model(ModelSpec {
                name: "crop-damage".to_string(),
                description: "multihead damage classifier".to_string(),
                cost: Credits::from_whole(5),
                artifact_path: "agri/crop-damage:v3".to_string(),
            })
            .await
            .unwrap();
        let image = store
            .record_image(
                user.user_id,
                "https://cdn.example.com/a.jpg",
                "http://blob:9000/a.jpg",
                "a.jpg",
            )
            .await
            .unwrap();
        (store, user, model, image)
    }

    fn draft(user: &UserAccount, model: &ModelArtifact, image: &StoredImage, task: &Task) -> PredictionDraft {
        let mut result = LabelMap::new();
        result.insert("damage", "DR");
        result.insert("extent", "55");
        PredictionDraft {
            task_id: task.task_id,
            user_id: user.user_id,
            model_id: model.model_id,
            object_name: image.object_name.clone(),
            photo_url: image.public_url.clone(),
            latitude: None,
            longitude: None,
            result,
            severity: Severity::Medium,
            recommendation: "Irrigate within 48 hours".to_string(),
            source: None,
            cost: model.cost,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = InMemoryStore::new();
        store.create_user("ida", "ida@example.com").await.unwrap();
        let err = store.create_user("ida2", "ida@example.com").await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn deposit_appends_a_matching_transaction() {
        let store = InMemoryStore::new();
        let user = store.create_user("ida", "ida@example.com").await.unwrap();
        let user = store
            .deposit(user.user_id, Credits::from_whole(10))
            .await
            .unwrap();

        assert_eq!(user.balance, Credits::from_whole(10));
        let log = store.transactions_for(user.user_id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].kind, TransactionKind::Deposit);
        assert_eq!(log[0].amount, Credits::from_whole(10));
    }

    #[tokio::test]
    async fn latest_image_is_the_most_recent_upload() {
        let (store, user, _, first) = seeded().await;
        let second = store
            .record_image(
                user.user_id,
                "https://cdn.example.com/b.jpg",
                "http://blob:9000/b.jpg",
                "b.jpg",
            )
            .await
            .unwrap();

        let latest = store.latest_image_for(user.user_id).await.unwrap().unwrap();
        assert_eq!(latest, second);
        assert_ne!(latest, first);
    }

    #[tokio::test]
    async fn create_task_checks_every_reference() {
        let (store, user, model, image) = seeded().await;
        assert!(matches!(
            store
                .create_task(UserId::new(999), model.model_id, image.image_id)
                .await,
            Err(StoreError::NotFound("user"))
        ));
        assert!(matches!(
            store
                .create_task(user.user_id, ModelId::new(999), image.image_id)
                .await,
            Err(StoreError::NotFound("model"))
        ));
        assert!(matches!(
            store
                .create_task(user.user_id, model.model_id, ImageId::new(999))
                .await,
            Err(StoreError::NotFound("image"))
        ));
    }

    #[tokio::test]
    async fn settlement_applies_all_writes_together() {
        let (store, user, model, image) = seeded().await;
        let task = store
            .create_task(user.user_id, model.model_id, image.image_id)
            .await
            .unwrap();

        let prediction = store
            .settle_task(draft(&user, &model, &image, &task))
            .await
            .unwrap();

        let task = store.task(task.task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Complete);
        assert_eq!(task.prediction_id, Some(prediction.prediction_id));

        let account = store.user(user.user_id).await.unwrap();
        assert_eq!(account.balance, Credits::from_whole(15));

        let log = store.transactions_for(user.user_id).await.unwrap();
        assert_eq!(log.last().unwrap().kind, TransactionKind::Deduct);
        assert_eq!(log.last().unwrap().amount, model.cost);
    }

    #[tokio::test]
    async fn settling_twice_conflicts_and_charges_once() {
        let (store, user, model, image) = seeded().await;
        let task = store
            .create_task(user.user_id, model.model_id, image.image_id)
            .await
            .unwrap();

        store
            .settle_task(draft(&user, &model, &image, &task))
            .await
            .unwrap();
        let err = store
            .settle_task(draft(&user, &model, &image, &task))
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        let account = store.user(user.user_id).await.unwrap();
        assert_eq!(account.balance, Credits::from_whole(15));
        assert_eq!(store.transactions_for(user.user_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn insufficient_funds_leaves_no_trace() {
        let (store, user, model, image) = seeded().await;
        let task = store
            .create_task(user.user_id, model.model_id, image.image_id)
            .await
            .unwrap();

        let mut expensive = draft(&user, &model, &image, &task);
        expensive.cost = Credits::from_whole(100);

        let err = store.settle_task(expensive).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Ledger(LedgerError::InsufficientFunds { .. })
        ));

        let task = store.task(task.task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Created);
        assert_eq!(
            store.user(user.user_id).await.unwrap().balance,
            Credits::from_whole(20)
        );
        assert!(store
            .prediction_for_task(task.task_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn failed_tasks_cannot_be_settled() {
        let (store, user, model, image) = seeded().await;
        let task = store
            .create_task(user.user_id, model.model_id, image.image_id)
            .await
            .unwrap();

        store
            .mark_task_failed(task.task_id, "engine exploded")
            .await
            .unwrap();

        let err = store
            .settle_task(draft(&user, &model, &image, &task))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let task = store.task(task.task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("engine exploded"));
    }

    #[tokio::test]
    async fn recommendation_lookup_is_exact_and_upsert_replaces() {
        let store = InMemoryStore::new();
        let rec = Recommendation {
            damage_type: "DR".to_string(),
            growth_stage: "V".to_string(),
            severity: Severity::Medium,
            advice: "Irrigate within 48 hours".to_string(),
            source: None,
        };
        store.upsert_recommendation(rec.clone()).await.unwrap();

        let found = store
            .recommendation("DR", "V", Severity::Medium)
            .await
            .unwrap();
        assert_eq!(found, Some(rec.clone()));
        assert_eq!(
            store.recommendation("DR", "V", Severity::High).await.unwrap(),
            None
        );

        let updated = Recommendation {
            advice: "Irrigate immediately".to_string(),
            ..rec
        };
        store.upsert_recommendation(updated.clone()).await.unwrap();
        let found = store
            .recommendation("DR", "V", Severity::Medium)
            .await
            .unwrap();
        assert_eq!(found, Some(updated));
    }
}
