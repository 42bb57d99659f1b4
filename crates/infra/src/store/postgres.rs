//! Postgres-backed service store.
//!
//! Settlement runs in one database transaction with `SELECT ... FOR UPDATE`
//! on the user and task rows; the unique constraint on `predictions.task_id`
//! catches the duplicate-delivery race a lock cannot see (two workers
//! settling the same task from different connections).
//!
//! Error code mapping: `23505` (unique violation) becomes
//! [`StoreError::Conflict`]; everything else surfaces as
//! [`StoreError::Storage`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction as PgTransaction};
use tracing::instrument;

use agrolens_core::{Credits, ImageId, ModelId, PredictionId, TaskId, TransactionId, UserId};
use agrolens_ledger::{self as ledger, Transaction, TransactionKind};
use agrolens_tasks::{
    LabelMap, ModelArtifact, ModelSpec, Prediction, PredictionDraft, Recommendation, Severity,
    StoredImage, Task, TaskStatus, UserAccount,
};

use super::{ServiceStore, StoreError};

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Apply the schema migration. Idempotent.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(include_str!("../../migrations/0001_init.sql"))
            .execute(&*self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("migration failed: {e}")))?;
        Ok(())
    }

    async fn insert_transaction(
        tx: &mut PgTransaction<'_, Postgres>,
        user_id: UserId,
        kind: TransactionKind,
        amount: Credits,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO transactions (user_id, kind, amount) VALUES ($1, $2, $3)")
            .bind(user_id.as_i64())
            .bind(kind.as_str())
            .bind(amount.as_hundredths())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("insert_transaction", e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ServiceStore for PostgresStore {
    #[instrument(skip(self), err)]
    async fn create_user(&self, username: &str, email: &str) -> Result<UserAccount, StoreError> {
        let row: UserRow = sqlx::query_as(
            r#"
            INSERT INTO users (username, email)
            VALUES ($1, $2)
            RETURNING user_id, username, email, balance, created_at
            "#,
        )
        .bind(username)
        .bind(email)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_user", e))?;

        Ok(row.into())
    }

    async fn user(&self, user_id: UserId) -> Result<UserAccount, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT user_id, username, email, balance, created_at FROM users WHERE user_id = $1",
        )
        .bind(user_id.as_i64())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("user", e))?;

        row.map(Into::into).ok_or(StoreError::NotFound("user"))
    }

    #[instrument(skip(self), fields(user_id = user_id.as_i64(), amount = %amount), err)]
    async fn deposit(&self, user_id: UserId, amount: Credits) -> Result<UserAccount, StoreError> {
        if !amount.is_positive() {
            return Err(ledger::LedgerError::InvalidAmount.into());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        let row: Option<UserRow> = sqlx::query_as(
            r#"
            UPDATE users SET balance = balance + $2
            WHERE user_id = $1
            RETURNING user_id, username, email, balance, created_at
            "#,
        )
        .bind(user_id.as_i64())
        .bind(amount.as_hundredths())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("deposit", e))?;

        let account: UserAccount = row.map(Into::into).ok_or(StoreError::NotFound("user"))?;
        Self::insert_transaction(&mut tx, user_id, TransactionKind::Deposit, amount).await?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(account)
    }

    async fn transactions_for(&self, user_id: UserId) -> Result<Vec<Transaction>, StoreError> {
        let rows: Vec<TransactionRow> = sqlx::query_as(
            r#"
            SELECT transaction_id, user_id, kind, amount, created_at
            FROM transactions
            WHERE user_id = $1
            ORDER BY transaction_id ASC
            "#,
        )
        .bind(user_id.as_i64())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("transactions_for", e))?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    #[instrument(skip(self, spec), fields(name = %spec.name), err)]
    async fn register_model(&self, spec: ModelSpec) -> Result<ModelArtifact, StoreError> {
        let row: ModelRow = sqlx::query_as(
            r#"
            INSERT INTO models (name, description, cost, artifact_path)
            VALUES ($1, $2, $3, $4)
            RETURNING model_id, name, description, cost, artifact_path, created_at
            "#,
        )
        .bind(&spec.name)
        .bind(&spec.description)
        .bind(spec.cost.as_hundredths())
        .bind(&spec.artifact_path)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("register_model", e))?;

        Ok(row.into())
    }

    async fn model(&self, model_id: ModelId) -> Result<ModelArtifact, StoreError> {
        let row: Option<ModelRow> = sqlx::query_as(
            r#"
            SELECT model_id, name, description, cost, artifact_path, created_at
            FROM models WHERE model_id = $1
            "#,
        )
        .bind(model_id.as_i64())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("model", e))?;

        row.map(Into::into).ok_or(StoreError::NotFound("model"))
    }

    async fn models(&self) -> Result<Vec<ModelArtifact>, StoreError> {
        let rows: Vec<ModelRow> = sqlx::query_as(
            r#"
            SELECT model_id, name, description, cost, artifact_path, created_at
            FROM models ORDER BY model_id ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("models", e))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn record_image(
        &self,
        user_id: UserId,
        public_url: &str,
        internal_url: &str,
        object_name: &str,
    ) -> Result<StoredImage, StoreError> {
        let row: ImageRow = sqlx::query_as(
            r#"
            INSERT INTO user_images (user_id, public_url, internal_url, object_name)
            VALUES ($1, $2, $3, $4)
            RETURNING image_id, user_id, public_url, internal_url, object_name, created_at
            "#,
        )
        .bind(user_id.as_i64())
        .bind(public_url)
        .bind(internal_url)
        .bind(object_name)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_fk_to_not_found("user", e))?;

        Ok(row.into())
    }

    async fn image(&self, image_id: ImageId) -> Result<StoredImage, StoreError> {
        let row: Option<ImageRow> = sqlx::query_as(
            r#"
            SELECT image_id, user_id, public_url, internal_url, object_name, created_at
            FROM user_images WHERE image_id = $1
            "#,
        )
        .bind(image_id.as_i64())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("image", e))?;

        row.map(Into::into).ok_or(StoreError::NotFound("image"))
    }

    async fn latest_image_for(&self, user_id: UserId) -> Result<Option<StoredImage>, StoreError> {
        let row: Option<ImageRow> = sqlx::query_as(
            r#"
            SELECT image_id, user_id, public_url, internal_url, object_name, created_at
            FROM user_images
            WHERE user_id = $1
            ORDER BY image_id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id.as_i64())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("latest_image_for", e))?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self), fields(user_id = user_id.as_i64(), model_id = model_id.as_i64()), err)]
    async fn create_task(
        &self,
        user_id: UserId,
        model_id: ModelId,
        image_id: ImageId,
    ) -> Result<Task, StoreError> {
        let row: TaskRow = sqlx::query_as(
            r#"
            INSERT INTO tasks (user_id, model_id, image_id)
            VALUES ($1, $2, $3)
            RETURNING task_id, user_id, model_id, image_id, status,
                      prediction_id, result, error, created_at
            "#,
        )
        .bind(user_id.as_i64())
        .bind(model_id.as_i64())
        .bind(image_id.as_i64())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_fk_to_not_found("task reference", e))?;

        row.try_into()
    }

    async fn task(&self, task_id: TaskId) -> Result<Task, StoreError> {
        let row: Option<TaskRow> = sqlx::query_as(
            r#"
            SELECT task_id, user_id, model_id, image_id, status,
                   prediction_id, result, error, created_at
            FROM tasks WHERE task_id = $1
            "#,
        )
        .bind(task_id.as_i64())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("task", e))?;

        row.ok_or(StoreError::NotFound("task"))?.try_into()
    }

    #[instrument(skip(self), fields(task_id = task_id.as_i64()), err)]
    async fn mark_task_failed(&self, task_id: TaskId, error: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'failed', error = $2 WHERE task_id = $1 AND status = 'created'",
        )
        .bind(task_id.as_i64())
        .bind(error)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_task_failed", e))?;

        if result.rows_affected() == 1 {
            return Ok(());
        }
        // Row missing or already terminal; tell the caller which.
        let task = self.task(task_id).await?;
        Err(StoreError::Conflict(format!(
            "task {} is already {}",
            task.task_id, task.status
        )))
    }

    async fn prediction_for_task(
        &self,
        task_id: TaskId,
    ) -> Result<Option<Prediction>, StoreError> {
        let row: Option<PredictionRow> = sqlx::query_as(
            r#"
            SELECT prediction_id, task_id, user_id, model_id, object_name, photo_url,
                   latitude, longitude, result, severity, recommendation, source,
                   cost, created_at
            FROM predictions WHERE task_id = $1
            "#,
        )
        .bind(task_id.as_i64())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("prediction_for_task", e))?;

        row.map(TryInto::try_into).transpose()
    }

    async fn predictions_for(&self, user_id: UserId) -> Result<Vec<Prediction>, StoreError> {
        let rows: Vec<PredictionRow> = sqlx::query_as(
            r#"
            SELECT prediction_id, task_id, user_id, model_id, object_name, photo_url,
                   latitude, longitude, result, severity, recommendation, source,
                   cost, created_at
            FROM predictions
            WHERE user_id = $1
            ORDER BY prediction_id ASC
            "#,
        )
        .bind(user_id.as_i64())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("predictions_for", e))?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    #[instrument(
        skip(self, draft),
        fields(task_id = draft.task_id.as_i64(), user_id = draft.user_id.as_i64()),
        err
    )]
    async fn settle_task(&self, draft: PredictionDraft) -> Result<Prediction, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        // Lock the user row, then check and debit under the lock.
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT balance FROM users WHERE user_id = $1 FOR UPDATE")
                .bind(draft.user_id.as_i64())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("settle_task", e))?;
        let balance =
            Credits::from_hundredths(balance.ok_or(StoreError::NotFound("user"))?);
        let next_balance = ledger::deduct(balance, draft.cost)?;

        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM tasks WHERE task_id = $1 FOR UPDATE")
                .bind(draft.task_id.as_i64())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("settle_task", e))?;
        let status = status.ok_or(StoreError::NotFound("task"))?;
        if status != "created" {
            return Err(StoreError::Conflict(format!(
                "task {} is already {status}",
                draft.task_id
            )));
        }

        let result_json = serde_json::to_value(&draft.result)
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        // Unique task_id turns the duplicate-delivery race into a 23505.
        let row: PredictionRow = sqlx::query_as(
            r#"
            INSERT INTO predictions (
                task_id, user_id, model_id, object_name, photo_url,
                latitude, longitude, result, severity, recommendation,
                source, cost
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING prediction_id, task_id, user_id, model_id, object_name, photo_url,
                      latitude, longitude, result, severity, recommendation, source,
                      cost, created_at
            "#,
        )
        .bind(draft.task_id.as_i64())
        .bind(draft.user_id.as_i64())
        .bind(draft.model_id.as_i64())
        .bind(&draft.object_name)
        .bind(&draft.photo_url)
        .bind(draft.latitude)
        .bind(draft.longitude)
        .bind(&result_json)
        .bind(draft.severity.as_str())
        .bind(&draft.recommendation)
        .bind(&draft.source)
        .bind(draft.cost.as_hundredths())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_prediction", e))?;

        sqlx::query(
            r#"
            UPDATE tasks SET status = 'complete', prediction_id = $2, result = $3
            WHERE task_id = $1
            "#,
        )
        .bind(draft.task_id.as_i64())
        .bind(row.prediction_id)
        .bind(&result_json)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("complete_task", e))?;

        sqlx::query("UPDATE users SET balance = $2 WHERE user_id = $1")
            .bind(draft.user_id.as_i64())
            .bind(next_balance.as_hundredths())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("debit_user", e))?;

        Self::insert_transaction(&mut tx, draft.user_id, TransactionKind::Deduct, draft.cost)
            .await?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        row.try_into()
    }

    async fn upsert_recommendation(&self, rec: Recommendation) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO recommendations (damage_type, growth_stage, severity, advice, source)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (damage_type, growth_stage, severity)
            DO UPDATE SET advice = EXCLUDED.advice, source = EXCLUDED.source
            "#,
        )
        .bind(&rec.damage_type)
        .bind(&rec.growth_stage)
        .bind(rec.severity.as_str())
        .bind(&rec.advice)
        .bind(&rec.source)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_recommendation", e))?;
        Ok(())
    }

    async fn recommendation(
        &self,
        damage: &str,
        growth_stage: &str,
        severity: Severity,
    ) -> Result<Option<Recommendation>, StoreError> {
        let row: Option<RecommendationRow> = sqlx::query_as(
            r#"
            SELECT damage_type, growth_stage, severity, advice, source
            FROM recommendations
            WHERE damage_type = $1 AND growth_stage = $2 AND severity = $3
            "#,
        )
        .bind(damage)
        .bind(growth_stage)
        .bind(severity.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("recommendation", e))?;

        row.map(TryInto::try_into).transpose()
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        let msg = format!("database error in {operation}: {}", db_err.message());
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::Conflict(msg);
        }
        return StoreError::Storage(msg);
    }
    StoreError::Storage(format!("{operation}: {err}"))
}

/// Foreign key violations on inserts mean a referenced row is missing.
fn map_fk_to_not_found(entity: &'static str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23503") {
            return StoreError::NotFound(entity);
        }
    }
    map_sqlx_error(entity, err)
}

fn parse_severity(s: &str) -> Result<Severity, StoreError> {
    match s {
        "low" => Ok(Severity::Low),
        "medium" => Ok(Severity::Medium),
        "high" => Ok(Severity::High),
        other => Err(StoreError::Storage(format!("unknown severity '{other}'"))),
    }
}

fn parse_kind(s: &str) -> Result<TransactionKind, StoreError> {
    match s {
        "deposit" => Ok(TransactionKind::Deposit),
        "deduct" => Ok(TransactionKind::Deduct),
        other => Err(StoreError::Storage(format!(
            "unknown transaction kind '{other}'"
        ))),
    }
}

fn parse_status(s: &str) -> Result<TaskStatus, StoreError> {
    match s {
        "created" => Ok(TaskStatus::Created),
        "complete" => Ok(TaskStatus::Complete),
        "failed" => Ok(TaskStatus::Failed),
        other => Err(StoreError::Storage(format!("unknown task status '{other}'"))),
    }
}

// SQLx row types

#[derive(Debug, FromRow)]
struct UserRow {
    user_id: i64,
    username: String,
    email: String,
    balance: i64,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for UserAccount {
    fn from(row: UserRow) -> Self {
        UserAccount {
            user_id: UserId::new(row.user_id),
            username: row.username,
            email: row.email,
            balance: Credits::from_hundredths(row.balance),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    transaction_id: i64,
    user_id: i64,
    kind: String,
    amount: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, StoreError> {
        Ok(Transaction {
            transaction_id: TransactionId::new(row.transaction_id),
            user_id: UserId::new(row.user_id),
            kind: parse_kind(&row.kind)?,
            amount: Credits::from_hundredths(row.amount),
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ModelRow {
    model_id: i64,
    name: String,
    description: String,
    cost: i64,
    artifact_path: String,
    created_at: DateTime<Utc>,
}

impl From<ModelRow> for ModelArtifact {
    fn from(row: ModelRow) -> Self {
        ModelArtifact {
            model_id: ModelId::new(row.model_id),
            name: row.name,
            description: row.description,
            cost: Credits::from_hundredths(row.cost),
            artifact_path: row.artifact_path,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ImageRow {
    image_id: i64,
    user_id: i64,
    public_url: String,
    internal_url: String,
    object_name: String,
    created_at: DateTime<Utc>,
}

impl From<ImageRow> for StoredImage {
    fn from(row: ImageRow) -> Self {
        StoredImage {
            image_id: ImageId::new(row.image_id),
            user_id: UserId::new(row.user_id),
            public_url: row.public_url,
            internal_url: row.internal_url,
            object_name: row.object_name,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct TaskRow {
    task_id: i64,
    user_id: i64,
    model_id: i64,
    image_id: i64,
    status: String,
    prediction_id: Option<i64>,
    result: Option<serde_json::Value>,
    error: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, StoreError> {
        let result: Option<LabelMap> = row
            .result
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| StoreError::Storage(format!("malformed task result: {e}")))?;
        Ok(Task {
            task_id: TaskId::new(row.task_id),
            user_id: UserId::new(row.user_id),
            model_id: ModelId::new(row.model_id),
            image_id: ImageId::new(row.image_id),
            status: parse_status(&row.status)?,
            prediction_id: row.prediction_id.map(PredictionId::new),
            result,
            error: row.error,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PredictionRow {
    prediction_id: i64,
    task_id: i64,
    user_id: i64,
    model_id: i64,
    object_name: String,
    photo_url: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    result: serde_json::Value,
    severity: String,
    recommendation: String,
    source: Option<String>,
    cost: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<PredictionRow> for Prediction {
    type Error = StoreError;

    fn try_from(row: PredictionRow) -> Result<Self, StoreError> {
        let result: LabelMap = serde_json::from_value(row.result)
            .map_err(|e| StoreError::Storage(format!("malformed prediction result: {e}")))?;
        Ok(Prediction {
            prediction_id: PredictionId::new(row.prediction_id),
            task_id: TaskId::new(row.task_id),
            user_id: UserId::new(row.user_id),
            model_id: ModelId::new(row.model_id),
            object_name: row.object_name,
            photo_url: row.photo_url,
            latitude: row.latitude,
            longitude: row.longitude,
            result,
            severity: parse_severity(&row.severity)?,
            recommendation: row.recommendation,
            source: row.source,
            cost: Credits::from_hundredths(row.cost),
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct RecommendationRow {
    damage_type: String,
    growth_stage: String,
    severity: String,
    advice: String,
    source: Option<String>,
}

impl TryFrom<RecommendationRow> for Recommendation {
    type Error = StoreError;

    fn try_from(row: RecommendationRow) -> Result<Self, StoreError> {
        Ok(Recommendation {
            damage_type: row.damage_type,
            growth_stage: row.growth_stage,
            severity: parse_severity(&row.severity)?,
            advice: row.advice,
            source: row.source,
        })
    }
}
