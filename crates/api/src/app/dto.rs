//! Request DTOs and JSON mapping helpers.
//!
//! Money fields on the wire are integers in hundredths of a credit, same as
//! the storage representation.

use serde::Deserialize;
use serde_json::{json, Value};

use agrolens_ledger::Transaction;
use agrolens_pipeline::SubmissionReceipt;
use agrolens_tasks::{ModelArtifact, Prediction, StoredImage, Task, UserAccount};

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    /// Hundredths of a credit.
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct RegisterModelRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Hundredths of a credit.
    pub cost: i64,
    pub artifact_path: String,
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub model_id: i64,
    /// Defaults to the user's most recent upload.
    pub image_id: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

pub fn account_to_json(account: UserAccount) -> Value {
    json!({
        "user_id": account.user_id,
        "username": account.username,
        "email": account.email,
        "balance": account.balance,
        "created_at": account.created_at,
    })
}

pub fn transaction_to_json(tx: Transaction) -> Value {
    json!({
        "transaction_id": tx.transaction_id,
        "user_id": tx.user_id,
        "kind": tx.kind,
        "amount": tx.amount,
        "created_at": tx.created_at,
    })
}

pub fn model_to_json(model: ModelArtifact) -> Value {
    json!({
        "model_id": model.model_id,
        "name": model.name,
        "description": model.description,
        "cost": model.cost,
        "artifact_path": model.artifact_path,
        "created_at": model.created_at,
    })
}

pub fn image_to_json(image: StoredImage) -> Value {
    json!({
        "image_id": image.image_id,
        "user_id": image.user_id,
        "photo_url": image.public_url,
        "object_name": image.object_name,
        "created_at": image.created_at,
    })
}

pub fn task_to_json(task: Task) -> Value {
    json!({
        "id": task.task_id,
        "user_id": task.user_id,
        "model_id": task.model_id,
        "image_id": task.image_id,
        "status": task.status,
        "prediction_id": task.prediction_id,
        "prediction_result": task.result,
        "error": task.error,
        "created_at": task.created_at,
    })
}

pub fn prediction_to_json(prediction: Prediction) -> Value {
    json!({
        "prediction_id": prediction.prediction_id,
        "task_id": prediction.task_id,
        "user_id": prediction.user_id,
        "model_id": prediction.model_id,
        "photo_url": prediction.photo_url,
        "latitude": prediction.latitude,
        "longitude": prediction.longitude,
        "result": prediction.result,
        "severity": prediction.severity,
        "recommendation": prediction.recommendation,
        "source": prediction.source,
        "cost": prediction.cost,
        "created_at": prediction.created_at,
    })
}

pub fn receipt_to_json(receipt: SubmissionReceipt) -> Value {
    json!({
        "task_id": receipt.task_id,
        "cost": receipt.cost,
        "message": receipt.message,
    })
}
