//! Persisted inference outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agrolens_core::{Credits, ModelId, PredictionId, TaskId, UserId};

use crate::labels::LabelMap;
use crate::severity::Severity;

/// One settled inference outcome.
///
/// Exactly one row exists per completed task; `task_id` doubles as the
/// idempotency key that deduplicates broker redeliveries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub prediction_id: PredictionId,
    pub task_id: TaskId,
    pub user_id: UserId,
    pub model_id: ModelId,
    pub object_name: String,
    pub photo_url: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub result: LabelMap,
    pub severity: Severity,
    pub recommendation: String,
    pub source: Option<String>,
    pub cost: Credits,
    pub created_at: DateTime<Utc>,
}

/// Everything the consumer hands to the store for atomic settlement: the
/// prediction row to insert, minus the id the store assigns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionDraft {
    pub task_id: TaskId,
    pub user_id: UserId,
    pub model_id: ModelId,
    pub object_name: String,
    pub photo_url: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub result: LabelMap,
    pub severity: Severity,
    pub recommendation: String,
    pub source: Option<String>,
    pub cost: Credits,
}

impl PredictionDraft {
    pub fn into_prediction(self, prediction_id: PredictionId) -> Prediction {
        Prediction {
            prediction_id,
            task_id: self.task_id,
            user_id: self.user_id,
            model_id: self.model_id,
            object_name: self.object_name,
            photo_url: self.photo_url,
            latitude: self.latitude,
            longitude: self.longitude,
            result: self.result,
            severity: self.severity,
            recommendation: self.recommendation,
            source: self.source,
            cost: self.cost,
            created_at: Utc::now(),
        }
    }
}
