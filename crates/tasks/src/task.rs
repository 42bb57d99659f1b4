//! Task lifecycle record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agrolens_core::{DomainError, ImageId, ModelId, PredictionId, TaskId, UserId};

use crate::labels::LabelMap;

/// Lifecycle state of an inference task.
///
/// `Created` is the only non-terminal state. The producer writes it; the
/// consumer moves the row exactly once to `Complete` (successful settlement)
/// or `Failed` (processing error, message dead-lettered).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Created,
    Complete,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Created => "created",
            TaskStatus::Complete => "complete",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Created)
    }
}

impl core::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One submitted inference request.
///
/// Invariants: `Complete` implies `prediction_id` and `result` are set;
/// `Created` implies neither is. Rows are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub user_id: UserId,
    pub model_id: ModelId,
    pub image_id: ImageId,
    pub status: TaskStatus,
    pub prediction_id: Option<PredictionId>,
    pub result: Option<LabelMap>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(task_id: TaskId, user_id: UserId, model_id: ModelId, image_id: ImageId) -> Self {
        Self {
            task_id,
            user_id,
            model_id,
            image_id,
            status: TaskStatus::Created,
            prediction_id: None,
            result: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Move the task to its successful terminal state.
    pub fn complete(
        &mut self,
        prediction_id: PredictionId,
        result: LabelMap,
    ) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::invariant(format!(
                "task {} is already {}",
                self.task_id, self.status
            )));
        }
        self.status = TaskStatus::Complete;
        self.prediction_id = Some(prediction_id);
        self.result = Some(result);
        Ok(())
    }

    /// Move the task to its failed terminal state, recording the cause.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::invariant(format!(
                "task {} is already {}",
                self.task_id, self.status
            )));
        }
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_task() -> Task {
        Task::new(
            TaskId::new(1),
            UserId::new(1),
            ModelId::new(1),
            ImageId::new(1),
        )
    }

    #[test]
    fn new_task_starts_created_with_no_prediction() {
        let task = test_task();
        assert_eq!(task.status, TaskStatus::Created);
        assert!(task.prediction_id.is_none());
        assert!(task.result.is_none());
    }

    #[test]
    fn complete_sets_prediction_and_result() {
        let mut task = test_task();
        let mut labels = LabelMap::new();
        labels.insert("damage", "DR");

        task.complete(PredictionId::new(9), labels.clone()).unwrap();

        assert_eq!(task.status, TaskStatus::Complete);
        assert_eq!(task.prediction_id, Some(PredictionId::new(9)));
        assert_eq!(task.result, Some(labels));
    }

    #[test]
    fn terminal_tasks_cannot_transition_again() {
        let mut task = test_task();
        task.fail("engine exploded").unwrap();

        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.complete(PredictionId::new(1), LabelMap::new()).is_err());
        assert!(task.fail("again").is_err());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Complete).unwrap(),
            "\"complete\""
        );
    }
}
