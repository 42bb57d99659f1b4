//! Task message — the only state that crosses the producer/consumer boundary.

use serde::{Deserialize, Serialize};

use agrolens_core::{DomainError, ImageId, ModelId, TaskId, UserId};

/// Broker payload published per submitted task.
///
/// A *pointer* into the store, not a copy of truth: the consumer re-fetches
/// every referenced row by key and trusts nothing else in the message. The
/// denormalized `artifact_path` lets the worker act without calling back to
/// the producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub task_id: TaskId,
    pub user_id: UserId,
    pub model_id: ModelId,
    pub artifact_path: String,
    pub image_id: ImageId,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl TaskMessage {
    /// Serialize to the wire form (JSON bytes).
    pub fn encode(&self) -> Result<Vec<u8>, DomainError> {
        serde_json::to_vec(self).map_err(|e| DomainError::validation(e.to_string()))
    }

    /// Parse from the wire form.
    pub fn decode(bytes: &[u8]) -> Result<Self, DomainError> {
        serde_json::from_slice(bytes)
            .map_err(|e| DomainError::validation(format!("malformed task message: {e}")))
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_message() -> TaskMessage {
        TaskMessage {
            task_id: TaskId::new(7),
            user_id: UserId::new(1),
            model_id: ModelId::new(2),
            artifact_path: "agri/crop-damage/multihead:v3".to_string(),
            image_id: ImageId::new(11),
            latitude: None,
            longitude: None,
        }
    }

    #[test]
    fn wire_field_names_are_stable() {
        let value: serde_json::Value =
            serde_json::from_slice(&test_message().encode().unwrap()).unwrap();

        assert_eq!(value["task_id"], 7);
        assert_eq!(value["user_id"], 1);
        assert_eq!(value["model_id"], 2);
        assert_eq!(value["artifact_path"], "agri/crop-damage/multihead:v3");
        assert_eq!(value["image_id"], 11);
        assert!(value["latitude"].is_null());
        assert!(value["longitude"].is_null());
    }

    #[test]
    fn round_trips_with_coordinates() {
        let mut msg = test_message();
        msg.latitude = Some(52.52);
        msg.longitude = Some(13.40);

        let decoded = TaskMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.coordinates(), Some((52.52, 13.40)));
    }

    #[test]
    fn coordinates_require_both_halves() {
        let mut msg = test_message();
        msg.latitude = Some(52.52);
        assert_eq!(msg.coordinates(), None);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(TaskMessage::decode(b"{not json").is_err());
    }
}
