//! `agrolens-tasks` — inference task domain records.
//!
//! Tasks, predictions, model artifacts, uploaded images and user accounts,
//! plus the wire message that crosses the producer/consumer boundary. All
//! persistence lives behind `agrolens-infra`; this crate holds the records
//! and their lifecycle rules.

pub mod account;
pub mod image;
pub mod labels;
pub mod message;
pub mod model;
pub mod prediction;
pub mod recommendation;
pub mod severity;
pub mod task;

pub use account::UserAccount;
pub use image::StoredImage;
pub use labels::LabelMap;
pub use message::TaskMessage;
pub use model::{ModelArtifact, ModelSpec};
pub use prediction::{Prediction, PredictionDraft};
pub use recommendation::{DamageType, GrowthStage, Recommendation, FALLBACK_ADVICE};
pub use severity::Severity;
pub use task::{Task, TaskStatus};
