//! Inference engine boundary.

use std::sync::Arc;

use agrolens_tasks::LabelMap;

/// Engine-side failure.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The model artifact could not be resolved or downloaded.
    #[error("artifact unavailable: {0}")]
    Artifact(String),

    /// The image bytes could not be decoded into model input.
    #[error("invalid input image: {0}")]
    InvalidImage(String),

    /// The computation itself failed.
    #[error("inference failed: {0}")]
    Inference(String),
}

/// The opaque computation collaborator.
///
/// Consumes a versioned artifact reference plus raw image bytes and returns a
/// decoded label map (output-head name → label). Model loading, tensor
/// preprocessing and label decoding all live behind this seam. Calls are
/// blocking and unbounded from the pipeline's point of view.
#[async_trait::async_trait]
pub trait InferenceEngine: Send + Sync {
    async fn infer(&self, artifact_path: &str, image: &[u8]) -> Result<LabelMap, EngineError>;
}

#[async_trait::async_trait]
impl<E> InferenceEngine for Arc<E>
where
    E: InferenceEngine + ?Sized,
{
    async fn infer(&self, artifact_path: &str, image: &[u8]) -> Result<LabelMap, EngineError> {
        (**self).infer(artifact_path, image).await
    }
}

/// Engine that always answers with a fixed label map, or a fixed error.
///
/// For tests and dev mode; no model is loaded.
#[derive(Debug, Clone)]
pub struct StaticEngine {
    outcome: Result<LabelMap, String>,
}

impl StaticEngine {
    pub fn answering(labels: LabelMap) -> Self {
        Self {
            outcome: Ok(labels),
        }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            outcome: Err(reason.into()),
        }
    }
}

#[async_trait::async_trait]
impl InferenceEngine for StaticEngine {
    async fn infer(&self, _artifact_path: &str, _image: &[u8]) -> Result<LabelMap, EngineError> {
        match &self.outcome {
            Ok(labels) => Ok(labels.clone()),
            Err(reason) => Err(EngineError::Inference(reason.clone())),
        }
    }
}
