//! Optional geospatial enrichment boundary.

use std::sync::Arc;

use agrolens_tasks::GrowthStage;

#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("enrichment provider unavailable: {0}")]
    Unavailable(String),

    #[error("enrichment lookup failed: {0}")]
    Lookup(String),
}

/// Satellite-backed growth-stage lookup for a coordinate pair.
///
/// Only consulted when the task message carries both coordinates. A failure
/// here degrades the result; it never aborts the task.
#[async_trait::async_trait]
pub trait GrowthStageProvider: Send + Sync {
    /// `Ok(None)` means the provider had no data for the location.
    async fn growth_stage(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<GrowthStage>, EnrichError>;
}

#[async_trait::async_trait]
impl<G> GrowthStageProvider for Arc<G>
where
    G: GrowthStageProvider + ?Sized,
{
    async fn growth_stage(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<GrowthStage>, EnrichError> {
        (**self).growth_stage(latitude, longitude).await
    }
}

/// Provider that never has data. The default wiring when no geospatial
/// backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEnrichment;

#[async_trait::async_trait]
impl GrowthStageProvider for NoEnrichment {
    async fn growth_stage(
        &self,
        _latitude: f64,
        _longitude: f64,
    ) -> Result<Option<GrowthStage>, EnrichError> {
        Ok(None)
    }
}

/// Provider with a fixed answer (or a fixed failure) for tests.
#[derive(Debug, Clone)]
pub struct StaticGrowthStage {
    outcome: Result<Option<GrowthStage>, String>,
}

impl StaticGrowthStage {
    pub fn answering(stage: GrowthStage) -> Self {
        Self {
            outcome: Ok(Some(stage)),
        }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            outcome: Err(reason.into()),
        }
    }
}

#[async_trait::async_trait]
impl GrowthStageProvider for StaticGrowthStage {
    async fn growth_stage(
        &self,
        _latitude: f64,
        _longitude: f64,
    ) -> Result<Option<GrowthStage>, EnrichError> {
        match &self.outcome {
            Ok(stage) => Ok(*stage),
            Err(reason) => Err(EnrichError::Lookup(reason.clone())),
        }
    }
}
