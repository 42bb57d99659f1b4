//! Agronomic recommendation catalog.

use serde::{Deserialize, Serialize};

use crate::severity::Severity;

/// Advice returned when no catalog row matches the lookup key.
pub const FALLBACK_ADVICE: &str = "No recommendation available for this combination";

/// Damage classes the models emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DamageType {
    #[serde(rename = "G")]
    Growth,
    #[serde(rename = "DR")]
    Drought,
    #[serde(rename = "WD")]
    Weed,
}

impl DamageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DamageType::Growth => "G",
            DamageType::Drought => "DR",
            DamageType::Weed => "WD",
        }
    }
}

/// Crop growth stages the models and the enrichment provider emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrowthStage {
    #[serde(rename = "S")]
    Sowing,
    #[serde(rename = "V")]
    Vegetative,
    #[serde(rename = "F")]
    Flowering,
    #[serde(rename = "M")]
    Maturity,
}

impl GrowthStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrowthStage::Sowing => "S",
            GrowthStage::Vegetative => "V",
            GrowthStage::Flowering => "F",
            GrowthStage::Maturity => "M",
        }
    }
}

/// One catalog row: advice for a `(damage, growth stage, severity)` triple.
///
/// Lookups key on the raw label strings because the models may emit heads the
/// catalog enums do not cover yet; the enums exist for seeding and validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub damage_type: String,
    pub growth_stage: String,
    pub severity: Severity,
    pub advice: String,
    pub source: Option<String>,
}

impl Recommendation {
    pub fn new(
        damage_type: DamageType,
        growth_stage: GrowthStage,
        severity: Severity,
        advice: impl Into<String>,
        source: Option<String>,
    ) -> Self {
        Self {
            damage_type: damage_type.as_str().to_string(),
            growth_stage: growth_stage.as_str().to_string(),
            severity,
            advice: advice.into(),
            source,
        }
    }

    pub fn matches(&self, damage: &str, growth_stage: &str, severity: Severity) -> bool {
        self.damage_type == damage && self.growth_stage == growth_stage && self.severity == severity
    }
}
