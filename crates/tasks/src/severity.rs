//! Severity bucketing of the damage extent.

use serde::{Deserialize, Serialize};

/// Fixed classification of the numeric `extent` head.
///
/// Buckets: `[10, 40)` low, `[40, 70)` medium, `[70, 100]` high. Anything
/// outside `[10, 100]` (including a missing or unparseable extent) falls back
/// to low, a quirk inherited from the original service and kept deliberately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn from_extent(extent: Option<f64>) -> Self {
        match extent {
            Some(e) if (40.0..70.0).contains(&e) => Severity::Medium,
            Some(e) if (70.0..=100.0).contains(&e) => Severity::High,
            _ => Severity::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl core::fmt::Display for Severity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
