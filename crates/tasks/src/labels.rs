//! Decoded inference output.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Well-known output heads of the crop damage models.
pub const DAMAGE_HEAD: &str = "damage";
pub const GROWTH_STAGE_HEAD: &str = "growth_stage";
pub const EXTENT_HEAD: &str = "extent";

/// Opaque mapping from output-head name to a decoded label.
///
/// Label decoding is the inference engine's responsibility; the pipeline only
/// reads a few well-known heads (damage type, growth stage, numeric extent)
/// and passes the rest through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelMap(BTreeMap<String, String>);

impl LabelMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, head: &str) -> Option<&str> {
        self.0.get(head).map(String::as_str)
    }

    pub fn insert(&mut self, head: impl Into<String>, label: impl Into<String>) {
        self.0.insert(head.into(), label.into());
    }

    /// Insert only when the head has no label yet.
    pub fn insert_if_absent(&mut self, head: impl Into<String>, label: impl Into<String>) {
        self.0.entry(head.into()).or_insert_with(|| label.into());
    }

    pub fn damage(&self) -> Option<&str> {
        self.get(DAMAGE_HEAD)
    }

    pub fn growth_stage(&self) -> Option<&str> {
        self.get(GROWTH_STAGE_HEAD)
    }

    /// Numeric damage extent, if the head is present and parses.
    pub fn extent(&self) -> Option<f64> {
        self.get(EXTENT_HEAD)?.trim().parse().ok()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for LabelMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
