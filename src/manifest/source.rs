// src/manifest/source.rs

//! External data sources jobs can depend on.

use serde::Deserialize;

/// Freshness thresholds; a source with neither bound set is never checked.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FreshnessSpec {
    #[serde(default)]
    pub warn_after_hours: Option<u32>,
    #[serde(default)]
    pub error_after_hours: Option<u32>,
}

impl FreshnessSpec {
    pub fn is_empty(&self) -> bool {
        self.warn_after_hours.is_none() && self.error_after_hours.is_none()
    }
}

/// An external data source record from the manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRecord {
    #[serde(skip)]
    pub id: String,
    /// Name of the source group this table belongs to.
    pub source_name: String,
    /// The table identifier inside the source group.
    pub identifier: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub freshness: FreshnessSpec,
}

fn default_enabled() -> bool {
    true
}

impl SourceRecord {
    /// Whether a consumer of this source needs a freshness wait node.
    pub fn needs_freshness_check(&self) -> bool {
        self.enabled && !self.freshness.is_empty()
    }

    pub fn name(&self) -> String {
        format!("{}__{}", self.source_name, self.identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(enabled: bool, warn: Option<u32>) -> SourceRecord {
        SourceRecord {
            id: "source.raw.orders".to_string(),
            source_name: "raw".to_string(),
            identifier: "orders".to_string(),
            enabled,
            freshness: FreshnessSpec { warn_after_hours: warn, error_after_hours: None },
        }
    }

    #[test]
    fn freshness_requires_enabled_and_a_bound() {
        assert!(source(true, Some(6)).needs_freshness_check());
        assert!(!source(true, None).needs_freshness_check());
        assert!(!source(false, Some(6)).needs_freshness_check());
    }

    #[test]
    fn name_joins_group_and_identifier() {
        assert_eq!(source(true, None).name(), "raw__orders");
    }
}
