// src/manifest/profiles.rs

//! Named execution targets.
//!
//! Connection parameters are opaque to the compiler; only target names are
//! consulted, to check that every job's routing resolves somewhere.

use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Profiles {
    /// Target name -> opaque connection parameters.
    #[serde(default)]
    pub targets: BTreeMap<String, serde_json::Value>,
}

impl Profiles {
    pub fn has_target(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }

    pub fn target_names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(|s| s.as_str())
    }
}
