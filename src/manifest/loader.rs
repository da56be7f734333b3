// src/manifest/loader.rs

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::errors::Result;
use crate::manifest::job::{JobRecord, RawJob};
use crate::manifest::profiles::Profiles;
use crate::manifest::source::SourceRecord;

/// The raw manifest as read from JSON.
#[derive(Debug, Deserialize)]
pub struct RawManifest {
    #[serde(default)]
    pub jobs: BTreeMap<String, RawJob>,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceRecord>,
}

/// Parsed and validated manifest: every job record is typed, every
/// schedule and window already checked.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub jobs: BTreeMap<String, JobRecord>,
    pub sources: BTreeMap<String, SourceRecord>,
}

impl TryFrom<RawManifest> for Manifest {
    type Error = crate::errors::DagforgeError;

    fn try_from(raw: RawManifest) -> Result<Self> {
        let mut jobs = BTreeMap::new();
        for (id, raw_job) in raw.jobs {
            let job = JobRecord::from_raw(id.clone(), raw_job)?;
            jobs.insert(id, job);
        }

        let mut sources = BTreeMap::new();
        for (id, mut source) in raw.sources {
            source.id = id.clone();
            sources.insert(id, source);
        }

        Ok(Manifest { jobs, sources })
    }
}

/// Load and validate a job manifest from a JSON file.
pub fn load_manifest(path: impl AsRef<Path>) -> Result<Manifest> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let raw: RawManifest = serde_json::from_str(&contents)?;
    let manifest = Manifest::try_from(raw)?;
    debug!(
        jobs = manifest.jobs.len(),
        sources = manifest.sources.len(),
        path = %path.display(),
        "manifest loaded"
    );
    Ok(manifest)
}

/// Load the profiles file with named execution targets.
pub fn load_profiles(path: impl AsRef<Path>) -> Result<Profiles> {
    let contents = fs::read_to_string(path.as_ref())?;
    let profiles: Profiles = serde_json::from_str(&contents)?;
    Ok(profiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn manifest_round_trips_through_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "jobs": {{
                    "transform.a.a1": {{
                        "domain": "a", "name": "a1", "path": "models/a/a1.sql",
                        "kind": "transform", "schedule": "@hourly"
                    }}
                }},
                "sources": {{
                    "source.raw.orders": {{
                        "source_name": "raw", "identifier": "orders",
                        "freshness": {{"warn_after_hours": 6}}
                    }}
                }}
            }}"#
        )
        .unwrap();

        let manifest = load_manifest(file.path()).unwrap();
        assert_eq!(manifest.jobs.len(), 1);
        let job = &manifest.jobs["transform.a.a1"];
        assert_eq!(job.domain, "a");
        assert!(job.is_transform());

        let source = &manifest.sources["source.raw.orders"];
        assert_eq!(source.id, "source.raw.orders");
        assert!(source.needs_freshness_check());
    }

    #[test]
    fn invalid_schedule_in_manifest_is_fatal() {
        let raw: RawManifest = serde_json::from_str(
            r#"{"jobs": {"transform.a.a1": {
                "domain": "a", "name": "a1", "kind": "transform",
                "schedule": "@hourly",
                "schedule_shift": {"minutes": 75}
            }}}"#,
        )
        .unwrap();
        assert!(Manifest::try_from(raw).is_err());
    }
}
