#![allow(dead_code)]

use std::collections::BTreeMap;

use dagforge::config::model::Config;
use dagforge::manifest::job::{JobRecord, MaintenanceSpec, RawJob, RawShift};
use dagforge::manifest::loader::Manifest;
use dagforge::manifest::profiles::Profiles;
use dagforge::manifest::source::{FreshnessSpec, SourceRecord};
use dagforge::schedule::WaitPolicy;

/// Builder for a [`Manifest`] to simplify test setup.
pub struct ManifestBuilder {
    jobs: BTreeMap<String, RawJob>,
    sources: BTreeMap<String, SourceRecord>,
}

impl ManifestBuilder {
    pub fn new() -> Self {
        Self {
            jobs: BTreeMap::new(),
            sources: BTreeMap::new(),
        }
    }

    pub fn with_job(mut self, id: &str, job: RawJob) -> Self {
        self.jobs.insert(id.to_string(), job);
        self
    }

    pub fn with_source(mut self, id: &str, source_name: &str, identifier: &str, fresh: bool) -> Self {
        let freshness = if fresh {
            FreshnessSpec { warn_after_hours: Some(6), error_after_hours: None }
        } else {
            FreshnessSpec::default()
        };
        self.sources.insert(
            id.to_string(),
            SourceRecord {
                id: id.to_string(),
                source_name: source_name.to_string(),
                identifier: identifier.to_string(),
                enabled: true,
                freshness,
            },
        );
        self
    }

    pub fn build(self) -> Manifest {
        let mut jobs = BTreeMap::new();
        for (id, raw) in self.jobs {
            let job = JobRecord::from_raw(id.clone(), raw)
                .expect("Failed to build valid job record from builder");
            jobs.insert(id, job);
        }
        Manifest {
            jobs,
            sources: self.sources,
        }
    }
}

impl Default for ManifestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a single [`RawJob`].
pub struct JobBuilder {
    job: RawJob,
}

impl JobBuilder {
    pub fn new(domain: &str, name: &str, kind: &str) -> Self {
        Self {
            job: RawJob {
                domain: domain.to_string(),
                name: name.to_string(),
                path: format!("models/{domain}/{name}.sql"),
                kind: kind.to_string(),
                test_size: None,
                schedule: "@daily".to_string(),
                schedule_shift: None,
                depends_on: vec![],
                depends_on_sources: vec![],
                dependencies: BTreeMap::new(),
                enable_from: None,
                disable_from: None,
                target: None,
                parallelism: 1,
                maintenance: MaintenanceSpec::default(),
            },
        }
    }

    pub fn transform(domain: &str, name: &str) -> Self {
        Self::new(domain, name, "transform")
    }

    pub fn test(domain: &str, name: &str, size: &str) -> Self {
        let mut builder = Self::new(domain, name, "test");
        builder.job.test_size = Some(size.to_string());
        builder
    }

    pub fn schedule(mut self, schedule: &str) -> Self {
        self.job.schedule = schedule.to_string();
        self
    }

    pub fn shift(mut self, days: u32, hours: u32, minutes: u32) -> Self {
        self.job.schedule_shift = Some(RawShift { days, hours, minutes });
        self
    }

    pub fn path(mut self, path: &str) -> Self {
        self.job.path = path.to_string();
        self
    }

    pub fn depends_on(mut self, upstream: &str) -> Self {
        self.job.depends_on.push(upstream.to_string());
        self
    }

    pub fn depends_on_source(mut self, source: &str) -> Self {
        self.job.depends_on_sources.push(source.to_string());
        self
    }

    pub fn skip_dependency(mut self, upstream: &str) -> Self {
        let spec = self.job.dependencies.entry(upstream.to_string()).or_default();
        spec.skip = true;
        self
    }

    pub fn wait_policy(mut self, upstream: &str, policy: WaitPolicy) -> Self {
        let spec = self.job.dependencies.entry(upstream.to_string()).or_default();
        spec.wait_policy = policy;
        self
    }

    pub fn window(mut self, enable_from: Option<&str>, disable_from: Option<&str>) -> Self {
        self.job.enable_from = enable_from.map(|s| s.to_string());
        self.job.disable_from = disable_from.map(|s| s.to_string());
        self
    }

    pub fn target(mut self, target: &str) -> Self {
        self.job.target = Some(target.to_string());
        self
    }

    pub fn maintenance(mut self, spec: MaintenanceSpec) -> Self {
        self.job.maintenance = spec;
        self
    }

    pub fn build(self) -> RawJob {
        self.job
    }
}

/// A config with a single `prod` target, the default policy set.
pub fn test_config() -> Config {
    Config::with_default_target("prod")
}

/// Profiles exposing the given target names with empty connection params.
pub fn test_profiles(targets: &[&str]) -> Profiles {
    let mut profiles = Profiles::default();
    for target in targets {
        profiles
            .targets
            .insert(target.to_string(), serde_json::json!({}));
    }
    profiles
}
