// src/manifest/job.rs

//! Parsed job records: the transformation units the graph is built from.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::model::TargetsConfig;
use crate::errors::{DagforgeError, Result};
use crate::schedule::{Frequency, Schedule, Shift, WaitPolicy};

pub const WINDOW_TIMESTAMP_FMT: &str = "%Y-%m-%dT%H:%M:%S";

/// What a job does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Transform,
    Test(TestSize),
    Snapshot,
    Seed,
}

/// Test granularity: small tests nest under their parent transform, medium
/// tests aggregate per container, large tests get their own container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestSize {
    Small,
    Medium,
    Large,
}

/// Per-upstream dependency configuration.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct DependencySpec {
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub wait_policy: WaitPolicy,
}

/// Optional enable/disable window gating a job's model node at run time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Window {
    pub enable_from: Option<DateTime<Utc>>,
    pub disable_from: Option<DateTime<Utc>>,
}

impl Window {
    pub fn is_empty(&self) -> bool {
        self.enable_from.is_none() && self.disable_from.is_none()
    }
}

/// Maintenance operations a model opts into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceKind {
    PersistDocs,
    OptimizeTable,
    VacuumTable,
    DeduplicateTable,
    SetTtlOnTable,
}

impl MaintenanceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaintenanceKind::PersistDocs => "persist_docs",
            MaintenanceKind::OptimizeTable => "optimize_table",
            MaintenanceKind::VacuumTable => "vacuum_table",
            MaintenanceKind::DeduplicateTable => "deduplicate_table",
            MaintenanceKind::SetTtlOnTable => "set_ttl_on_table",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TtlSpec {
    /// Timestamp-like column the expiration is computed from.
    pub key: String,
    pub expiration_timeout_days: u32,
    #[serde(default)]
    pub additional_predicate: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MaintenanceSpec {
    #[serde(default)]
    pub persist_docs: bool,
    #[serde(default)]
    pub optimize_table: bool,
    #[serde(default)]
    pub vacuum_table: bool,
    #[serde(default)]
    pub deduplicate_table: bool,
    #[serde(default)]
    pub ttl: Option<TtlSpec>,
}

impl MaintenanceSpec {
    pub fn required_kinds(&self) -> Vec<MaintenanceKind> {
        let mut kinds = Vec::new();
        if self.ttl.is_some() {
            kinds.push(MaintenanceKind::SetTtlOnTable);
        }
        if self.persist_docs {
            kinds.push(MaintenanceKind::PersistDocs);
        }
        if self.optimize_table {
            kinds.push(MaintenanceKind::OptimizeTable);
        }
        if self.vacuum_table {
            kinds.push(MaintenanceKind::VacuumTable);
        }
        if self.deduplicate_table {
            kinds.push(MaintenanceKind::DeduplicateTable);
        }
        kinds
    }
}

/// Raw job entry as read from the manifest, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawJob {
    pub domain: String,
    pub name: String,
    #[serde(default)]
    pub path: String,
    pub kind: String,
    #[serde(default)]
    pub test_size: Option<String>,
    #[serde(default = "default_schedule")]
    pub schedule: String,
    #[serde(default)]
    pub schedule_shift: Option<RawShift>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub depends_on_sources: Vec<String>,
    /// Per-upstream overrides keyed by the upstream job id.
    #[serde(default)]
    pub dependencies: BTreeMap<String, DependencySpec>,
    #[serde(default)]
    pub enable_from: Option<String>,
    #[serde(default)]
    pub disable_from: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
    #[serde(default)]
    pub maintenance: MaintenanceSpec,
}

fn default_schedule() -> String {
    "@daily".to_string()
}

fn default_parallelism() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RawShift {
    #[serde(default)]
    pub days: u32,
    #[serde(default)]
    pub hours: u32,
    #[serde(default)]
    pub minutes: u32,
}

/// A validated, immutable job record.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: String,
    pub domain: String,
    pub name: String,
    pub path: String,
    pub kind: JobKind,
    pub schedule: Schedule,
    pub depends_on: Vec<String>,
    pub depends_on_sources: Vec<String>,
    pub dependencies: BTreeMap<String, DependencySpec>,
    pub window: Window,
    pub target: Option<String>,
    pub parallelism: u32,
    pub maintenance: MaintenanceSpec,
}

impl JobRecord {
    pub fn from_raw(id: String, raw: RawJob) -> Result<Self> {
        let kind = parse_kind(&id, &raw.kind, raw.test_size.as_deref())?;

        let frequency: Frequency = raw.schedule.parse().map_err(|e| {
            DagforgeError::Config(format!("job '{id}': {e}"))
        })?;
        let shift = raw
            .schedule_shift
            .map(|s| Shift::new(s.days, s.hours, s.minutes))
            .unwrap_or(Shift::ZERO);
        let schedule = Schedule::new(frequency, shift)
            .map_err(|e| DagforgeError::Schedule(format!("job '{id}': {e}")))?;

        let window = Window {
            enable_from: parse_window_timestamp(&id, raw.enable_from.as_deref())?,
            disable_from: parse_window_timestamp(&id, raw.disable_from.as_deref())?,
        };

        Ok(JobRecord {
            id,
            domain: raw.domain,
            name: raw.name,
            path: raw.path,
            kind,
            schedule,
            depends_on: raw.depends_on,
            depends_on_sources: raw.depends_on_sources,
            dependencies: raw.dependencies,
            window,
            target: raw.target,
            parallelism: raw.parallelism.max(1),
            maintenance: raw.maintenance,
        })
    }

    pub fn is_transform(&self) -> bool {
        matches!(self.kind, JobKind::Transform)
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(self.kind, JobKind::Snapshot)
    }

    pub fn is_seed(&self) -> bool {
        matches!(self.kind, JobKind::Seed)
    }

    pub fn is_small_test(&self) -> bool {
        matches!(self.kind, JobKind::Test(TestSize::Small))
    }

    pub fn is_medium_test(&self) -> bool {
        matches!(self.kind, JobKind::Test(TestSize::Medium))
    }

    pub fn is_large_test(&self) -> bool {
        matches!(self.kind, JobKind::Test(TestSize::Large))
    }

    /// Per-upstream dependency config; defaults when the job has no
    /// explicit entry for that upstream.
    pub fn dependency_spec(&self, upstream_id: &str) -> DependencySpec {
        self.dependencies.get(upstream_id).copied().unwrap_or_default()
    }

    /// The job's file path without its extension; medium tests are matched
    /// to their parent transform through this.
    pub fn path_without_extension(&self) -> String {
        Path::new(&self.path)
            .with_extension("")
            .to_string_lossy()
            .into_owned()
    }

    /// Resolve which named execution target this job runs against.
    pub fn target_environment(&self, targets: &TargetsConfig) -> String {
        if let Some(target) = &self.target {
            return target.clone();
        }
        match self.kind {
            JobKind::Test(_) => targets.tests.clone(),
            _ => targets.default.clone(),
        }
    }
}

fn parse_kind(id: &str, kind: &str, test_size: Option<&str>) -> Result<JobKind> {
    match kind {
        "transform" | "model" => Ok(JobKind::Transform),
        "snapshot" => Ok(JobKind::Snapshot),
        "seed" => Ok(JobKind::Seed),
        "test" => {
            let size = match test_size.unwrap_or("small") {
                "small" => TestSize::Small,
                "medium" => TestSize::Medium,
                "large" => TestSize::Large,
                other => {
                    return Err(DagforgeError::Config(format!(
                        "job '{id}': unknown test size '{other}'"
                    )));
                }
            };
            Ok(JobKind::Test(size))
        }
        other => Err(DagforgeError::Config(format!(
            "job '{id}': unknown kind '{other}'"
        ))),
    }
}

fn parse_window_timestamp(id: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    let naive = NaiveDateTime::parse_from_str(value, WINDOW_TIMESTAMP_FMT).map_err(|_| {
        DagforgeError::Config(format!(
            "job '{id}': window timestamp '{value}' does not match {WINDOW_TIMESTAMP_FMT}"
        ))
    })?;
    Ok(Some(naive.and_utc()))
}
