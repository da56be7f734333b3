// src/config/model.rs

use serde::Deserialize;

/// Top-level compiler configuration as read from a TOML file.
///
/// ```toml
/// [dependencies]
/// per_domain = true
/// per_task = false
///
/// [targets]
/// default = "prod"
///
/// [retries]
/// wait = 30
///
/// [compile]
/// max_active_runs = 50
/// ```
///
/// All sections except `[targets]` are optional and have defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub dependencies: DependenciesSection,

    pub targets: TargetsSection,

    #[serde(default)]
    pub retries: RetriesConfig,

    #[serde(default)]
    pub compile: CompileSection,

    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// `[dependencies]` section: how wait nodes are grouped.
///
/// Exactly one of the two flags must be set; both off or both on is a
/// configuration error surfaced at validation time.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DependenciesSection {
    #[serde(default = "default_true")]
    pub per_domain: bool,
    #[serde(default)]
    pub per_task: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DependenciesSection {
    fn default() -> Self {
        Self { per_domain: true, per_task: false }
    }
}

/// How wait nodes for one upstream container are grouped in a downstream
/// container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitGrouping {
    /// One shared wait group per upstream container, reused by every
    /// consumer in the downstream container.
    PerDomain,
    /// One dedicated set of waits per consuming job, embedded alongside it.
    PerTask,
}

/// `[targets]` section: named execution targets per job class.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetsSection {
    pub default: String,
    #[serde(default)]
    pub tests: Option<String>,
    #[serde(default)]
    pub backfill: Option<String>,
    #[serde(default)]
    pub maintenance: Option<String>,
}

/// Resolved targets: the optional per-class entries fall back to the
/// default.
#[derive(Debug, Clone)]
pub struct TargetsConfig {
    pub default: String,
    pub tests: String,
    pub backfill: String,
    pub maintenance: String,
}

impl From<TargetsSection> for TargetsConfig {
    fn from(raw: TargetsSection) -> Self {
        let default = raw.default;
        TargetsConfig {
            tests: raw.tests.unwrap_or_else(|| default.clone()),
            backfill: raw.backfill.unwrap_or_else(|| default.clone()),
            maintenance: raw.maintenance.unwrap_or_else(|| default.clone()),
            default,
        }
    }
}

/// `[retries]` section: per-node-kind retry counts handed to the
/// orchestrator. Waits poll an external DAG, hence the high default.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetriesConfig {
    #[serde(default = "default_one")]
    pub run: u32,
    #[serde(default = "default_one")]
    pub test: u32,
    #[serde(default = "default_one")]
    pub seed: u32,
    #[serde(default = "default_one")]
    pub snapshot: u32,
    #[serde(default = "default_one")]
    pub maintenance: u32,
    #[serde(default = "default_wait_retries")]
    pub wait: u32,
}

fn default_one() -> u32 {
    1
}

fn default_wait_retries() -> u32 {
    30
}

impl Default for RetriesConfig {
    fn default() -> Self {
        Self {
            run: 1,
            test: 1,
            seed: 1,
            snapshot: 1,
            maintenance: 1,
            wait: default_wait_retries(),
        }
    }
}

/// `[compile]` section.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CompileSection {
    #[serde(default = "default_max_active_runs")]
    pub max_active_runs: u32,
    /// Suppresses execution side-effects on generated nodes, not graph
    /// shape.
    #[serde(default)]
    pub dry_run: bool,
}

fn default_max_active_runs() -> u32 {
    50
}

impl Default for CompileSection {
    fn default() -> Self {
        Self { max_active_runs: default_max_active_runs(), dry_run: false }
    }
}

/// `[catalog]` section: the optional data-catalog hook.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub enabled: bool,
    /// When set, a hook failure fails that node's construction instead of
    /// being logged and swallowed.
    #[serde(default)]
    pub success_required: bool,
}

/// Validated compiler configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub wait_grouping: WaitGrouping,
    pub targets: TargetsConfig,
    pub retries: RetriesConfig,
    pub compile: CompileSection,
    pub catalog: CatalogConfig,
}

impl Config {
    /// A minimal config for callers that assemble everything in code.
    pub fn with_default_target(target: impl Into<String>) -> Self {
        Config {
            wait_grouping: WaitGrouping::PerDomain,
            targets: TargetsConfig::from(TargetsSection {
                default: target.into(),
                tests: None,
                backfill: None,
                maintenance: None,
            }),
            retries: RetriesConfig::default(),
            compile: CompileSection::default(),
            catalog: CatalogConfig::default(),
        }
    }
}
