// src/graph/domain.rs

//! Per-(domain, frequency) DAG containers and their lookup registry.

use std::collections::{BTreeMap, HashMap};

use crate::graph::dag::TaskId;
use crate::manifest::JobRecord;
use crate::schedule::{Frequency, Schedule};

pub const FRONTIER_TAG: &str = "frontier";
pub const BACKFILL_TAG: &str = "backfill";
pub const MAINTENANCE_TAG: &str = "maintenance";
pub const LARGE_TESTS_TAG: &str = "large_tests";

/// Which family of containers this DAG belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DagFlavor {
    Scheduled,
    Backfill,
    Maintenance,
    LargeTests,
}

/// Wait nodes already materialized in a downstream container for one
/// upstream container, so several consumers share them.
#[derive(Debug, Default)]
pub struct WaitGroupRegistry {
    pub group_id: Option<TaskId>,
    waits: HashMap<String, Vec<TaskId>>,
}

impl WaitGroupRegistry {
    pub fn is_registered(&self, component_id: &str) -> bool {
        self.waits.contains_key(component_id)
    }

    pub fn add(&mut self, component_id: String, wait_tasks: Vec<TaskId>) {
        self.waits.insert(component_id, wait_tasks);
    }

    pub fn waits_for(&self, component_id: &str) -> &[TaskId] {
        self.waits
            .get(component_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

/// Metadata for one orchestration container.
///
/// Backfill, maintenance, and large-tests containers always run daily,
/// regardless of the member jobs' schedules.
#[derive(Debug)]
pub struct DomainDag {
    pub domain: String,
    pub flavor: DagFlavor,
    pub schedule: Schedule,
    /// Upstream DAG name -> wait nodes already built here for it.
    pub wait_groups: HashMap<String, WaitGroupRegistry>,
}

impl DomainDag {
    pub fn new(domain: impl Into<String>, flavor: DagFlavor, schedule: Schedule) -> Self {
        let schedule = match flavor {
            DagFlavor::Scheduled => schedule,
            _ => Schedule::unshifted(Frequency::Daily),
        };
        DomainDag {
            domain: domain.into(),
            flavor,
            schedule,
            wait_groups: HashMap::new(),
        }
    }

    /// Deterministic container name, `@` mapped to `__`.
    pub fn dag_name(&self) -> String {
        match self.flavor {
            DagFlavor::Scheduled => {
                format!("{}{}", self.domain, self.schedule.name()).replace('@', "__")
            }
            DagFlavor::Backfill => format!("{}__backfill", self.domain),
            DagFlavor::Maintenance => format!("{}__maintenance", self.domain),
            DagFlavor::LargeTests => {
                format!("{}__large_tests{}", self.domain, self.schedule.name()).replace('@', "__")
            }
        }
    }

    /// Container tags: the pure domain name, the schedule's safe name, the
    /// flavor tag, and `frontier` for regularly scheduled containers.
    pub fn tags(&self) -> Vec<String> {
        let pure_domain = self
            .domain
            .split("__")
            .next()
            .unwrap_or(&self.domain)
            .to_string();
        let mut tags = vec![pure_domain, self.schedule.safe_name()];
        match self.flavor {
            DagFlavor::Scheduled => {}
            DagFlavor::Backfill => tags.push(BACKFILL_TAG.to_string()),
            DagFlavor::Maintenance => tags.push(MAINTENANCE_TAG.to_string()),
            DagFlavor::LargeTests => tags.push(LARGE_TESTS_TAG.to_string()),
        }
        if !self.schedule.is_manual() && self.flavor != DagFlavor::Backfill {
            tags.push(FRONTIER_TAG.to_string());
        }
        tags
    }

    pub fn catchup(&self) -> bool {
        matches!(self.flavor, DagFlavor::Scheduled | DagFlavor::Backfill)
    }

    /// The cron string handed to the orchestrator; `None` for manual.
    pub fn schedule_expression(&self) -> Option<String> {
        self.schedule.expression().map(|e| e.to_string())
    }
}

/// Lookup-or-create registry of containers for one compilation pass.
#[derive(Debug, Default)]
pub struct DomainDagRegistry {
    dags: BTreeMap<String, DomainDag>,
}

impl DomainDagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The container a job belongs to, created lazily on first use.
    ///
    /// Idempotent on the container key: the same (domain, frequency,
    /// flavor) always yields the same instance.
    pub fn get_or_create(&mut self, job: &JobRecord, backfill: bool) -> &mut DomainDag {
        let flavor = if job.is_large_test() {
            DagFlavor::LargeTests
        } else if backfill {
            DagFlavor::Backfill
        } else {
            DagFlavor::Scheduled
        };
        let candidate = DomainDag::new(job.domain.clone(), flavor, job.schedule);
        let name = candidate.dag_name();
        self.dags.entry(name).or_insert(candidate)
    }

    pub fn maintenance_for(&mut self, domain: &str) -> &mut DomainDag {
        let candidate = DomainDag::new(
            domain,
            DagFlavor::Maintenance,
            Schedule::unshifted(Frequency::Daily),
        );
        let name = candidate.dag_name();
        self.dags.entry(name).or_insert(candidate)
    }

    pub fn by_name(&mut self, name: &str) -> Option<&mut DomainDag> {
        self.dags.get_mut(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DomainDag> {
        self.dags.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Shift;

    fn domain_dag(flavor: DagFlavor, schedule: Schedule) -> DomainDag {
        DomainDag::new("a", flavor, schedule)
    }

    #[test]
    fn scheduled_names_substitute_the_sigil() {
        let dag = domain_dag(DagFlavor::Scheduled, Schedule::unshifted(Frequency::Daily));
        assert_eq!(dag.dag_name(), "a__daily");

        let shifted = Schedule::new(Frequency::Hourly, Shift::new(0, 0, 30)).unwrap();
        let dag = domain_dag(DagFlavor::Scheduled, shifted);
        assert_eq!(dag.dag_name(), "a__hourly_shift_30_minutes");
    }

    #[test]
    fn special_flavors_force_daily_and_fixed_names() {
        let hourly = Schedule::unshifted(Frequency::Hourly);
        let backfill = domain_dag(DagFlavor::Backfill, hourly);
        assert_eq!(backfill.dag_name(), "a__backfill");
        assert_eq!(backfill.schedule, Schedule::unshifted(Frequency::Daily));

        let large = domain_dag(DagFlavor::LargeTests, hourly);
        assert_eq!(large.dag_name(), "a__large_tests__daily");

        let maintenance = domain_dag(DagFlavor::Maintenance, hourly);
        assert_eq!(maintenance.dag_name(), "a__maintenance");
    }

    #[test]
    fn tags_mark_frontier_or_flavor() {
        let scheduled = domain_dag(DagFlavor::Scheduled, Schedule::unshifted(Frequency::Daily));
        let tags = scheduled.tags();
        assert!(tags.contains(&"a".to_string()));
        assert!(tags.contains(&"sched_daily".to_string()));
        assert!(tags.contains(&FRONTIER_TAG.to_string()));

        let manual = domain_dag(DagFlavor::Scheduled, Schedule::unshifted(Frequency::Manual));
        assert!(!manual.tags().contains(&FRONTIER_TAG.to_string()));

        let backfill = domain_dag(DagFlavor::Backfill, Schedule::unshifted(Frequency::Daily));
        let tags = backfill.tags();
        assert!(tags.contains(&BACKFILL_TAG.to_string()));
        assert!(!tags.contains(&FRONTIER_TAG.to_string()));
    }

    #[test]
    fn registry_lookup_is_idempotent_per_container_key() {
        use crate::manifest::job::{JobRecord, RawJob};
        use std::collections::BTreeMap;

        let job = |name: &str, schedule: &str| {
            JobRecord::from_raw(
                format!("transform.a.{name}"),
                RawJob {
                    domain: "a".to_string(),
                    name: name.to_string(),
                    path: format!("models/a/{name}.sql"),
                    kind: "transform".to_string(),
                    test_size: None,
                    schedule: schedule.to_string(),
                    schedule_shift: None,
                    depends_on: vec![],
                    depends_on_sources: vec![],
                    dependencies: BTreeMap::new(),
                    enable_from: None,
                    disable_from: None,
                    target: None,
                    parallelism: 1,
                    maintenance: Default::default(),
                },
            )
            .unwrap()
        };

        let mut registry = DomainDagRegistry::new();
        let first = registry.get_or_create(&job("a1", "@daily"), false).dag_name();
        let second = registry.get_or_create(&job("a2", "@daily"), false).dag_name();
        assert_eq!(first, second);
        assert_eq!(registry.iter().count(), 1);

        registry.get_or_create(&job("a3", "@hourly"), false);
        registry.get_or_create(&job("a1", "@daily"), true);
        assert_eq!(registry.iter().count(), 3);
    }

    #[test]
    fn catchup_only_for_scheduled_and_backfill() {
        let daily = Schedule::unshifted(Frequency::Daily);
        assert!(domain_dag(DagFlavor::Scheduled, daily).catchup());
        assert!(domain_dag(DagFlavor::Backfill, daily).catchup());
        assert!(!domain_dag(DagFlavor::Maintenance, daily).catchup());
        assert!(!domain_dag(DagFlavor::LargeTests, daily).catchup());
    }
}
