// src/graph/builder.rs

//! The graph compiler: walks the parsed manifest, groups jobs into
//! per-(domain, frequency) containers, and materializes every component in
//! producer-first order.
//!
//! Compilation is single-threaded and single-shot: it either returns a
//! complete [`DagSet`] or fails with the offending job in the message. No
//! partial graph is usable.

use std::collections::BTreeMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, info};

use crate::config::model::Config;
use crate::config::validate::validate_routing;
use crate::errors::{DagforgeError, Result};
use crate::graph::component::{BuiltComponent, Component, ComponentBuild, ComponentKind, ModelOp};
use crate::graph::dag::{Dag, DagSet, GateRule, NodeRef, TaskKind, TaskNode};
use crate::graph::domain::{DagFlavor, DomainDagRegistry};
use crate::graph::hooks::CatalogHook;
use crate::manifest::job::DependencySpec;
use crate::manifest::{JobKind, JobRecord, MaintenanceKind, Manifest, Profiles};
use crate::schedule::WaitIndex;

const BACKFILL_BRANCH_TASK: &str = "branch";
const BACKFILL_START_TASK: &str = "start_work";
const BACKFILL_NOOP_TASK: &str = "do_nothing";

pub struct GraphCompiler<'a> {
    config: &'a Config,
    manifest: &'a Manifest,
    hook: Option<&'a dyn CatalogHook>,
    dagset: DagSet,
    domains: DomainDagRegistry,
    wait_index: WaitIndex,
}

impl<'a> GraphCompiler<'a> {
    pub fn new(
        config: &'a Config,
        manifest: &'a Manifest,
        hook: Option<&'a dyn CatalogHook>,
    ) -> Self {
        GraphCompiler {
            config,
            manifest,
            hook,
            dagset: DagSet::default(),
            domains: DomainDagRegistry::new(),
            wait_index: WaitIndex::new(),
        }
    }

    /// Compile the whole manifest: the scheduled containers, the
    /// per-domain maintenance containers, and the self-contained backfill
    /// containers.
    pub fn compile(mut self, profiles: &Profiles) -> Result<DagSet> {
        validate_routing(self.manifest, profiles, self.config)?;

        let mut scheduled = self.collect_components(false)?;
        self.create_missing_dags()?;
        self.build_components(&mut scheduled)?;
        info!(components = scheduled.len(), "scheduled containers built");

        self.build_maintenance()?;

        let mut backfill = self.collect_components(true)?;
        self.create_missing_dags()?;
        self.build_components(&mut backfill)?;
        self.wire_backfill_roots(&backfill)?;
        info!(components = backfill.len(), "backfill containers built");

        Ok(self.dagset)
    }

    /// Group jobs into components for one pass. The backfill pass mirrors
    /// the scheduled one with overlap disabled, parallelism forced to one,
    /// external dependencies suppressed, and large tests left out.
    fn collect_components(&mut self, backfill: bool) -> Result<BTreeMap<String, Component>> {
        let mut components: BTreeMap<String, Component> = BTreeMap::new();
        let mut medium: BTreeMap<String, Component> = BTreeMap::new();

        for (id, job) in &self.manifest.jobs {
            let op = match job.kind {
                JobKind::Transform => Some(ModelOp::Transform),
                JobKind::Seed => Some(ModelOp::Seed),
                JobKind::Snapshot => Some(ModelOp::Snapshot),
                JobKind::Test(_) => None,
            };

            if let Some(op) = op {
                let domain_dag = self.domains.get_or_create(job, backfill);
                let target = if backfill {
                    job.target
                        .clone()
                        .unwrap_or_else(|| self.config.targets.backfill.clone())
                } else {
                    job.target_environment(&self.config.targets)
                };
                components.insert(
                    id.clone(),
                    Component {
                        id: id.clone(),
                        name: job.name.clone(),
                        kind: ComponentKind::Model(op),
                        dag_name: domain_dag.dag_name(),
                        schedule: domain_dag.schedule,
                        target,
                        parallelism: if backfill { 1 } else { job.parallelism },
                        overlap: !backfill,
                        window: job.window,
                        external_deps: !backfill,
                        suffix: if backfill { "__bf" } else { "" },
                        deps: Default::default(),
                        dep_specs: Default::default(),
                        source_deps: Default::default(),
                        small_tests: Default::default(),
                        built: None,
                    },
                );
            } else if job.is_large_test() && !backfill {
                let domain_dag = self.domains.get_or_create(job, false);
                components.insert(
                    id.clone(),
                    Component {
                        id: id.clone(),
                        name: job.name.clone(),
                        kind: ComponentKind::LargeTest,
                        dag_name: domain_dag.dag_name(),
                        schedule: domain_dag.schedule,
                        target: job.target_environment(&self.config.targets),
                        parallelism: 1,
                        overlap: true,
                        window: job.window,
                        external_deps: true,
                        suffix: "",
                        deps: Default::default(),
                        dep_specs: Default::default(),
                        source_deps: Default::default(),
                        small_tests: Default::default(),
                        built: None,
                    },
                );
            }
        }

        self.resolve_dependencies(&mut components, &mut medium, backfill)?;
        self.bind_medium_tests(&mut components, medium);

        Ok(components)
    }

    fn resolve_dependencies(
        &mut self,
        components: &mut BTreeMap<String, Component>,
        medium: &mut BTreeMap<String, Component>,
        backfill: bool,
    ) -> Result<()> {
        for (id, job) in &self.manifest.jobs {
            if job.is_transform() || job.is_snapshot() {
                for upstream in &job.depends_on {
                    if !components.contains_key(upstream) {
                        return Err(DagforgeError::Graph(format!(
                            "job '{id}' depends on '{upstream}', which is not among the parsed jobs"
                        )));
                    }
                    let spec = job.dependency_spec(upstream);
                    if let Some(component) = components.get_mut(id) {
                        component.add_dependency(upstream, spec);
                    }
                }
                for source in &job.depends_on_sources {
                    if !self.manifest.sources.contains_key(source) {
                        return Err(DagforgeError::Graph(format!(
                            "job '{id}' depends on source '{source}', which is not among the \
                             parsed sources"
                        )));
                    }
                    if let Some(component) = components.get_mut(id) {
                        component.source_deps.insert(source.clone());
                    }
                }
            } else if job.is_small_test() {
                for upstream in &job.depends_on {
                    let parent = components.get_mut(upstream).ok_or_else(|| {
                        DagforgeError::Graph(format!(
                            "small test '{id}' references '{upstream}', which is not among the \
                             parsed jobs"
                        ))
                    })?;
                    parent.small_tests.insert(job.name.clone());
                }
            } else if job.is_medium_test() {
                let parent_id = self.find_parent_for_medium_test(job, components)?;
                let (parent_dag, parent_schedule, test_name) = {
                    let parent = &components[&parent_id];
                    (
                        parent.dag_name.clone(),
                        parent.schedule,
                        format!("{}__{}", parent.safe_name(), job.name),
                    )
                };
                let aggregate = medium.entry(parent_dag.clone()).or_insert_with(|| Component {
                    id: format!("medium_tests__{parent_dag}"),
                    name: format!("medium_tests__{parent_dag}"),
                    kind: ComponentKind::MediumTests { tests: Default::default() },
                    dag_name: parent_dag,
                    schedule: parent_schedule,
                    target: self.config.targets.tests.clone(),
                    parallelism: 1,
                    overlap: true,
                    window: Default::default(),
                    external_deps: false,
                    suffix: "",
                    deps: Default::default(),
                    dep_specs: Default::default(),
                    source_deps: Default::default(),
                    small_tests: Default::default(),
                    built: None,
                });
                if let ComponentKind::MediumTests { tests } = &mut aggregate.kind {
                    tests.insert(test_name);
                }
            } else if job.is_large_test() && !backfill {
                for upstream in &job.depends_on {
                    if !components.contains_key(upstream) {
                        return Err(DagforgeError::Graph(format!(
                            "large test '{id}' depends on '{upstream}', which is not among the \
                             parsed jobs"
                        )));
                    }
                    let spec = job.dependency_spec(upstream);
                    if let Some(component) = components.get_mut(id) {
                        component.add_dependency(upstream, spec);
                    }
                }
            }
        }
        Ok(())
    }

    /// A medium test's parent is the transform sharing its file path.
    fn find_parent_for_medium_test(
        &self,
        job: &JobRecord,
        components: &BTreeMap<String, Component>,
    ) -> Result<String> {
        let test_path = job.path_without_extension();
        for upstream in &job.depends_on {
            let Some(parent_job) = self.manifest.jobs.get(upstream) else {
                continue;
            };
            if components.contains_key(upstream)
                && parent_job.path_without_extension() == test_path
            {
                return Ok(upstream.clone());
            }
        }
        Err(DagforgeError::Graph(format!(
            "could not find a parent transform for medium test '{}'",
            job.id
        )))
    }

    /// Medium tests run after every model component in their container.
    fn bind_medium_tests(
        &mut self,
        components: &mut BTreeMap<String, Component>,
        medium: BTreeMap<String, Component>,
    ) {
        let mut medium = medium;
        for (id, component) in components.iter() {
            if !matches!(component.kind, ComponentKind::Model(_)) {
                continue;
            }
            if let Some(aggregate) = medium.get_mut(&component.dag_name) {
                aggregate.add_dependency(id, DependencySpec::default());
            }
        }
        for (_, aggregate) in medium {
            components.insert(aggregate.id.clone(), aggregate);
        }
    }

    /// Create the orchestrator DAG object for every container registered so
    /// far; containers that already exist keep their nodes.
    fn create_missing_dags(&mut self) -> Result<()> {
        let mut created = Vec::new();
        for domain_dag in self.domains.iter() {
            let name = domain_dag.dag_name();
            if self.dagset.get(&name).is_some() {
                continue;
            }
            let dag = Dag::new(
                name.clone(),
                domain_dag.domain.clone(),
                domain_dag.tags(),
                domain_dag.schedule_expression(),
                domain_dag.catchup(),
                if domain_dag.flavor == DagFlavor::Backfill {
                    1
                } else {
                    self.config.compile.max_active_runs
                },
            );
            created.push((dag, domain_dag.flavor));
        }
        for (mut dag, flavor) in created {
            if flavor == DagFlavor::Backfill {
                wrap_backfill_dag(&mut dag)?;
            }
            debug!(dag = %dag.name, "container created");
            self.dagset.insert(dag);
        }
        Ok(())
    }

    /// Producer-first build order; a cycle is fatal and names an involved
    /// job.
    fn build_order(components: &BTreeMap<String, Component>) -> Result<Vec<String>> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for id in components.keys() {
            graph.add_node(id.as_str());
        }
        for (id, component) in components {
            for dep in &component.deps {
                if components.contains_key(dep) {
                    graph.add_edge(dep.as_str(), id.as_str(), ());
                }
            }
        }
        match toposort(&graph, None) {
            Ok(order) => Ok(order.into_iter().map(String::from).collect()),
            Err(cycle) => Err(DagforgeError::Graph(format!(
                "dependency cycle involving job '{}'",
                cycle.node_id()
            ))),
        }
    }

    fn build_components(&mut self, components: &mut BTreeMap<String, Component>) -> Result<()> {
        for id in Self::build_order(components)? {
            let Some(component) = components.get(&id).cloned() else {
                continue;
            };
            let built = self.build_component(&component, components)?;
            if let Some(slot) = components.get_mut(&id) {
                slot.built = Some(built);
            }
        }
        Ok(())
    }

    fn build_component(
        &mut self,
        component: &Component,
        components: &BTreeMap<String, Component>,
    ) -> Result<BuiltComponent> {
        let dag = self.dagset.get_mut(&component.dag_name)?;
        let domain = self.domains.by_name(&component.dag_name).ok_or_else(|| {
            DagforgeError::Graph(format!(
                "container '{}' is not registered",
                component.dag_name
            ))
        })?;
        let mut build = ComponentBuild {
            dag,
            domain,
            components,
            sources: &self.manifest.sources,
            wait_index: &mut self.wait_index,
            config: self.config,
            hook: self.hook,
        };
        build.build(component)
    }

    /// Maintenance containers: one per domain with any opted-in model, one
    /// task group per maintenance kind, one task per model.
    fn build_maintenance(&mut self) -> Result<()> {
        let mut by_dag: BTreeMap<String, BTreeMap<MaintenanceKind, Vec<&JobRecord>>> =
            BTreeMap::new();
        for job in self.manifest.jobs.values() {
            if !matches!(job.kind, JobKind::Transform | JobKind::Seed | JobKind::Snapshot) {
                continue;
            }
            let kinds = job.maintenance.required_kinds();
            if kinds.is_empty() {
                continue;
            }
            let name = self.domains.maintenance_for(&job.domain).dag_name();
            let per_kind = by_dag.entry(name).or_default();
            for kind in kinds {
                per_kind.entry(kind).or_default().push(job);
            }
        }
        if by_dag.is_empty() {
            return Ok(());
        }

        self.create_missing_dags()?;

        for (dag_name, per_kind) in by_dag {
            let dag = self.dagset.get_mut(&dag_name)?;
            for (kind, jobs) in per_kind {
                let group = dag.add_group(format!("{}__{dag_name}", kind.as_str()));
                for job in jobs {
                    dag.add_task(TaskNode {
                        id: format!("{}__{}", kind.as_str(), job.name),
                        group: Some(group.clone()),
                        retries: self.config.retries.maintenance,
                        kind: TaskKind::Maintenance {
                            job: job.name.clone(),
                            operation: kind,
                            target: self.config.targets.maintenance.clone(),
                        },
                    })?;
                }
            }
        }
        Ok(())
    }

    /// Hang every root component of a backfill container off its
    /// `start_work` endpoint, so nothing runs until a manual re-trigger.
    fn wire_backfill_roots(&mut self, components: &BTreeMap<String, Component>) -> Result<()> {
        for component in components.values() {
            let Some(built) = &component.built else {
                continue;
            };
            let dag = self.dagset.get_mut(&component.dag_name)?;
            if dag.is_root(&built.component_ref) {
                dag.connect(
                    NodeRef::Task(BACKFILL_START_TASK.to_string()),
                    built.component_ref.clone(),
                )?;
            }
        }
        Ok(())
    }
}

/// Every backfill DAG starts with a gate: the scheduled run takes the
/// `do_nothing` path, and only a manual re-trigger reaches `start_work`.
fn wrap_backfill_dag(dag: &mut Dag) -> Result<()> {
    let branch = dag.add_task(TaskNode {
        id: BACKFILL_BRANCH_TASK.to_string(),
        group: None,
        retries: 0,
        kind: TaskKind::Gate(GateRule::RerunOnly),
    })?;
    let start = dag.add_task(TaskNode {
        id: BACKFILL_START_TASK.to_string(),
        group: None,
        retries: 0,
        kind: TaskKind::Join,
    })?;
    let noop = dag.add_task(TaskNode {
        id: BACKFILL_NOOP_TASK.to_string(),
        group: None,
        retries: 0,
        kind: TaskKind::Join,
    })?;
    dag.connect(NodeRef::Task(branch.clone()), NodeRef::Task(start))?;
    dag.connect(NodeRef::Task(branch), NodeRef::Task(noop))?;
    Ok(())
}

/// Compile a parsed manifest into the full DAG set.
pub fn compile_graph(
    config: &Config,
    manifest: &Manifest,
    profiles: &Profiles,
    hook: Option<&dyn CatalogHook>,
) -> Result<DagSet> {
    GraphCompiler::new(config, manifest, hook).compile(profiles)
}
