// src/graph/component.rs

//! Graph components and their materialization into DAG nodes.
//!
//! A [`Component`] is one orchestration unit derived from the manifest: a
//! model (transform, seed, or snapshot), a large test, or the per-container
//! medium-test aggregate. Building a component creates its task nodes,
//! stages every edge in a [`DeferredEdgeRegistry`], and commits the batch
//! at the end of that component's construction.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::config::model::{Config, WaitGrouping};
use crate::errors::{DagforgeError, Result};
use crate::graph::dag::{Dag, GateRule, NodeRef, TaskId, TaskKind, TaskNode};
use crate::graph::deferred::DeferredEdgeRegistry;
use crate::graph::domain::DomainDag;
use crate::graph::hooks::CatalogHook;
use crate::manifest::job::DependencySpec;
use crate::manifest::{SourceRecord, Window};
use crate::schedule::{Schedule, WaitIndex, WaitPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelOp {
    Transform,
    Seed,
    Snapshot,
}

#[derive(Debug, Clone)]
pub enum ComponentKind {
    Model(ModelOp),
    LargeTest,
    /// One aggregate of medium tests per container; runs after every model
    /// component in that container.
    MediumTests { tests: BTreeSet<String> },
}

/// Node ids a built component exposes to its consumers.
#[derive(Debug, Clone)]
pub struct BuiltComponent {
    /// The component as an edge endpoint: its group if it has one, else
    /// its model task.
    pub component_ref: NodeRef,
    pub model_task: TaskId,
    /// What external waits poke: the small-test endpoint when present,
    /// otherwise the model task.
    pub completion_endpoint: TaskId,
}

#[derive(Debug, Clone)]
pub struct Component {
    pub id: String,
    /// Resource name, without any backfill suffix.
    pub name: String,
    pub kind: ComponentKind,
    pub dag_name: String,
    /// The owning container's schedule (not necessarily the job's own).
    pub schedule: Schedule,
    pub target: String,
    pub parallelism: u32,
    pub overlap: bool,
    pub window: Window,
    /// Backfill components never wait on other containers.
    pub external_deps: bool,
    /// `"__bf"` in backfill containers, empty otherwise.
    pub suffix: &'static str,
    pub deps: BTreeSet<String>,
    pub dep_specs: BTreeMap<String, DependencySpec>,
    pub source_deps: BTreeSet<String>,
    pub small_tests: BTreeSet<String>,
    pub built: Option<BuiltComponent>,
}

impl Component {
    pub fn safe_name(&self) -> String {
        format!("{}{}", self.name.replace('.', "__"), self.suffix)
    }

    /// Record a dependency edge. A `skip` spec drops the edge entirely:
    /// no direct edge, no wait node.
    pub fn add_dependency(&mut self, upstream_id: &str, spec: DependencySpec) {
        if spec.skip {
            debug!(job = %self.id, upstream = %upstream_id, "dependency marked skip; dropping edge");
            return;
        }
        self.dep_specs.insert(upstream_id.to_string(), spec);
        self.deps.insert(upstream_id.to_string());
    }

    fn wait_policy_for(&self, upstream_id: &str) -> WaitPolicy {
        self.dep_specs
            .get(upstream_id)
            .map(|s| s.wait_policy)
            .unwrap_or_default()
    }
}

/// Snapshot of one valid cross-container dependency, taken before any
/// mutation so the borrowed component map can be released.
struct ExtDep {
    id: String,
    dag_name: String,
    schedule: Schedule,
    safe_name: String,
    completion_endpoint: TaskId,
    policy: WaitPolicy,
}

/// Borrows everything one component's construction needs.
pub struct ComponentBuild<'a> {
    pub dag: &'a mut Dag,
    pub domain: &'a mut DomainDag,
    pub components: &'a BTreeMap<String, Component>,
    pub sources: &'a BTreeMap<String, SourceRecord>,
    pub wait_index: &'a mut WaitIndex,
    pub config: &'a Config,
    pub hook: Option<&'a dyn CatalogHook>,
}

impl ComponentBuild<'_> {
    pub fn build(&mut self, component: &Component) -> Result<BuiltComponent> {
        match &component.kind {
            ComponentKind::Model(op) => self.build_model(component, *op),
            ComponentKind::LargeTest => self.build_large_test(component),
            ComponentKind::MediumTests { tests } => self.build_medium_tests(component, tests),
        }
    }

    fn build_model(&mut self, component: &Component, op: ModelOp) -> Result<BuiltComponent> {
        let safe = component.safe_name();
        let mut edges = DeferredEdgeRegistry::new();

        let ext_deps = self.external_deps_of(component)?;
        let fresh_sources = self.freshness_sources_of(component)?;
        let group = self
            .needs_task_group(component, !ext_deps.is_empty(), !fresh_sources.is_empty())
            .then(|| self.dag.add_group(format!("{safe}__group")));

        let (retries, kind) = match op {
            ModelOp::Transform => (
                self.config.retries.run,
                TaskKind::Run {
                    job: component.name.clone(),
                    target: component.target.clone(),
                    parallelism: component.parallelism,
                    overlap: component.overlap,
                },
            ),
            ModelOp::Seed => (
                self.config.retries.seed,
                TaskKind::Seed {
                    job: component.name.clone(),
                    target: component.target.clone(),
                },
            ),
            ModelOp::Snapshot => (
                self.config.retries.snapshot,
                TaskKind::Snapshot {
                    job: component.name.clone(),
                    target: component.target.clone(),
                },
            ),
        };
        let model_task = self.dag.add_task(TaskNode {
            id: safe.clone(),
            group: group.clone(),
            retries,
            kind,
        })?;
        self.invoke_hook(&model_task)?;

        let completion_endpoint = self.build_small_tests(component, &group, &model_task, &mut edges)?;

        let component_ref = match &group {
            Some(g) => NodeRef::Group(g.clone()),
            None => NodeRef::Task(model_task.clone()),
        };

        let gate = self.build_gate(component, &group, &model_task, &mut edges)?;

        self.wire_direct_deps(component, &component_ref, &model_task, gate.as_ref(), &mut edges)?;
        self.wire_external_deps(
            component,
            &ext_deps,
            group.as_ref(),
            &model_task,
            gate.as_ref(),
            &mut edges,
        )?;
        self.wire_freshness_waits(&fresh_sources, &safe, &group, &model_task, &mut edges)?;

        edges.commit(self.dag)?;
        Ok(BuiltComponent {
            component_ref,
            model_task,
            completion_endpoint,
        })
    }

    fn build_large_test(&mut self, component: &Component) -> Result<BuiltComponent> {
        let safe = component.safe_name();
        let mut edges = DeferredEdgeRegistry::new();

        let ext_deps = self.external_deps_of(component)?;
        let group = self
            .needs_task_group(component, !ext_deps.is_empty(), false)
            .then(|| self.dag.add_group(format!("{safe}__group")));

        let model_task = self.dag.add_task(TaskNode {
            id: safe.clone(),
            group: group.clone(),
            retries: self.config.retries.test,
            kind: TaskKind::Test {
                job: component.name.clone(),
                target: component.target.clone(),
            },
        })?;

        let component_ref = match &group {
            Some(g) => NodeRef::Group(g.clone()),
            None => NodeRef::Task(model_task.clone()),
        };

        let gate = self.build_gate(component, &group, &model_task, &mut edges)?;

        self.wire_direct_deps(component, &component_ref, &model_task, gate.as_ref(), &mut edges)?;
        self.wire_external_deps(
            component,
            &ext_deps,
            group.as_ref(),
            &model_task,
            gate.as_ref(),
            &mut edges,
        )?;

        edges.commit(self.dag)?;
        Ok(BuiltComponent {
            component_ref,
            model_task: model_task.clone(),
            completion_endpoint: model_task,
        })
    }

    fn build_medium_tests(
        &mut self,
        component: &Component,
        tests: &BTreeSet<String>,
    ) -> Result<BuiltComponent> {
        let group = self.dag.add_group(component.safe_name());
        for test in tests {
            self.dag.add_task(TaskNode {
                id: test.replace('.', "__"),
                group: Some(group.clone()),
                retries: self.config.retries.test,
                kind: TaskKind::Test {
                    job: test.clone(),
                    target: component.target.clone(),
                },
            })?;
        }

        let mut edges = DeferredEdgeRegistry::new();
        for dep_id in &component.deps {
            let built = self.built_dependency(component, dep_id)?;
            edges.register(built.component_ref.clone(), NodeRef::Group(group.clone()));
        }
        edges.commit(self.dag)?;

        Ok(BuiltComponent {
            component_ref: NodeRef::Group(group.clone()),
            model_task: group.clone(),
            completion_endpoint: group,
        })
    }

    /// A task group wraps the component when anything beyond the bare model
    /// node lives alongside it.
    fn needs_task_group(&self, component: &Component, has_ext_deps: bool, has_fresh: bool) -> bool {
        !component.small_tests.is_empty()
            || (has_ext_deps && self.config.wait_grouping == WaitGrouping::PerTask)
            || has_fresh
            || !component.window.is_empty()
    }

    fn build_small_tests(
        &mut self,
        component: &Component,
        group: &Option<TaskId>,
        model_task: &TaskId,
        edges: &mut DeferredEdgeRegistry,
    ) -> Result<TaskId> {
        if component.small_tests.is_empty() {
            return Ok(model_task.clone());
        }

        let endpoint = self.dag.add_task(TaskNode {
            id: format!("{}__end", component.safe_name()),
            group: group.clone(),
            retries: 0,
            kind: TaskKind::Join,
        })?;
        for test in &component.small_tests {
            let test_task = self.dag.add_task(TaskNode {
                id: test.replace('.', "__"),
                group: group.clone(),
                retries: self.config.retries.test,
                kind: TaskKind::Test {
                    job: test.clone(),
                    target: self.config.targets.tests.clone(),
                },
            })?;
            edges.register(NodeRef::Task(model_task.clone()), NodeRef::Task(test_task.clone()));
            edges.register(NodeRef::Task(test_task), NodeRef::Task(endpoint.clone()));
        }
        Ok(endpoint)
    }

    /// The enable/disable decision node. Producers feed it, and its
    /// inactive path transparently skips the model and everything below.
    fn build_gate(
        &mut self,
        component: &Component,
        group: &Option<TaskId>,
        model_task: &TaskId,
        edges: &mut DeferredEdgeRegistry,
    ) -> Result<Option<TaskId>> {
        if component.window.is_empty() {
            return Ok(None);
        }
        let gate = self.dag.add_task(TaskNode {
            id: format!("{}_branch", component.safe_name()),
            group: group.clone(),
            retries: 0,
            kind: TaskKind::Gate(GateRule::Window {
                enable_from: component.window.enable_from,
                disable_from: component.window.disable_from,
            }),
        })?;
        edges.register(NodeRef::Task(gate.clone()), NodeRef::Task(model_task.clone()));
        Ok(Some(gate))
    }

    fn wire_direct_deps(
        &mut self,
        component: &Component,
        component_ref: &NodeRef,
        model_task: &TaskId,
        gate: Option<&TaskId>,
        edges: &mut DeferredEdgeRegistry,
    ) -> Result<()> {
        for dep_id in &component.deps {
            let dep = self.dependency(component, dep_id)?;
            if dep.dag_name != component.dag_name {
                continue;
            }
            let built = self.built_dependency(component, dep_id)?;
            edges.register(NodeRef::Task(built.model_task.clone()), NodeRef::Task(model_task.clone()));
            edges.register(built.component_ref.clone(), component_ref.clone());
            if let Some(gate) = gate {
                edges.register(NodeRef::Task(built.model_task.clone()), NodeRef::Task(gate.clone()));
            }
        }
        Ok(())
    }

    fn wire_external_deps(
        &mut self,
        component: &Component,
        ext_deps: &[ExtDep],
        group: Option<&TaskId>,
        model_task: &TaskId,
        gate: Option<&TaskId>,
        edges: &mut DeferredEdgeRegistry,
    ) -> Result<()> {
        if ext_deps.is_empty() {
            return Ok(());
        }
        match self.config.wait_grouping {
            WaitGrouping::PerDomain => self.wire_per_domain(component, ext_deps, model_task, edges),
            WaitGrouping::PerTask => {
                self.wire_per_task(component, ext_deps, group, model_task, gate, edges)
            }
        }
    }

    /// Shared wait groups: one `{upstream_dag}__dependencies__group` per
    /// upstream container, with wait nodes deduplicated through the
    /// container's registry so every consumer reuses them.
    fn wire_per_domain(
        &mut self,
        component: &Component,
        ext_deps: &[ExtDep],
        model_task: &TaskId,
        edges: &mut DeferredEdgeRegistry,
    ) -> Result<()> {
        for dep in ext_deps {
            let registry = self.domain.wait_groups.entry(dep.dag_name.clone()).or_default();
            if registry.group_id.is_none() {
                registry.group_id = Some(format!("{}__dependencies__group", dep.dag_name));
            }
            let group_id = registry.group_id.clone().unwrap_or_default();
            self.dag.add_group(group_id.clone());

            let registered = self
                .domain
                .wait_groups
                .get(&dep.dag_name)
                .map(|r| r.is_registered(&dep.id))
                .unwrap_or(false);
            if !registered {
                let waits = self.create_wait_tasks(component, dep, &group_id, false)?;
                if let Some(registry) = self.domain.wait_groups.get_mut(&dep.dag_name) {
                    registry.add(dep.id.clone(), waits);
                }
            }

            let waits: Vec<TaskId> = self
                .domain
                .wait_groups
                .get(&dep.dag_name)
                .map(|r| r.waits_for(&dep.id).to_vec())
                .unwrap_or_default();
            for wait in waits {
                edges.register(NodeRef::Task(wait), NodeRef::Task(model_task.clone()));
            }
        }
        Ok(())
    }

    /// Dedicated waits embedded next to the consumer, gated by the
    /// component's own decision node when it has one.
    fn wire_per_task(
        &mut self,
        component: &Component,
        ext_deps: &[ExtDep],
        group: Option<&TaskId>,
        model_task: &TaskId,
        gate: Option<&TaskId>,
        edges: &mut DeferredEdgeRegistry,
    ) -> Result<()> {
        let group = group.ok_or_else(|| {
            DagforgeError::Graph(format!(
                "component '{}' needs a task group for per-task waits",
                component.id
            ))
        })?;
        for dep in ext_deps {
            let waits = self.create_wait_tasks(component, dep, group, true)?;
            for wait in waits {
                if let Some(gate) = gate {
                    edges.register(NodeRef::Task(gate.clone()), NodeRef::Task(wait.clone()));
                }
                edges.register(NodeRef::Task(wait), NodeRef::Task(model_task.clone()));
            }
        }
        Ok(())
    }

    /// One wait node per instant the calculator requires for this edge.
    ///
    /// Per-task waits are duplicated for every consumer, so their ids carry
    /// the consumer's name; shared per-domain waits exist once per upstream
    /// and keep the plain `wait__{upstream}` form.
    fn create_wait_tasks(
        &mut self,
        component: &Component,
        dep: &ExtDep,
        group: &TaskId,
        per_consumer: bool,
    ) -> Result<Vec<TaskId>> {
        let fns = self
            .wait_index
            .wait_fns(component.schedule, dep.schedule, dep.policy)?;
        let multi = fns.len() > 1;

        let base = if per_consumer {
            format!("wait__{}__for__{}", dep.safe_name, component.safe_name())
        } else {
            format!("wait__{}", dep.safe_name)
        };
        let mut ids = Vec::with_capacity(fns.len());
        for (i, wait) in fns.into_iter().enumerate() {
            let suffix = if multi { format!("__{i}") } else { String::new() };
            let id = self.dag.add_task(TaskNode {
                id: format!("{base}{suffix}"),
                group: Some(group.clone()),
                retries: self.config.retries.wait,
                kind: TaskKind::ExternalWait {
                    upstream_dag: dep.dag_name.clone(),
                    upstream_task: dep.completion_endpoint.clone(),
                    wait,
                },
            })?;
            ids.push(id);
        }
        Ok(ids)
    }

    fn wire_freshness_waits(
        &mut self,
        fresh_sources: &[SourceRecord],
        safe: &str,
        group: &Option<TaskId>,
        model_task: &TaskId,
        edges: &mut DeferredEdgeRegistry,
    ) -> Result<()> {
        for source in fresh_sources {
            let wait = self.dag.add_task(TaskNode {
                id: format!("wait_freshness__{}__for__{safe}", source.name()),
                group: group.clone(),
                retries: self.config.retries.wait,
                kind: TaskKind::FreshnessWait {
                    source: source.source_name.clone(),
                    identifier: source.identifier.clone(),
                    target: self.config.targets.tests.clone(),
                },
            })?;
            edges.register(NodeRef::Task(wait), NodeRef::Task(model_task.clone()));
        }
        Ok(())
    }

    /// Valid cross-container dependencies, snapshotted. Manual schedules on
    /// either side exclude the edge, as does a component with external
    /// dependencies disabled.
    fn external_deps_of(&self, component: &Component) -> Result<Vec<ExtDep>> {
        if !component.external_deps || component.schedule.is_manual() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for dep_id in &component.deps {
            let dep = self.dependency(component, dep_id)?;
            if dep.dag_name == component.dag_name || dep.schedule.is_manual() {
                continue;
            }
            let built = self.built_dependency(component, dep_id)?;
            out.push(ExtDep {
                id: dep.id.clone(),
                dag_name: dep.dag_name.clone(),
                schedule: dep.schedule,
                safe_name: dep.safe_name(),
                completion_endpoint: built.completion_endpoint.clone(),
                policy: component.wait_policy_for(dep_id),
            });
        }
        Ok(out)
    }

    fn freshness_sources_of(&self, component: &Component) -> Result<Vec<SourceRecord>> {
        let mut out = Vec::new();
        for source_id in &component.source_deps {
            let source = self.sources.get(source_id).ok_or_else(|| {
                DagforgeError::Graph(format!(
                    "job '{}' depends on source '{source_id}', which is not in the manifest",
                    component.id
                ))
            })?;
            if source.needs_freshness_check() {
                out.push(source.clone());
            }
        }
        Ok(out)
    }

    fn dependency(&self, component: &Component, dep_id: &str) -> Result<&Component> {
        self.components.get(dep_id).ok_or_else(|| {
            DagforgeError::Graph(format!(
                "job '{}' depends on '{dep_id}', which is not in the compiled graph",
                component.id
            ))
        })
    }

    fn built_dependency(&self, component: &Component, dep_id: &str) -> Result<&BuiltComponent> {
        self.dependency(component, dep_id)?
            .built
            .as_ref()
            .ok_or_else(|| {
                DagforgeError::Graph(format!(
                    "dependency '{dep_id}' of '{}' has not been materialized yet",
                    component.id
                ))
            })
    }

    fn invoke_hook(&self, task_id: &TaskId) -> Result<()> {
        if !self.config.catalog.enabled {
            return Ok(());
        }
        let Some(hook) = self.hook else {
            return Ok(());
        };
        let Some(task) = self.dag.task(task_id) else {
            return Ok(());
        };
        if let Err(e) = hook.on_node_built(&self.dag.name, task) {
            if self.config.catalog.success_required {
                return Err(DagforgeError::Catalog(format!(
                    "catalog export failed for '{task_id}' in '{}': {e}",
                    self.dag.name
                )));
            }
            warn!(task = %task_id, dag = %self.dag.name, error = %e, "catalog hook failed; continuing");
        }
        Ok(())
    }
}
