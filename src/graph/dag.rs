// src/graph/dag.rs

//! The orchestrator-facing graph model.
//!
//! A [`Dag`] is the unit handed to the external orchestrator: tasks, task
//! groups, and the committed edge list. The compiler mutates it only
//! through [`Dag::connect`], which is what the deferred-edge registry
//! flushes into.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::{DagforgeError, Result};
use crate::manifest::MaintenanceKind;
use crate::schedule::WaitFn;

pub type TaskId = String;

/// An edge endpoint: a plain task or a composite group node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "node", content = "id", rename_all = "snake_case")]
pub enum NodeRef {
    Task(TaskId),
    Group(TaskId),
}

impl NodeRef {
    pub fn is_group(&self) -> bool {
        matches!(self, NodeRef::Group(_))
    }

    pub fn id(&self) -> &str {
        match self {
            NodeRef::Task(id) | NodeRef::Group(id) => id,
        }
    }
}

/// Run-time gating rule carried by a gate node.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum GateRule {
    /// Run downstream only when the invocation's data interval overlaps the
    /// configured window; otherwise downstream is skipped transparently.
    Window {
        enable_from: Option<DateTime<Utc>>,
        disable_from: Option<DateTime<Utc>>,
    },
    /// Skip on the first scheduled run; only a manual re-trigger proceeds.
    RerunOnly,
}

/// What a task node does when the orchestrator runs it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    Run {
        job: String,
        target: String,
        parallelism: u32,
        overlap: bool,
    },
    Test {
        job: String,
        target: String,
    },
    Seed {
        job: String,
        target: String,
    },
    Snapshot {
        job: String,
        target: String,
    },
    Maintenance {
        job: String,
        operation: MaintenanceKind,
        target: String,
    },
    /// Blocks until a specific execution instant of an upstream DAG's task
    /// is complete; `wait` computes which instant from the downstream
    /// execution instant.
    ExternalWait {
        upstream_dag: String,
        upstream_task: TaskId,
        wait: WaitFn,
    },
    /// Blocks until an external source passes its freshness check.
    FreshnessWait {
        source: String,
        identifier: String,
        target: String,
    },
    Gate(GateRule),
    /// Structural no-op endpoint.
    Join,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskNode {
    pub id: TaskId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<TaskId>,
    pub retries: u32,
    #[serde(flatten)]
    pub kind: TaskKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupNode {
    pub id: TaskId,
}

/// One DAG container as the orchestrator will see it.
#[derive(Debug, Clone, Serialize)]
pub struct Dag {
    pub name: String,
    pub domain: String,
    pub tags: Vec<String>,
    /// Cron schedule string; `None` means manual-trigger only.
    pub schedule: Option<String>,
    pub catchup: bool,
    pub max_active_runs: u32,
    groups: BTreeMap<TaskId, GroupNode>,
    tasks: BTreeMap<TaskId, TaskNode>,
    edges: Vec<(NodeRef, NodeRef)>,
}

impl Dag {
    pub fn new(
        name: String,
        domain: String,
        tags: Vec<String>,
        schedule: Option<String>,
        catchup: bool,
        max_active_runs: u32,
    ) -> Self {
        Dag {
            name,
            domain,
            tags,
            schedule,
            catchup,
            max_active_runs,
            groups: BTreeMap::new(),
            tasks: BTreeMap::new(),
            edges: Vec::new(),
        }
    }

    /// Idempotent: adding an existing group is a no-op.
    pub fn add_group(&mut self, id: impl Into<TaskId>) -> TaskId {
        let id = id.into();
        self.groups
            .entry(id.clone())
            .or_insert_with(|| GroupNode { id: id.clone() });
        id
    }

    pub fn add_task(&mut self, task: TaskNode) -> Result<TaskId> {
        if self.tasks.contains_key(&task.id) {
            return Err(DagforgeError::Graph(format!(
                "duplicate task id '{}' in DAG '{}'",
                task.id, self.name
            )));
        }
        if let Some(group) = &task.group {
            if !self.groups.contains_key(group) {
                return Err(DagforgeError::Graph(format!(
                    "task '{}' references unknown group '{group}' in DAG '{}'",
                    task.id, self.name
                )));
            }
        }
        let id = task.id.clone();
        self.tasks.insert(id.clone(), task);
        Ok(id)
    }

    pub fn has_task(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn has_group(&self, id: &str) -> bool {
        self.groups.contains_key(id)
    }

    pub fn task(&self, id: &str) -> Option<&TaskNode> {
        self.tasks.get(id)
    }

    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(|s| s.as_str())
    }

    pub fn group_ids(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(|s| s.as_str())
    }

    /// Tasks belonging to the given group.
    pub fn tasks_in_group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a TaskNode> {
        self.tasks
            .values()
            .filter(move |t| t.group.as_deref() == Some(group))
    }

    fn contains(&self, node: &NodeRef) -> bool {
        match node {
            NodeRef::Task(id) => self.has_task(id),
            NodeRef::Group(id) => self.has_group(id),
        }
    }

    /// Commit one dependency edge. Both endpoints must exist; an exact
    /// duplicate is ignored.
    pub fn connect(&mut self, upstream: NodeRef, downstream: NodeRef) -> Result<()> {
        for node in [&upstream, &downstream] {
            if !self.contains(node) {
                return Err(DagforgeError::Graph(format!(
                    "edge endpoint '{}' does not exist in DAG '{}'",
                    node.id(),
                    self.name
                )));
            }
        }
        let edge = (upstream, downstream);
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
        Ok(())
    }

    /// Committed edges, in commit order.
    pub fn edges(&self) -> &[(NodeRef, NodeRef)] {
        &self.edges
    }

    pub fn upstream_of(&self, node: &NodeRef) -> Vec<&NodeRef> {
        self.edges
            .iter()
            .filter(|(_, down)| down == node)
            .map(|(up, _)| up)
            .collect()
    }

    pub fn downstream_of(&self, node: &NodeRef) -> Vec<&NodeRef> {
        self.edges
            .iter()
            .filter(|(up, _)| up == node)
            .map(|(_, down)| down)
            .collect()
    }

    /// Whether the node has no committed upstream edge.
    pub fn is_root(&self, node: &NodeRef) -> bool {
        self.edges.iter().all(|(_, down)| down != node)
    }
}

/// The full compiled output: every DAG container keyed by name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DagSet {
    pub dags: BTreeMap<String, Dag>,
}

impl DagSet {
    pub fn get(&self, name: &str) -> Option<&Dag> {
        self.dags.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Dag> {
        self.dags.get_mut(name).ok_or_else(|| {
            DagforgeError::Graph(format!("DAG '{name}' has not been created"))
        })
    }

    pub fn insert(&mut self, dag: Dag) {
        self.dags.insert(dag.name.clone(), dag);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.dags.keys().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dag() -> Dag {
        Dag::new("a__daily".into(), "a".into(), vec![], Some("0 0 * * *".into()), true, 50)
    }

    fn join(id: &str, group: Option<&str>) -> TaskNode {
        TaskNode {
            id: id.to_string(),
            group: group.map(|g| g.to_string()),
            retries: 1,
            kind: TaskKind::Join,
        }
    }

    #[test]
    fn tasks_must_reference_existing_groups() {
        let mut dag = dag();
        assert!(dag.add_task(join("t1", Some("missing"))).is_err());
        dag.add_group("g1");
        assert!(dag.add_task(join("t1", Some("g1"))).is_ok());
        assert!(dag.add_task(join("t1", None)).is_err());
    }

    #[test]
    fn connect_validates_endpoints_and_dedups() {
        let mut dag = dag();
        dag.add_task(join("t1", None)).unwrap();
        dag.add_task(join("t2", None)).unwrap();

        let t1 = NodeRef::Task("t1".into());
        let t2 = NodeRef::Task("t2".into());
        dag.connect(t1.clone(), t2.clone()).unwrap();
        dag.connect(t1.clone(), t2.clone()).unwrap();
        assert_eq!(dag.edges().len(), 1);

        assert!(dag.connect(t1.clone(), NodeRef::Task("nope".into())).is_err());
        assert!(dag.connect(NodeRef::Group("nope".into()), t2.clone()).is_err());

        assert!(dag.is_root(&t1));
        assert!(!dag.is_root(&t2));
        assert_eq!(dag.upstream_of(&t2), vec![&t1]);
        assert_eq!(dag.downstream_of(&t1), vec![&t2]);
    }

    #[test]
    fn group_add_is_idempotent() {
        let mut dag = dag();
        dag.add_group("g1");
        dag.add_group("g1");
        assert_eq!(dag.group_ids().count(), 1);
    }
}
