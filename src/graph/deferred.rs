// src/graph/deferred.rs

//! Deferred edge commits.
//!
//! The external orchestrator builds its execution graph incrementally, and
//! committing a group-to-group relation after task-level relations have
//! already touched those groups corrupts its adjacency bookkeeping. The
//! registry exists to work around that: edges are staged while a component
//! is constructed, then flushed in a safe order (group-to-group edges
//! first, everything else after, insertion order preserved inside each
//! bucket).

use std::cmp::Reverse;

use crate::errors::Result;
use crate::graph::dag::{Dag, NodeRef};

#[derive(Debug, Default)]
pub struct DeferredEdgeRegistry {
    pending: Vec<(NodeRef, NodeRef)>,
}

impl DeferredEdgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, upstream: NodeRef, downstream: NodeRef) {
        self.pending.push((upstream, downstream));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Flush all staged edges into `dag`, group↔group edges first.
    pub fn commit(self, dag: &mut Dag) -> Result<()> {
        let mut pending = self.pending;
        // Stable partition on the boolean key, descending.
        pending.sort_by_key(|(up, down)| Reverse(up.is_group() && down.is_group()));
        for (upstream, downstream) in pending {
            dag.connect(upstream, downstream)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::dag::{TaskKind, TaskNode};

    fn task(id: &str) -> NodeRef {
        NodeRef::Task(id.to_string())
    }

    fn group(id: &str) -> NodeRef {
        NodeRef::Group(id.to_string())
    }

    fn dag_with(tasks: &[&str], groups: &[&str]) -> Dag {
        let mut dag = Dag::new("d__daily".into(), "d".into(), vec![], None, false, 1);
        for g in groups {
            dag.add_group(*g);
        }
        for t in tasks {
            dag.add_task(TaskNode {
                id: t.to_string(),
                group: None,
                retries: 0,
                kind: TaskKind::Join,
            })
            .unwrap();
        }
        dag
    }

    #[test]
    fn group_pairs_commit_first_in_insertion_order() {
        let mut dag = dag_with(&["t1", "t2"], &["g1", "g2", "g3"]);
        let mut registry = DeferredEdgeRegistry::new();

        registry.register(group("g1"), task("t1"));
        registry.register(task("t1"), task("t2"));
        registry.register(group("g1"), group("g2"));
        registry.register(task("t2"), group("g3"));
        registry.register(group("g2"), group("g3"));

        registry.commit(&mut dag).unwrap();

        let edges: Vec<_> = dag
            .edges()
            .iter()
            .map(|(u, d)| (u.id().to_string(), d.id().to_string()))
            .collect();
        assert_eq!(
            edges,
            vec![
                ("g1".to_string(), "g2".to_string()),
                ("g2".to_string(), "g3".to_string()),
                ("g1".to_string(), "t1".to_string()),
                ("t1".to_string(), "t2".to_string()),
                ("t2".to_string(), "g3".to_string()),
            ]
        );
    }

    #[test]
    fn commit_propagates_unknown_endpoints() {
        let mut dag = dag_with(&["t1"], &[]);
        let mut registry = DeferredEdgeRegistry::new();
        registry.register(task("t1"), task("ghost"));
        assert!(registry.commit(&mut dag).is_err());
    }

    #[test]
    fn duplicate_registrations_commit_once() {
        let mut dag = dag_with(&["t1", "t2"], &[]);
        let mut registry = DeferredEdgeRegistry::new();
        registry.register(task("t1"), task("t2"));
        registry.register(task("t1"), task("t2"));
        assert_eq!(registry.len(), 2);
        registry.commit(&mut dag).unwrap();
        assert_eq!(dag.edges().len(), 1);
    }
}
