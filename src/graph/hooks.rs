// src/graph/hooks.rs

//! Optional data-catalog integration point.
//!
//! The hook is invoked as each model node is constructed so an external
//! catalog can mirror the graph. Failures are logged and swallowed unless
//! the config marks catalog success as required, in which case the failure
//! is fatal for that node's construction.

use crate::graph::dag::TaskNode;

pub trait CatalogHook {
    /// Called once per constructed model/seed/snapshot node.
    fn on_node_built(&self, dag_name: &str, task: &TaskNode) -> anyhow::Result<()>;
}

/// Hook that records nothing; useful as a default and in tests.
#[derive(Debug, Default)]
pub struct NoopCatalogHook;

impl CatalogHook for NoopCatalogHook {
    fn on_node_built(&self, _dag_name: &str, _task: &TaskNode) -> anyhow::Result<()> {
        Ok(())
    }
}
