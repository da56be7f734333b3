// src/graph/mod.rs

//! Dependency-graph compilation.
//!
//! - [`dag`] is the orchestrator-facing graph model (tasks, groups,
//!   committed edges).
//! - [`domain`] holds the per-(domain, frequency) container metadata and
//!   its lookup-or-create registry.
//! - [`deferred`] stages edges and commits them in dependency-safe order.
//! - [`component`] materializes one manifest job into DAG nodes.
//! - [`builder`] drives the whole compilation.
//! - [`hooks`] is the optional catalog integration point.

pub mod builder;
pub mod component;
pub mod dag;
pub mod deferred;
pub mod domain;
pub mod hooks;

pub use builder::{compile_graph, GraphCompiler};
pub use dag::{Dag, DagSet, GateRule, NodeRef, TaskId, TaskKind, TaskNode};
pub use deferred::DeferredEdgeRegistry;
pub use domain::{DagFlavor, DomainDag, DomainDagRegistry};
pub use hooks::{CatalogHook, NoopCatalogHook};
