// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod graph;
pub mod logging;
pub mod manifest;
pub mod schedule;

use std::fs;

use tracing::info;

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::errors::Result;
use crate::graph::builder::compile_graph;
use crate::graph::dag::DagSet;
use crate::graph::hooks::CatalogHook;
use crate::manifest::loader::{load_manifest, load_profiles};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - compiler config loading (TOML)
/// - manifest + profiles loading (JSON)
/// - graph compilation
/// - JSON export (or a dry-run summary)
pub fn run(args: CliArgs) -> Result<()> {
    let config = load_and_validate(&args.config)?;
    let manifest = load_manifest(&args.manifest)?;
    let profiles = load_profiles(&args.profiles)?;

    let hook: Option<&dyn CatalogHook> = None;
    let dags = compile_graph(&config, &manifest, &profiles, hook)?;

    if args.dry_run || config.compile.dry_run {
        print_dry_run(&dags);
        return Ok(());
    }

    let rendered = serde_json::to_string_pretty(&dags)?;
    match &args.out {
        Some(path) => {
            fs::write(path, rendered)?;
            info!(path = %path, dags = dags.dags.len(), "compiled DAG set written");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

/// Simple dry-run output: containers, schedules, and node counts.
fn print_dry_run(dags: &DagSet) {
    println!("dagforge dry-run");
    println!("containers ({}):", dags.dags.len());
    for (name, dag) in dags.dags.iter() {
        println!("  - {name}");
        match &dag.schedule {
            Some(expr) => println!("      schedule: {expr}"),
            None => println!("      schedule: manual"),
        }
        println!("      tags: {:?}", dag.tags);
        println!(
            "      tasks: {}, groups: {}, edges: {}",
            dag.task_ids().count(),
            dag.group_ids().count(),
            dag.edges().len()
        );
    }
}
