// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `dagforge`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dagforge",
    version,
    about = "Compile a transformation-job manifest into orchestrator DAGs.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the job manifest (JSON).
    #[arg(long, value_name = "PATH", default_value = "manifest.json")]
    pub manifest: String,

    /// Path to the profiles file with named execution targets (JSON).
    #[arg(long, value_name = "PATH", default_value = "profiles.json")]
    pub profiles: String,

    /// Path to the compiler config file (TOML).
    ///
    /// Default: `Dagforge.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Dagforge.toml")]
    pub config: String,

    /// Where to write the compiled DAG set (JSON). Defaults to stdout.
    #[arg(long, value_name = "PATH")]
    pub out: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DAGFORGE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate + compile, print a summary, but write nothing.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
