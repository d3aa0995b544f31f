// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `buildplan`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "buildplan",
    version,
    about = "Plan and run interdependent build tasks in parallel.",
    long_about = None
)]
pub struct CliArgs {
    /// Tasks to run (`compile`, `app:test`, `@tools:gen`).
    ///
    /// Default: `[build].default_tasks` from the build file.
    #[arg(value_name = "TASK")]
    pub tasks: Vec<String>,

    /// Path to the build file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Buildplan.toml")]
    pub build_file: String,

    /// Number of worker threads, including the main thread.
    ///
    /// Overrides `[build].max_workers`; defaults to the available parallelism.
    #[arg(long, value_name = "N")]
    pub max_workers: Option<usize>,

    /// Keep running tasks that don't depend on a failed one.
    #[arg(long = "continue")]
    pub continue_on_failure: bool,

    /// Leave out tasks matching this glob (e.g. `:app:test*`). Repeatable.
    #[arg(short = 'x', long = "exclude-task", value_name = "GLOB")]
    pub exclude_task: Vec<String>,

    /// Print the execution plan without running anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `BUILDPLAN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
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
