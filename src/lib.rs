// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod graph;
pub mod logging;
pub mod plan;
pub mod types;

use std::sync::Arc;
use std::thread;

use anyhow::{bail, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::BuildDefinition;
use crate::exec::{CancellationToken, PlanExecutor, ShellTaskExecutor};
use crate::graph::TaskFilter;
use crate::plan::ExecutionPlan;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - build file loading
/// - graph population and the task filter
/// - plan ordering
/// - the worker pool with the shell executor
pub fn run(args: CliArgs) -> Result<()> {
    if args.max_workers == Some(0) {
        bail!("--max-workers must be >= 1 (got 0)");
    }

    let definition = Arc::new(BuildDefinition::load(&args.build_file)?);
    let requested = definition.resolve_requested(&args.tasks)?;
    info!(?requested, root = %definition.root().display(), "build loaded");

    let plan = build_plan(&definition, &args, requested)?;

    if args.dry_run {
        print_dry_run(&plan);
        return Ok(());
    }

    let workers = args
        .max_workers
        .or(definition.max_workers())
        .unwrap_or_else(default_parallelism);
    let executor = ShellTaskExecutor::new(Arc::clone(&definition));
    let outcome = PlanExecutor::new(workers, CancellationToken::new()).process(plan, &executor);
    outcome.result?;
    Ok(())
}

fn build_plan(
    definition: &Arc<BuildDefinition>,
    args: &CliArgs,
    requested: Vec<types::WorkRef>,
) -> Result<ExecutionPlan> {
    let mut plan = ExecutionPlan::new(definition.clone(), definition.clone());
    if !args.exclude_task.is_empty() {
        plan.use_filter(TaskFilter::excluding(&args.exclude_task)?);
    }
    plan.set_continue_on_failure(args.continue_on_failure || definition.continue_on_failure());
    plan.add_to_task_graph(requested)?;
    plan.determine_execution_plan()?;
    Ok(plan)
}

fn default_parallelism() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}

/// Dry-run output: the plan in execution order with each node's state.
fn print_dry_run(plan: &ExecutionPlan) {
    println!("buildplan dry-run");
    println!();

    println!("execution plan ({}):", plan.size());
    for node in plan.plan_nodes() {
        println!("  - {node} [{:?}]", node.state());
        let dependencies: Vec<String> = node
            .dependency_successors()
            .keys()
            .map(|work| work.to_string())
            .collect();
        if !dependencies.is_empty() {
            println!("      depends on: {}", dependencies.join(", "));
        }
        let finalizers: Vec<String> = node.finalizers().keys().map(|work| work.to_string()).collect();
        if !finalizers.is_empty() {
            println!("      finalized by: {}", finalizers.join(", "));
        }
    }

    let filtered = plan.filtered_tasks();
    if !filtered.is_empty() {
        println!();
        println!("excluded ({}):", filtered.len());
        for task in filtered {
            println!("  - {task}");
        }
    }

    debug!("dry-run complete (no execution)");
}
