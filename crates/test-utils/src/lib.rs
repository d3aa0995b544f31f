pub mod builders;
pub mod recording;

use std::sync::{Arc, Once};

use buildplan::config::{BuildDefinition, ConfigFile};
use buildplan::errors::Result;
use buildplan::plan::ExecutionPlan;
use buildplan::types::WorkRef;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Root used for builds that only exist in memory.
pub const VIRTUAL_ROOT: &str = "/buildplan-test-root";

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .with_thread_names(true)
            .init();
    });
}

/// Wrap an in-memory build file as a build rooted at [`VIRTUAL_ROOT`].
pub fn definition(config: ConfigFile) -> Arc<BuildDefinition> {
    Arc::new(BuildDefinition::new(VIRTUAL_ROOT, config))
}

/// Populate and order a plan for `tasks` (task paths or `@build:task`).
pub fn plan_for(config: ConfigFile, tasks: &[&str]) -> Result<ExecutionPlan> {
    plan_with(config, tasks, |_| {})
}

/// Like [`plan_for`], letting the caller configure the plan (filter,
/// failure policy) before it is populated.
pub fn plan_with(
    config: ConfigFile,
    tasks: &[&str],
    configure: impl FnOnce(&mut ExecutionPlan),
) -> Result<ExecutionPlan> {
    let definition = definition(config);
    let mut plan = ExecutionPlan::new(definition.clone(), definition);
    configure(&mut plan);
    plan.add_to_task_graph(tasks.iter().map(|task| work(task)))?;
    plan.determine_execution_plan()?;
    Ok(plan)
}

/// Parse a task path or included reference; panics on malformed input.
pub fn work(raw: &str) -> WorkRef {
    WorkRef::parse(raw).unwrap_or_else(|err| panic!("bad work reference '{raw}': {err}"))
}
