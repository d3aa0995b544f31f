// src/exec/backend.rs

//! Pluggable task execution.
//!
//! The plan executor hands each selected unit to a [`TaskExecutor`]. The CLI
//! uses [`ShellTaskExecutor`](super::shell::ShellTaskExecutor); tests provide
//! their own implementation that records what ran instead of spawning
//! processes.

use tracing::debug;

use crate::exec::coordination::{CoordinationService, Disposition};
use crate::exec::executor::SchedulerState;
use crate::exec::locks::LeaseId;
use crate::types::{ProjectPath, WorkRef};

/// What the unit itself reports after running.
#[derive(Debug)]
pub enum TaskOutcome {
    Success,
    /// The unit decided it had nothing to do.
    Skipped,
    /// The unit ran and failed.
    Failed(anyhow::Error),
}

/// Runs one unit of work.
///
/// `Ok(TaskOutcome::Failed(_))` is a reported failure and follows the
/// failure policy. `Err(_)` (or a panic) is an execution failure and always
/// aborts the rest of the plan.
pub trait TaskExecutor: Sync {
    fn execute(&self, work: &WorkRef, context: &TaskContext<'_>) -> anyhow::Result<TaskOutcome>;
}

impl<F> TaskExecutor for F
where
    F: Fn(&WorkRef, &TaskContext<'_>) -> anyhow::Result<TaskOutcome> + Sync,
{
    fn execute(&self, work: &WorkRef, context: &TaskContext<'_>) -> anyhow::Result<TaskOutcome> {
        self(work, context)
    }
}

/// Handed to the executor for the duration of one unit.
pub struct TaskContext<'a> {
    work: &'a WorkRef,
    lease: LeaseId,
    coordination: &'a CoordinationService<SchedulerState>,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(
        work: &'a WorkRef,
        lease: LeaseId,
        coordination: &'a CoordinationService<SchedulerState>,
    ) -> Self {
        Self {
            work,
            lease,
            coordination,
        }
    }

    pub fn work(&self) -> &WorkRef {
        self.work
    }

    /// The project whose lock is held while this unit runs, if any.
    pub fn project(&self) -> Option<&ProjectPath> {
        self.work.project()
    }

    pub fn lease(&self) -> LeaseId {
        self.lease
    }

    /// Give up the project lock while `f` runs, so other work of the same
    /// project can proceed, then take it back (waiting if needed).
    pub fn without_project_lock<T>(&self, f: impl FnOnce() -> T) -> T {
        let Some(project) = self.project() else {
            return f();
        };

        let holds = self
            .coordination
            .with_state(|state| state.locks.projects.release_all(project, self.lease));
        debug!(task = %self.work, project = %project, holds, "released project lock");

        let value = f();

        self.coordination.with_state_lock(|state, _| {
            if state.locks.projects.reacquire(project, self.lease, holds) {
                Disposition::Finished(())
            } else {
                Disposition::Retry
            }
        });
        debug!(task = %self.work, project = %project, "reacquired project lock");
        value
    }
}
