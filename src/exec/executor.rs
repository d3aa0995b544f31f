// src/exec/executor.rs

//! Plan executor: a fixed pool of worker threads draining an execution plan.
//!
//! Every worker, including the calling thread, loops over two
//! transactions: select the next node (waiting while nothing can start),
//! run it outside the lock, then report completion. Once no work is left
//! the calling thread waits for everything to complete and turns the
//! collected failures into the result.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::errors::{PlanError, Result};
use crate::exec::backend::{TaskContext, TaskExecutor, TaskOutcome};
use crate::exec::cancel::CancellationToken;
use crate::exec::coordination::{CoordinationService, Disposition};
use crate::exec::locks::{HoldsResourceLocks, LeaseId, ResourceLocks};
use crate::plan::{ExecutionPlan, SelectedWork, WorkResult};

/// Everything the coordination service guards while a plan runs.
pub(crate) struct SchedulerState {
    pub(crate) plan: ExecutionPlan,
    pub(crate) locks: ResourceLocks,
}

impl HoldsResourceLocks for SchedulerState {
    fn resource_locks(&mut self) -> &mut ResourceLocks {
        &mut self.locks
    }
}

/// Result of processing a plan. The plan is handed back so callers can
/// inspect final node states.
pub struct PlanOutcome {
    pub plan: ExecutionPlan,
    pub result: Result<()>,
}

#[derive(Debug, Clone)]
pub struct PlanExecutor {
    max_workers: usize,
    cancellation: CancellationToken,
}

impl PlanExecutor {
    /// `max_workers` is clamped to at least one (the calling thread).
    pub fn new(max_workers: usize, cancellation: CancellationToken) -> Self {
        Self {
            max_workers: max_workers.max(1),
            cancellation,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn process<E>(&self, plan: ExecutionPlan, executor: &E) -> PlanOutcome
    where
        E: TaskExecutor + ?Sized,
    {
        info!(workers = self.max_workers, tasks = plan.size(), "executing plan");

        let coordination = Arc::new(CoordinationService::new(SchedulerState {
            plan,
            locks: ResourceLocks::new(self.max_workers),
        }));

        let waker = Arc::downgrade(&coordination);
        let callback = self.cancellation.add_callback(move || {
            if let Some(coordination) = waker.upgrade() {
                coordination.notify_state_change();
            }
        });

        let failures = thread::scope(|scope| {
            for index in 1..self.max_workers {
                let coordination = &*coordination;
                let cancellation = &self.cancellation;
                let spawned = thread::Builder::new()
                    .name(format!("plan-worker-{index}"))
                    .spawn_scoped(scope, move || {
                        run_worker(LeaseId(index), coordination, executor, cancellation);
                    });
                if let Err(err) = spawned {
                    warn!(worker = index, error = %err, "failed to start worker thread");
                }
            }

            run_worker(LeaseId(0), &coordination, executor, &self.cancellation);
            await_completion(&coordination)
        });

        // Callbacks run under the registry lock, so none is running past this point.
        self.cancellation.remove_callback(callback);

        let state = match Arc::into_inner(coordination) {
            Some(coordination) => coordination.into_inner(),
            None => unreachable!("scheduler state is still shared after all workers finished"),
        };

        let result = PlanError::from_failures(failures);
        match &result {
            Ok(()) => info!("plan completed"),
            Err(err) => warn!(failures = err.failures().len(), "plan completed with failures"),
        }
        PlanOutcome {
            plan: state.plan,
            result,
        }
    }
}

fn run_worker<E>(
    lease: LeaseId,
    coordination: &CoordinationService<SchedulerState>,
    executor: &E,
    cancellation: &CancellationToken,
) where
    E: TaskExecutor + ?Sized,
{
    debug!(worker = %lease, "worker started");
    while let Some(selected) = next_work(lease, coordination, cancellation) {
        let result = if selected.run {
            execute(&selected, lease, coordination, executor)
        } else {
            WorkResult::NotRun
        };

        coordination.with_state(|state| {
            state
                .plan
                .work_complete(selected.node, result, &mut state.locks.projects, lease);
            state.locks.leases.unlock(lease);
        });
    }
    debug!(worker = %lease, "worker finished");
}

fn next_work(
    lease: LeaseId,
    coordination: &CoordinationService<SchedulerState>,
    cancellation: &CancellationToken,
) -> Option<SelectedWork> {
    coordination.with_state_lock(|state, lock_state| {
        let SchedulerState { plan, locks } = state;

        if cancellation.is_cancellation_requested() {
            plan.cancel_execution();
        }
        if !plan.has_work_remaining() {
            return Disposition::Finished(None);
        }

        match plan.select_next(lease, locks, lock_state) {
            Ok(Some(selected)) => Disposition::Finished(Some(selected)),
            Ok(None) => Disposition::Retry,
            Err(err) => {
                warn!(worker = %lease, error = %err, "failed to select next task");
                lock_state.release_locks(locks);
                plan.abort_all_and_fail(err);
                Disposition::Finished(None)
            }
        }
    })
}

fn execute<E>(
    selected: &SelectedWork,
    lease: LeaseId,
    coordination: &CoordinationService<SchedulerState>,
    executor: &E,
) -> WorkResult
where
    E: TaskExecutor + ?Sized,
{
    info!(task = %selected.work, worker = %lease, "task started");
    let context = TaskContext::new(&selected.work, lease, coordination);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        executor.execute(&selected.work, &context)
    }));

    let result = match outcome {
        Ok(Ok(TaskOutcome::Success)) => WorkResult::Success,
        Ok(Ok(TaskOutcome::Skipped)) => {
            info!(task = %selected.work, "task skipped itself");
            WorkResult::Success
        }
        Ok(Ok(TaskOutcome::Failed(cause))) => WorkResult::Failed(cause),
        Ok(Err(err)) => WorkResult::ExecutionFailed(err),
        Err(payload) => WorkResult::ExecutionFailed(anyhow!(
            "task panicked: {}",
            panic_message(payload.as_ref())
        )),
    };
    info!(
        task = %selected.work,
        worker = %lease,
        success = matches!(result, WorkResult::Success),
        "task finished"
    );
    result
}

fn await_completion(coordination: &CoordinationService<SchedulerState>) -> Vec<PlanError> {
    coordination.with_state_lock(|state, _| {
        if state.plan.all_tasks_complete() {
            Disposition::Finished(state.plan.take_failures())
        } else {
            Disposition::Retry
        }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
