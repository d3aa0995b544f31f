// src/exec/mod.rs

//! Plan execution layer.
//!
//! - [`locks`] holds project locks, worker leases and per-transaction lock
//!   tracking.
//! - [`coordination`] serialises access to the scheduler state and lets
//!   workers wait for state changes.
//! - [`cancel`] provides the cancellation token.
//! - [`backend`] defines the `TaskExecutor` trait that runs one unit.
//! - [`executor`] owns the worker pool that drains an execution plan.
//! - [`shell`] is the process-spawning executor the CLI uses.

pub mod backend;
pub mod cancel;
pub mod coordination;
pub mod executor;
pub mod locks;
pub mod shell;

pub use backend::{TaskContext, TaskExecutor, TaskOutcome};
pub use cancel::{CallbackId, CancellationToken};
pub use executor::{PlanExecutor, PlanOutcome};
pub use locks::{LeaseId, ProjectLocks, ResourceLockState, ResourceLocks, WorkerLeases};
pub use shell::ShellTaskExecutor;
