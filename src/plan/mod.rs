// src/plan/mod.rs

//! Execution planning.
//!
//! - [`ordering`] turns a populated graph into a linear order.
//! - [`cycle`] finds and renders ordering cycles.
//! - [`mutations`] tracks declared outputs/destroyables for conflict checks.
//! - [`failures`] collects failures and holds the failure policy.
//! - [`execution_plan`] ties it together and implements selection.

pub mod cycle;
pub mod execution_plan;
pub mod failures;
pub mod mutations;
pub mod ordering;

pub use execution_plan::{ExecutionPlan, SelectedWork, WorkResult};
pub use failures::{AbortOnFailure, FailureAction, FailureCollector, FailureHandler};
pub use mutations::{DeclaredMutations, MutationSource, NoMutations};
