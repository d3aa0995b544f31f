// src/errors.rs

//! Crate-wide error type and result alias.

use std::fmt;

use thiserror::Error;

use crate::types::WorkRef;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// An ordering cycle made of hard edges only.
    #[error("Circular dependency between the following tasks:\n{rendered}")]
    CircularDependency {
        /// Cycle members in natural order.
        tasks: Vec<WorkRef>,
        rendered: String,
    },

    #[error("Misdetected cycle between {from} and {to}")]
    MisdetectedCycle { from: WorkRef, to: WorkRef },

    #[error("Task {task} {reason}")]
    InvalidMutations { task: WorkRef, reason: String },

    /// The unit ran and reported that it failed.
    #[error("Execution failed for task '{task}': {cause:#}")]
    TaskFailed { task: WorkRef, cause: anyhow::Error },

    /// Something unexpected escaped the unit's execution.
    #[error("Unexpected error executing '{task}': {cause:#}")]
    ExecutionFailed { task: WorkRef, cause: anyhow::Error },

    #[error("Build cancelled.")]
    Cancelled,

    #[error("{}", MultipleFailuresDisplay(.0))]
    MultipleFailures(Vec<PlanError>),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PlanError {
    /// Turn accumulated failures into a single outcome: nothing is success,
    /// one failure is returned as-is, several are wrapped.
    pub fn from_failures(mut failures: Vec<PlanError>) -> std::result::Result<(), PlanError> {
        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(PlanError::MultipleFailures(failures)),
        }
    }

    /// Flattened view of every failure held by this error.
    pub fn failures(&self) -> Vec<&PlanError> {
        match self {
            PlanError::MultipleFailures(all) => all.iter().collect(),
            other => vec![other],
        }
    }
}

struct MultipleFailuresDisplay<'a>(&'a [PlanError]);

impl fmt::Display for MultipleFailuresDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Build completed with {} failures.", self.0.len())?;
        for (index, failure) in self.0.iter().enumerate() {
            write!(f, "\n{}: {}", index + 1, failure)?;
        }
        Ok(())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PlanError>;
