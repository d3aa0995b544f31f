// src/graph/filter.rs

//! Unit inclusion filter.
//!
//! Excluded tasks stay in the graph as NOT_REQUIRED so that ordering
//! constraints through them are still known, but they never run.

use std::fmt;
use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::errors::{PlanError, Result};
use crate::types::WorkRef;

type Predicate = dyn Fn(&WorkRef) -> bool + Send + Sync;

#[derive(Clone)]
pub struct TaskFilter {
    predicate: Arc<Predicate>,
}

impl TaskFilter {
    /// Accept every unit.
    pub fn all() -> Self {
        Self::from_fn(|_| true)
    }

    pub fn from_fn(predicate: impl Fn(&WorkRef) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Exclude local tasks whose rendered path (`:app:test`) matches any of
    /// the glob patterns. Included work is never excluded here.
    pub fn excluding<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = build_glob_set(patterns)?;
        Ok(Self::from_fn(move |work| match work {
            WorkRef::Task(task) => !set.is_match(task.to_string()),
            WorkRef::Included(_) => true,
        }))
    }

    pub fn is_satisfied_by(&self, work: &WorkRef) -> bool {
        (self.predicate)(work)
    }
}

impl Default for TaskFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Debug for TaskFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TaskFilter")
    }
}

fn build_glob_set<I, S>(patterns: I) -> Result<GlobSet>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        // Allow `test` as shorthand for `:test`.
        let normalized = if pattern.starts_with(':') || pattern.starts_with('*') {
            pattern.to_string()
        } else {
            format!(":{pattern}")
        };
        let glob = Glob::new(&normalized).map_err(|e| {
            PlanError::Config(format!("invalid exclude pattern '{pattern}': {e}"))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| PlanError::Config(format!("failed to build exclude patterns: {e}")))
}
