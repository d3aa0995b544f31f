// src/plan/failures.rs

//! Failure collection and the policy for reported task failures.

use crate::errors::PlanError;
use crate::types::WorkRef;

/// What to do after a task reported that it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Stop scheduling required work.
    Abort,
    /// Record the failure and keep going with independent work.
    Continue,
}

/// Consulted for reported failures when not running in continue mode.
pub trait FailureHandler: Send {
    fn on_task_failure(&mut self, task: &WorkRef, failure: &PlanError) -> FailureAction;
}

/// Default handler: any reported failure aborts the build.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbortOnFailure;

impl FailureHandler for AbortOnFailure {
    fn on_task_failure(&mut self, _task: &WorkRef, _failure: &PlanError) -> FailureAction {
        FailureAction::Abort
    }
}

impl<F> FailureHandler for F
where
    F: FnMut(&WorkRef, &PlanError) -> FailureAction + Send,
{
    fn on_task_failure(&mut self, task: &WorkRef, failure: &PlanError) -> FailureAction {
        self(task, failure)
    }
}

/// Failures accumulated over one plan, in the order they happened.
#[derive(Debug, Default)]
pub struct FailureCollector {
    failures: Vec<PlanError>,
}

impl FailureCollector {
    pub fn add(&mut self, failure: PlanError) {
        self.failures.push(failure);
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn take(&mut self) -> Vec<PlanError> {
        std::mem::take(&mut self.failures)
    }

    pub fn clear(&mut self) {
        self.failures.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskId;

    fn work(path: &str) -> WorkRef {
        WorkRef::Task(TaskId::parse(path).unwrap())
    }

    #[test]
    fn collector_hands_out_failures_in_order() {
        let mut collector = FailureCollector::default();
        assert!(collector.is_empty());
        collector.add(PlanError::Cancelled);
        collector.add(PlanError::TaskNotFound("b".to_string()));
        assert_eq!(collector.len(), 2);

        let taken = collector.take();
        assert!(matches!(taken[0], PlanError::Cancelled));
        assert!(matches!(taken[1], PlanError::TaskNotFound(_)));
        assert!(collector.is_empty());
    }

    #[test]
    fn closures_act_as_failure_handlers() {
        let mut seen = Vec::new();
        let mut handler = |task: &WorkRef, _: &PlanError| {
            seen.push(task.to_string());
            FailureAction::Continue
        };
        let action = handler.on_task_failure(&work("a"), &PlanError::Cancelled);
        assert_eq!(action, FailureAction::Continue);
        assert_eq!(seen, vec![":a"]);
        assert_eq!(
            AbortOnFailure.on_task_failure(&work("a"), &PlanError::Cancelled),
            FailureAction::Abort
        );
    }
}
