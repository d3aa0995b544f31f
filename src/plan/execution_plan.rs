// src/plan/execution_plan.rs

//! The execution plan: graph + ordered queue + the runtime selection state.
//!
//! Every method that touches runtime state is meant to be called from
//! inside a coordination transaction; the plan itself does no locking.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::errors::{PlanError, Result};
use crate::exec::locks::{LeaseId, ProjectLocks, ResourceLockState, ResourceLocks};
use crate::graph::{
    DependencySource, FailureKind, NodeFactory, NodeId, NodeState, TaskFilter, WorkGraph, WorkNode,
};
use crate::plan::failures::{AbortOnFailure, FailureAction, FailureCollector, FailureHandler};
use crate::plan::mutations::{MutationSource, Mutations};
use crate::plan::ordering::determine_execution_order;
use crate::types::{ProjectPath, TaskId, WorkRef};

/// A node handed to a worker by [`ExecutionPlan::select_next`].
#[derive(Debug, Clone)]
pub struct SelectedWork {
    pub node: NodeId,
    pub work: WorkRef,
    pub project: Option<ProjectPath>,
    /// False when the node was skipped at selection because a dependency
    /// did not succeed; the worker only has to report completion.
    pub run: bool,
}

/// How one selected node ended, as reported back by the worker.
#[derive(Debug)]
pub enum WorkResult {
    /// The unit ran (or decided by itself that it had nothing to do).
    Success,
    /// The unit ran and reported a failure.
    Failed(anyhow::Error),
    /// Something escaped the unit's execution.
    ExecutionFailed(anyhow::Error),
    /// The node was skipped at selection and never ran.
    NotRun,
}

pub struct ExecutionPlan {
    graph: WorkGraph,
    mutations: Mutations,
    plan: Vec<NodeId>,
    in_plan: HashSet<NodeId>,
    queue: Vec<NodeId>,
    projects: BTreeSet<ProjectPath>,
    running: HashSet<NodeId>,
    dependencies_complete: HashSet<NodeId>,
    failures: FailureCollector,
    failure_handler: Box<dyn FailureHandler>,
    continue_on_failure: bool,
    tasks_cancelled: bool,
}

impl ExecutionPlan {
    pub fn new(dependencies: Arc<dyn DependencySource>, mutations: Arc<dyn MutationSource>) -> Self {
        Self {
            graph: WorkGraph::new(dependencies),
            mutations: Mutations::new(mutations),
            plan: Vec::new(),
            in_plan: HashSet::new(),
            queue: Vec::new(),
            projects: BTreeSet::new(),
            running: HashSet::new(),
            dependencies_complete: HashSet::new(),
            failures: FailureCollector::default(),
            failure_handler: Box::new(AbortOnFailure),
            continue_on_failure: false,
            tasks_cancelled: false,
        }
    }

    pub fn use_filter(&mut self, filter: TaskFilter) {
        self.graph.use_filter(filter);
    }

    pub fn set_continue_on_failure(&mut self, continue_on_failure: bool) {
        self.continue_on_failure = continue_on_failure;
    }

    pub fn use_failure_handler(&mut self, handler: impl FailureHandler + 'static) {
        self.failure_handler = Box::new(handler);
    }

    pub fn add_to_task_graph(&mut self, requested: impl IntoIterator<Item = WorkRef>) -> Result<()> {
        self.graph.add_to_task_graph(requested)
    }

    /// Order the graph and prepare the runtime queue.
    pub fn determine_execution_plan(&mut self) -> Result<()> {
        let entry_nodes = self.graph.entry_nodes().to_vec();
        let order = determine_execution_order(self.graph.nodes_mut(), &entry_nodes)?;

        let nodes = self.graph.nodes();
        for &node in &order {
            self.mutations.track(node);
            for dependency in nodes[node].dependency_successors().ids() {
                self.mutations.link_consumer(node, dependency);
            }
            if let Some(project) = nodes[node].work().project() {
                self.projects.insert(project.clone());
            }
        }

        self.in_plan = order.iter().copied().collect();
        self.queue = order.clone();
        self.plan = order;

        info!(
            tasks = self.plan.len(),
            projects = self.projects.len(),
            "execution plan determined"
        );
        Ok(())
    }

    pub fn nodes(&self) -> &NodeFactory {
        self.graph.nodes()
    }

    /// Nodes in execution order.
    pub fn plan_nodes(&self) -> impl Iterator<Item = &WorkNode> + '_ {
        let nodes = self.graph.nodes();
        self.plan.iter().map(move |id| &nodes[*id])
    }

    /// Local tasks in execution order.
    pub fn tasks(&self) -> Vec<TaskId> {
        let mut tasks = Vec::new();
        for node in self.plan_nodes() {
            node.work().collect_task_into(&mut tasks);
        }
        tasks
    }

    /// Local tasks excluded by the filter.
    pub fn filtered_tasks(&self) -> Vec<TaskId> {
        let nodes = self.graph.nodes();
        let mut tasks = Vec::new();
        for id in self.graph.filtered_nodes() {
            nodes[*id].work().collect_task_into(&mut tasks);
        }
        tasks
    }

    /// Direct dependencies of a task that is part of the plan.
    pub fn dependencies_of(&self, task: &TaskId) -> Result<Vec<TaskId>> {
        let work = WorkRef::Task(task.clone());
        let node = self
            .graph
            .nodes()
            .find(&work)
            .filter(|id| self.in_plan.contains(id))
            .ok_or_else(|| {
                PlanError::TaskNotFound(format!(
                    "{task} is not part of the execution plan, no dependency information is available"
                ))
            })?;

        let nodes = self.graph.nodes();
        let mut tasks = Vec::new();
        for dependency in nodes[node].dependency_successors().ids() {
            nodes[dependency].work().collect_task_into(&mut tasks);
        }
        Ok(tasks)
    }

    pub fn state_of(&self, work: &WorkRef) -> Option<NodeState> {
        let nodes = self.graph.nodes();
        nodes.find(work).map(|id| nodes[id].state())
    }

    pub fn size(&self) -> usize {
        self.plan.len()
    }

    pub fn projects(&self) -> impl Iterator<Item = &ProjectPath> + '_ {
        self.projects.iter()
    }

    /// Pick the next node `lease` may work on, taking its locks.
    ///
    /// `Ok(None)` means nothing can start right now; the caller decides
    /// between waiting and finishing via [`has_work_remaining`](Self::has_work_remaining).
    pub fn select_next(
        &mut self,
        lease: LeaseId,
        locks: &mut ResourceLocks,
        lock_state: &mut ResourceLockState,
    ) -> Result<Option<SelectedWork>> {
        if self.all_projects_locked(&locks.projects) {
            return Ok(None);
        }

        let mut index = 0;
        while index < self.queue.len() {
            let node = self.queue[index];
            if !self.graph.nodes()[node].is_ready() || !self.all_dependencies_complete(node) {
                index += 1;
                continue;
            }

            self.mutations.resolve(self.graph.nodes(), node)?;

            let work = self.graph.nodes()[node].work().clone();
            let project = work.project().cloned();
            let acquired = project
                .as_ref()
                .is_none_or(|p| lock_state.try_lock_project(&mut locks.projects, p, lease))
                && lock_state.try_lock_lease(&mut locks.leases, lease)
                && self
                    .mutations
                    .can_run_with(self.graph.nodes(), node, &self.running);
            if !acquired {
                lock_state.release_locks(locks);
                index += 1;
                continue;
            }

            let run = self.all_dependencies_successful(node);
            let selected = &mut self.graph.nodes_mut()[node];
            if run {
                selected.start_execution();
                self.running.insert(node);
                debug!(task = %work, worker = %lease, "selected");
            } else {
                if selected.is_required() {
                    selected.skip_execution();
                } else {
                    selected.abort_execution();
                }
                info!(task = %work, "skipped: a dependency did not succeed");
            }
            self.queue.remove(index);

            return Ok(Some(SelectedWork {
                node,
                work,
                project,
                run,
            }));
        }
        Ok(None)
    }

    fn all_dependencies_complete(&mut self, node: NodeId) -> bool {
        if self.dependencies_complete.contains(&node) {
            return true;
        }
        let nodes = self.graph.nodes();
        let complete = nodes[node].hard_successors().all(|s| nodes[s].is_complete());
        if complete {
            self.dependencies_complete.insert(node);
        }
        complete
    }

    fn all_dependencies_successful(&self, node: NodeId) -> bool {
        let nodes = self.graph.nodes();
        nodes[node]
            .dependency_successors()
            .ids()
            .all(|d| nodes[d].is_successful())
    }

    /// Record how a selected node ended and release its project lock.
    pub fn work_complete(
        &mut self,
        node: NodeId,
        result: WorkResult,
        projects: &mut ProjectLocks,
        lease: LeaseId,
    ) {
        let work = self.graph.nodes()[node].work().clone();

        if !self.graph.nodes()[node].is_complete() {
            self.enforce_finalizers(node);

            let failure = match result {
                WorkResult::Success | WorkResult::NotRun => None,
                WorkResult::Failed(cause) => Some((
                    FailureKind::Reported,
                    PlanError::TaskFailed {
                        task: work.clone(),
                        cause,
                    },
                )),
                WorkResult::ExecutionFailed(cause) => Some((
                    FailureKind::Execution,
                    PlanError::ExecutionFailed {
                        task: work.clone(),
                        cause,
                    },
                )),
            };
            if let Some((kind, failure)) = failure {
                self.graph.nodes_mut()[node].record_failure(kind);
                self.handle_failure(&work, kind, failure);
            }

            self.graph.nodes_mut()[node].finish_execution();
            self.running.remove(&node);
            self.mutations.record_completed(self.graph.nodes(), node);
            debug!(task = %work, worker = %lease, "completed");
        }

        if let Some(project) = work.project() {
            projects.unlock(project, lease);
        }
    }

    /// Finalizers of a node that ran get a chance to run, whatever else happens.
    fn enforce_finalizers(&mut self, node: NodeId) {
        let nodes = self.graph.nodes_mut();
        let finalizers: Vec<NodeId> = nodes[node].finalizers().ids().collect();
        let mut enforced: HashSet<NodeId> = HashSet::new();

        for finalizer in finalizers {
            if !(nodes[finalizer].is_required() || nodes[finalizer].is_must_not_run()) {
                continue;
            }
            let mut candidates = vec![finalizer];
            while let Some(candidate) = candidates.pop() {
                if !enforced.insert(candidate) {
                    continue;
                }
                candidates.extend(nodes[candidate].dependency_successors().ids());
                if nodes[candidate].is_must_not_run() || nodes[candidate].is_required() {
                    nodes[candidate].enforce_run();
                }
            }
        }
    }

    fn handle_failure(&mut self, work: &WorkRef, kind: FailureKind, failure: PlanError) {
        error!(task = %work, error = %failure, "task failed");
        match kind {
            FailureKind::Execution => {
                self.abort_execution(false);
            }
            FailureKind::Reported if self.continue_on_failure => {}
            FailureKind::Reported => {
                let action = self.failure_handler.on_task_failure(work, &failure);
                if action == FailureAction::Abort {
                    self.abort_execution(false);
                }
            }
        }
        self.failures.add(failure);
    }

    /// Skip pending required nodes; with `abort_all` also enforced ones.
    /// Executing nodes are left alone.
    fn abort_execution(&mut self, abort_all: bool) -> bool {
        let nodes = self.graph.nodes_mut();
        let mut aborted = false;
        for &id in &self.plan {
            let node = &mut nodes[id];
            if node.is_required() {
                node.skip_execution();
                aborted = true;
            }
            if abort_all && node.is_ready() {
                node.abort_execution();
                aborted = true;
            }
        }
        if aborted {
            warn!(abort_all, "aborting remaining work");
        }
        aborted
    }

    /// Stop everything that has not started and record `failure`.
    pub fn abort_all_and_fail(&mut self, failure: PlanError) {
        self.abort_execution(true);
        self.failures.add(failure);
    }

    /// Skip pending required work because the build was cancelled.
    pub fn cancel_execution(&mut self) {
        self.tasks_cancelled = self.abort_execution(false) || self.tasks_cancelled;
    }

    /// Hand out the collected failures; a cancellation that skipped work is
    /// reported first.
    pub fn take_failures(&mut self) -> Vec<PlanError> {
        let mut failures = Vec::with_capacity(self.failures.len() + 1);
        if self.tasks_cancelled {
            failures.push(PlanError::Cancelled);
        }
        failures.extend(self.failures.take());
        failures
    }

    pub fn all_tasks_complete(&self) -> bool {
        let nodes = self.graph.nodes();
        self.plan.iter().all(|id| nodes[*id].is_complete())
    }

    pub fn has_work_remaining(&self) -> bool {
        let nodes = self.graph.nodes();
        self.queue.iter().any(|id| !nodes[*id].is_complete()) || !self.running.is_empty()
    }

    /// True when every project of the plan is locked, so no local task can
    /// start. A plan without projects never counts as locked.
    pub fn all_projects_locked(&self, projects: &ProjectLocks) -> bool {
        !self.projects.is_empty() && self.projects.iter().all(|p| projects.is_locked(p))
    }

    /// Reset everything for reuse by another build.
    pub fn clear(&mut self) {
        self.graph.clear();
        self.mutations.clear();
        self.plan.clear();
        self.in_plan.clear();
        self.queue.clear();
        self.projects.clear();
        self.running.clear();
        self.dependencies_complete.clear();
        self.failures.clear();
        self.tasks_cancelled = false;
    }
}
