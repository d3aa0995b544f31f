// src/graph/node.rs

//! Work nodes and their state machine.

use std::collections::BTreeMap;
use std::fmt;

use crate::types::WorkRef;

/// Index of a node inside one [`NodeFactory`](super::factory::NodeFactory).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Lifecycle state of a node within one plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Not yet decided whether the node takes part in this plan.
    Unknown,
    /// Excluded by the task filter.
    NotRequired,
    /// Required; runs unless the build is aborted.
    ShouldRun,
    /// Enforced (e.g. a finalizer whose finalized node ran); survives a plain abort.
    MustRun,
    /// Part of the graph only for ordering; will not run unless enforced.
    MustNotRun,
    Executing,
    Executed,
    Skipped,
}

/// Which kind of failure ended a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Something escaped the unit's execution.
    Execution,
    /// The unit ran and reported that it failed.
    Reported,
}

/// A set of graph edges, iterated in the natural order of the target units.
#[derive(Debug, Clone, Default)]
pub struct EdgeSet {
    targets: BTreeMap<WorkRef, NodeId>,
}

impl EdgeSet {
    pub fn insert(&mut self, key: WorkRef, id: NodeId) -> bool {
        self.targets.insert(key, id).is_none()
    }

    pub fn remove(&mut self, key: &WorkRef) -> bool {
        self.targets.remove(key).is_some()
    }

    pub fn contains(&self, key: &WorkRef) -> bool {
        self.targets.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Target nodes in natural order; reversible for stack-based walks.
    pub fn ids(&self) -> impl DoubleEndedIterator<Item = NodeId> + '_ {
        self.targets.values().copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = &WorkRef> + '_ {
        self.targets.keys()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(NodeId) -> bool) {
        self.targets.retain(|_, id| keep(*id));
    }

    pub fn clear(&mut self) {
        self.targets.clear();
    }
}

/// One schedulable unit plus its edges.
///
/// `dependency_successors` / `dependency_predecessors` are kept as mutual
/// inverses by the factory, which is the only place edges are added.
#[derive(Debug, Clone)]
pub struct WorkNode {
    id: NodeId,
    work: WorkRef,
    state: NodeState,
    dependencies_processed: bool,
    failure: Option<FailureKind>,
    pub(crate) dependency_successors: EdgeSet,
    pub(crate) dependency_predecessors: EdgeSet,
    pub(crate) must_successors: EdgeSet,
    pub(crate) should_successors: EdgeSet,
    pub(crate) finalizers: EdgeSet,
    pub(crate) finalizing_successors: EdgeSet,
}

impl WorkNode {
    pub(crate) fn new(id: NodeId, work: WorkRef) -> Self {
        Self {
            id,
            work,
            state: NodeState::Unknown,
            dependencies_processed: false,
            failure: None,
            dependency_successors: EdgeSet::default(),
            dependency_predecessors: EdgeSet::default(),
            must_successors: EdgeSet::default(),
            should_successors: EdgeSet::default(),
            finalizers: EdgeSet::default(),
            finalizing_successors: EdgeSet::default(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn work(&self) -> &WorkRef {
        &self.work
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn failure(&self) -> Option<FailureKind> {
        self.failure
    }

    pub fn dependency_successors(&self) -> &EdgeSet {
        &self.dependency_successors
    }

    pub fn dependency_predecessors(&self) -> &EdgeSet {
        &self.dependency_predecessors
    }

    pub fn must_successors(&self) -> &EdgeSet {
        &self.must_successors
    }

    pub fn should_successors(&self) -> &EdgeSet {
        &self.should_successors
    }

    pub fn finalizers(&self) -> &EdgeSet {
        &self.finalizers
    }

    pub fn finalizing_successors(&self) -> &EdgeSet {
        &self.finalizing_successors
    }

    /// Every successor: must, finalizing, should, then dependency edges.
    pub fn all_successors(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.must_successors
            .ids()
            .chain(self.finalizing_successors.ids())
            .chain(self.should_successors.ids())
            .chain(self.dependency_successors.ids())
    }

    /// Exact reverse of [`all_successors`](Self::all_successors).
    pub fn all_successors_in_reverse_order(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.dependency_successors
            .ids()
            .rev()
            .chain(self.should_successors.ids().rev())
            .chain(self.finalizing_successors.ids().rev())
            .chain(self.must_successors.ids().rev())
    }

    /// Successors that must be complete before this node may start.
    pub fn hard_successors(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.dependency_successors
            .ids()
            .chain(self.must_successors.ids())
            .chain(self.finalizing_successors.ids())
    }

    pub fn has_hard_successor(&self, other: &WorkRef) -> bool {
        self.dependency_successors.contains(other)
            || self.must_successors.contains(other)
            || self.finalizing_successors.contains(other)
    }

    pub fn dependencies_processed(&self) -> bool {
        self.dependencies_processed
    }

    pub(crate) fn mark_dependencies_processed(&mut self) {
        self.dependencies_processed = true;
    }

    pub fn is_required(&self) -> bool {
        self.state == NodeState::ShouldRun
    }

    pub fn is_must_not_run(&self) -> bool {
        self.state == NodeState::MustNotRun
    }

    /// Nodes that are not (yet) part of the plan: filtered or undecided.
    pub fn is_include_in_graph(&self) -> bool {
        matches!(self.state, NodeState::NotRequired | NodeState::Unknown)
    }

    /// Ready to start, dependencies aside.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, NodeState::ShouldRun | NodeState::MustRun)
    }

    pub fn is_in_known_state(&self) -> bool {
        self.state != NodeState::Unknown
    }

    /// The node will not run (any more) in this plan.
    pub fn is_complete(&self) -> bool {
        matches!(
            self.state,
            NodeState::Executed
                | NodeState::Skipped
                | NodeState::Unknown
                | NodeState::NotRequired
                | NodeState::MustNotRun
        )
    }

    pub fn is_successful(&self) -> bool {
        (self.state == NodeState::Executed && !self.is_failed())
            || self.state == NodeState::NotRequired
            || self.state == NodeState::MustNotRun
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn require(&mut self) {
        self.state = NodeState::ShouldRun;
    }

    pub fn do_not_require(&mut self) {
        self.state = NodeState::NotRequired;
    }

    pub fn must_not_run(&mut self) {
        self.state = NodeState::MustNotRun;
    }

    pub fn enforce_run(&mut self) {
        assert!(
            matches!(
                self.state,
                NodeState::ShouldRun | NodeState::MustNotRun | NodeState::MustRun
            ),
            "cannot enforce {} in state {:?}",
            self.work,
            self.state
        );
        self.state = NodeState::MustRun;
    }

    pub fn start_execution(&mut self) {
        assert!(
            self.is_ready(),
            "cannot start {} in state {:?}",
            self.work,
            self.state
        );
        self.state = NodeState::Executing;
    }

    pub fn finish_execution(&mut self) {
        assert!(
            self.state == NodeState::Executing,
            "cannot finish {} in state {:?}",
            self.work,
            self.state
        );
        self.state = NodeState::Executed;
    }

    pub fn skip_execution(&mut self) {
        assert!(
            self.state == NodeState::ShouldRun,
            "cannot skip {} in state {:?}",
            self.work,
            self.state
        );
        self.state = NodeState::Skipped;
    }

    pub fn abort_execution(&mut self) {
        assert!(
            self.is_ready(),
            "cannot abort {} in state {:?}",
            self.work,
            self.state
        );
        self.state = NodeState::Skipped;
    }

    pub(crate) fn record_failure(&mut self, kind: FailureKind) {
        self.failure = Some(kind);
    }
}

impl fmt::Display for WorkNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.work.fmt(f)
    }
}
