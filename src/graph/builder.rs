// src/graph/builder.rs

//! Graph construction from a requested set of units.
//!
//! The walk is queue based: a node's dependency and finalizer targets are
//! pushed to the front of the queue, so every dependency is resolved before
//! the node that needs it is marked processed. Whether a node actually runs
//! is decided along the way (`require`), and whatever is still undecided at
//! the end is settled by looking at its dependents.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::errors::Result;
use crate::graph::factory::NodeFactory;
use crate::graph::filter::TaskFilter;
use crate::graph::node::NodeId;
use crate::graph::resolver::{DependencyResolver, DependencySource};
use crate::types::WorkRef;

pub struct WorkGraph {
    nodes: NodeFactory,
    resolver: DependencyResolver,
    filter: TaskFilter,
    entry_nodes: Vec<NodeId>,
    entry_set: HashSet<NodeId>,
    filtered: Vec<NodeId>,
    filtered_set: HashSet<NodeId>,
    unknown_state: Vec<NodeId>,
    unknown_set: HashSet<NodeId>,
}

impl WorkGraph {
    pub fn new(source: Arc<dyn DependencySource>) -> Self {
        Self {
            nodes: NodeFactory::new(),
            resolver: DependencyResolver::new(source),
            filter: TaskFilter::all(),
            entry_nodes: Vec::new(),
            entry_set: HashSet::new(),
            filtered: Vec::new(),
            filtered_set: HashSet::new(),
            unknown_state: Vec::new(),
            unknown_set: HashSet::new(),
        }
    }

    pub fn use_filter(&mut self, filter: TaskFilter) {
        self.filter = filter;
    }

    pub fn nodes(&self) -> &NodeFactory {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut NodeFactory {
        &mut self.nodes
    }

    /// Entry nodes in the order they were first requested (sorted per call).
    pub fn entry_nodes(&self) -> &[NodeId] {
        &self.entry_nodes
    }

    /// Nodes excluded by the filter, in discovery order.
    pub fn filtered_nodes(&self) -> &[NodeId] {
        &self.filtered
    }

    /// Add the requested units (and everything they pull in) to the graph.
    pub fn add_to_task_graph(&mut self, requested: impl IntoIterator<Item = WorkRef>) -> Result<()> {
        let mut sorted: Vec<WorkRef> = requested.into_iter().collect();
        sorted.sort();

        let mut queue: VecDeque<NodeId> = VecDeque::new();
        for work in sorted {
            let node = self.nodes.get_or_create(work);
            if self.nodes[node].is_must_not_run() {
                self.require_with_dependencies(node);
            } else if self.satisfies_filter(node) {
                self.nodes[node].require();
            }
            if self.entry_set.insert(node) {
                self.entry_nodes.push(node);
            }
            queue.push_back(node);
        }

        let mut visiting: HashSet<NodeId> = HashSet::new();

        while let Some(&node) = queue.front() {
            if self.nodes[node].dependencies_processed() {
                queue.pop_front();
                continue;
            }

            if !self.satisfies_filter(node) {
                queue.pop_front();
                let excluded = &mut self.nodes[node];
                excluded.mark_dependencies_processed();
                excluded.do_not_require();
                trace!(task = %excluded.work(), "excluded by filter");
                if self.filtered_set.insert(node) {
                    self.filtered.push(node);
                }
                continue;
            }

            if visiting.insert(node) {
                // First visit: queue the targets ahead of this node and leave it in place.
                let discovered = self.resolver.resolve_dependencies(&mut self.nodes, node)?;
                for target in discovered {
                    if !visiting.contains(&target) {
                        queue.push_front(target);
                    }
                }

                if self.nodes[node].is_required() {
                    let successors: Vec<NodeId> =
                        self.nodes[node].dependency_successors().ids().collect();
                    for successor in successors {
                        if self.satisfies_filter(successor) {
                            self.nodes[successor].require();
                        }
                    }
                } else if self.unknown_set.insert(node) {
                    self.unknown_state.push(node);
                }
            } else {
                queue.pop_front();
                visiting.remove(&node);
                self.nodes[node].mark_dependencies_processed();
            }
        }

        self.resolve_work_in_unknown_state();

        debug!(
            entries = self.entry_nodes.len(),
            nodes = self.nodes.len(),
            filtered = self.filtered.len(),
            "task graph populated"
        );
        Ok(())
    }

    /// Settle nodes whose requirement is still open: they run only when some
    /// dependent runs.
    fn resolve_work_in_unknown_state(&mut self) {
        let mut queue: VecDeque<NodeId> = self.unknown_state.iter().copied().collect();
        let mut visiting: HashSet<NodeId> = HashSet::new();

        while let Some(&node) = queue.front() {
            if self.nodes[node].is_in_known_state() {
                queue.pop_front();
                continue;
            }

            if visiting.insert(node) {
                for predecessor in self.nodes[node].dependency_predecessors().ids() {
                    if !visiting.contains(&predecessor) {
                        queue.push_front(predecessor);
                    }
                }
            } else {
                queue.pop_front();
                visiting.remove(&node);
                let required = self.nodes[node]
                    .dependency_predecessors()
                    .ids()
                    .any(|p| self.nodes[p].is_required());
                let settled = &mut self.nodes[node];
                settled.must_not_run();
                if required {
                    settled.require();
                }
            }
        }
    }

    fn require_with_dependencies(&mut self, node: NodeId) {
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if self.nodes[current].is_must_not_run() && self.satisfies_filter(current) {
                self.nodes[current].require();
                stack.extend(self.nodes[current].dependency_successors().ids().rev());
            }
        }
    }

    pub(crate) fn satisfies_filter(&self, node: NodeId) -> bool {
        match self.nodes[node].work() {
            WorkRef::Task(_) => self.filter.is_satisfied_by(self.nodes[node].work()),
            WorkRef::Included(_) => true,
        }
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.resolver.clear();
        self.entry_nodes.clear();
        self.entry_set.clear();
        self.filtered.clear();
        self.filtered_set.clear();
        self.unknown_state.clear();
        self.unknown_set.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::graph::node::NodeState;
    use crate::graph::resolver::TaskRelations;
    use crate::types::TaskId;

    #[derive(Default)]
    struct Declared(HashMap<TaskId, TaskRelations>);

    impl Declared {
        fn depends(mut self, task: &str, on: &[&str]) -> Self {
            self.entry(task).depends_on = on.iter().map(|d| work(d)).collect();
            self
        }

        fn finalized_by(mut self, task: &str, by: &str) -> Self {
            self.entry(task).finalized_by.push(id(by));
            self
        }

        fn entry(&mut self, task: &str) -> &mut TaskRelations {
            self.0.entry(id(task)).or_default()
        }
    }

    impl DependencySource for Declared {
        fn relations_of(&self, task: &TaskId) -> anyhow::Result<TaskRelations> {
            Ok(self.0.get(task).cloned().unwrap_or_default())
        }
    }

    fn id(path: &str) -> TaskId {
        TaskId::parse(path).unwrap()
    }

    fn work(path: &str) -> WorkRef {
        WorkRef::parse(path).unwrap()
    }

    fn state(graph: &WorkGraph, path: &str) -> NodeState {
        let node = graph.nodes().find(&work(path)).unwrap();
        graph.nodes()[node].state()
    }

    #[test]
    fn requested_units_and_dependencies_are_required() {
        let source = Declared::default().depends("a", &["b"]).depends("b", &["c"]);
        let mut graph = WorkGraph::new(Arc::new(source));
        graph.add_to_task_graph([work("a")]).unwrap();

        assert_eq!(state(&graph, "a"), NodeState::ShouldRun);
        assert_eq!(state(&graph, "b"), NodeState::ShouldRun);
        assert_eq!(state(&graph, "c"), NodeState::ShouldRun);
        assert_eq!(graph.entry_nodes().len(), 1);
    }

    #[test]
    fn filtered_units_are_not_required_and_recorded() {
        let source = Declared::default().depends("a", &["b"]).depends("b", &["c"]);
        let mut graph = WorkGraph::new(Arc::new(source));
        graph.use_filter(TaskFilter::excluding(["b"]).unwrap());
        graph.add_to_task_graph([work("a")]).unwrap();

        assert_eq!(state(&graph, "a"), NodeState::ShouldRun);
        assert_eq!(state(&graph, "b"), NodeState::NotRequired);
        // never reached: `b` is not walked
        assert!(graph.nodes().find(&work("c")).is_none());
        assert_eq!(graph.filtered_nodes().len(), 1);
    }

    #[test]
    fn finalizer_dependencies_are_settled_from_their_dependents() {
        let source = Declared::default()
            .finalized_by("t", "f")
            .depends("f", &["g"]);
        let mut graph = WorkGraph::new(Arc::new(source));
        graph.add_to_task_graph([work("t")]).unwrap();

        assert_eq!(state(&graph, "t"), NodeState::ShouldRun);
        assert_eq!(state(&graph, "f"), NodeState::MustNotRun);
        assert_eq!(state(&graph, "g"), NodeState::MustNotRun);
    }

    #[test]
    fn requesting_a_finalizer_directly_requires_it() {
        let source = Declared::default()
            .finalized_by("t", "f")
            .depends("f", &["g"]);
        let mut graph = WorkGraph::new(Arc::new(source));
        graph.add_to_task_graph([work("t")]).unwrap();
        graph.add_to_task_graph([work("f")]).unwrap();

        assert_eq!(state(&graph, "f"), NodeState::ShouldRun);
        assert_eq!(state(&graph, "g"), NodeState::ShouldRun);
    }
}
