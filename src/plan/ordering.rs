// src/plan/ordering.rs

//! Linear ordering of a populated work graph.
//!
//! Iterative depth-first walk with visiting segments: every entry node (and
//! every finalizer queued later) walks in its own segment, and meeting a node
//! that is already being visited in the same segment means a cycle. A cycle
//! that went through a should-run-after edge is broken by dropping the most
//! recently walked such edge and rewinding the walk to just before it. Any
//! other cycle is an error.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::errors::Result;
use crate::graph::{NodeFactory, NodeId};
use crate::plan::cycle::ordering_cycle_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Visit {
    node: NodeId,
    segment: usize,
}

/// A should-run-after edge the walk went through.
#[derive(Debug, Clone, Copy)]
struct WalkedEdge {
    from: NodeId,
    to: NodeId,
}

/// Node -> segments it is currently being visited in.
#[derive(Default)]
struct VisitingNodes {
    segments: HashMap<NodeId, HashSet<usize>>,
}

impl VisitingNodes {
    fn contains(&self, node: NodeId) -> bool {
        self.segments.get(&node).is_some_and(|s| !s.is_empty())
    }

    fn contains_entry(&self, node: NodeId, segment: usize) -> bool {
        self.segments
            .get(&node)
            .is_some_and(|s| s.contains(&segment))
    }

    fn put(&mut self, node: NodeId, segment: usize) {
        self.segments.entry(node).or_default().insert(segment);
    }

    fn remove(&mut self, node: NodeId, segment: usize) {
        if let Some(segments) = self.segments.get_mut(&node) {
            segments.remove(&segment);
            if segments.is_empty() {
                self.segments.remove(&node);
            }
        }
    }
}

/// The plan under construction: insertion ordered, no duplicates.
#[derive(Default)]
struct PlanSequence {
    order: Vec<NodeId>,
    members: HashSet<NodeId>,
}

impl PlanSequence {
    fn contains(&self, node: NodeId) -> bool {
        self.members.contains(&node)
    }

    fn push(&mut self, node: NodeId) {
        assert!(self.members.insert(node), "node {node:?} added to the plan twice");
        self.order.push(node);
    }

    fn retain_first(&mut self, count: usize) {
        for removed in self.order.drain(count.min(self.order.len())..) {
            self.members.remove(&removed);
        }
    }
}

/// Compute the execution order for everything reachable from `entry_nodes`.
///
/// May remove should-run-after edges from the graph.
pub fn determine_execution_order(
    nodes: &mut NodeFactory,
    entry_nodes: &[NodeId],
) -> Result<Vec<NodeId>> {
    let mut queue: VecDeque<Visit> = entry_nodes
        .iter()
        .enumerate()
        .map(|(segment, &node)| Visit { node, segment })
        .collect();
    let mut next_segment = queue.len();

    let mut visiting = VisitingNodes::default();
    let mut walked: Vec<WalkedEdge> = Vec::new();
    let mut path: Vec<NodeId> = Vec::new();
    let mut plan_before_visiting: HashMap<NodeId, usize> = HashMap::new();
    let mut plan = PlanSequence::default();

    while let Some(&Visit { node, segment }) = queue.front() {
        if nodes[node].is_include_in_graph() || plan.contains(node) {
            queue.pop_front();
            visiting.remove(node, segment);
            maybe_remove_processed_edge(&mut walked, node);
            continue;
        }

        let already_visited = visiting.contains(node);
        visiting.put(node, segment);

        if !already_visited {
            // First visit: queue successors ahead of this node and leave it in place.
            record_edge_if_arrived_via_should_run_after(nodes, &mut walked, &path, node);
            nodes[node]
                .should_successors
                .retain(|successor| !visiting.contains_entry(successor, segment));
            if !nodes[node].should_successors().is_empty() {
                plan_before_visiting.insert(node, plan.order.len());
            }

            let successors: Vec<NodeId> = nodes[node].all_successors_in_reverse_order().collect();
            let mut rewound = false;
            for successor in successors {
                if visiting.contains_entry(successor, segment) {
                    let Some(edge) = walked.pop() else {
                        return Err(ordering_cycle_error(nodes, entry_nodes, node, successor));
                    };
                    debug!(
                        from = %nodes[edge.from].work(),
                        to = %nodes[edge.to].work(),
                        "dropping should-run-after edge to break a cycle"
                    );
                    nodes.remove_should_successor(edge.from, edge.to);
                    restore_path(&mut path, edge.from);
                    restore_queue(&mut queue, &mut visiting, edge.from);
                    if let Some(&count) = plan_before_visiting.get(&edge.from) {
                        plan.retain_first(count);
                    }
                    rewound = true;
                    break;
                }
                queue.push_front(Visit {
                    node: successor,
                    segment,
                });
            }
            if !rewound {
                path.push(node);
            }
        } else {
            // Successors are done: append to the plan.
            queue.pop_front();
            maybe_remove_processed_edge(&mut walked, node);
            visiting.remove(node, segment);
            path.pop();
            plan.push(node);

            let finalizers: Vec<NodeId> = nodes[node].finalizers().ids().collect();
            for finalizer in finalizers {
                if !visiting.contains(finalizer) {
                    let position = finalizer_position(nodes, finalizer, &queue);
                    queue.insert(
                        position,
                        Visit {
                            node: finalizer,
                            segment: next_segment,
                        },
                    );
                    next_segment += 1;
                }
            }
        }
    }

    Ok(plan.order)
}

fn maybe_remove_processed_edge(walked: &mut Vec<WalkedEdge>, node: NodeId) {
    if walked.last().is_some_and(|edge| edge.to == node) {
        walked.pop();
    }
}

fn record_edge_if_arrived_via_should_run_after(
    nodes: &NodeFactory,
    walked: &mut Vec<WalkedEdge>,
    path: &[NodeId],
    node: NodeId,
) {
    if let Some(&previous) = path.last() {
        if nodes[previous]
            .should_successors()
            .contains(nodes[node].work())
        {
            walked.push(WalkedEdge {
                from: previous,
                to: node,
            });
        }
    }
}

fn restore_path(path: &mut Vec<NodeId>, from: NodeId) {
    while let Some(removed) = path.pop() {
        if removed == from {
            break;
        }
    }
}

/// Drop queued visits until `from` is at the front again, forgetting that
/// any of them (including `from`) were being visited.
fn restore_queue(queue: &mut VecDeque<Visit>, visiting: &mut VisitingNodes, from: NodeId) {
    while let Some(&next) = queue.front() {
        visiting.remove(next.node, next.segment);
        if next.node == from {
            break;
        }
        queue.pop_front();
    }
}

/// Queue index right after the last of the finalizer's preceding tasks, or 0.
fn finalizer_position(nodes: &NodeFactory, finalizer: NodeId, queue: &VecDeque<Visit>) -> usize {
    if queue.is_empty() {
        return 0;
    }
    all_preceding_tasks(nodes, finalizer)
        .into_iter()
        .filter_map(|preceding| queue.iter().position(|visit| visit.node == preceding))
        .max()
        .map_or(0, |index| index + 1)
}

/// Every node that must come before the finalizer, following must-run-after
/// and finalizing edges transitively.
fn all_preceding_tasks(nodes: &NodeFactory, finalizer: NodeId) -> HashSet<NodeId> {
    let mut preceding: HashSet<NodeId> = HashSet::new();
    let mut candidates: Vec<NodeId> = nodes[finalizer].all_successors().collect();

    while let Some(candidate) = candidates.pop() {
        if preceding.insert(candidate) {
            candidates.extend(nodes[candidate].must_successors().ids());
            candidates.extend(nodes[candidate].finalizing_successors().ids());
        }
    }
    preceding
}
