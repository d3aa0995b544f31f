// src/plan/cycle.rs

//! Cycle reporting for the ordering walk.
//!
//! The walk only notices that it came back to a node on the current path.
//! To report something useful we search the hard edges (dependency,
//! must-run-after, finalizing) for the actual strongly connected component
//! and render it as a small tree.

use std::collections::{HashMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::errors::PlanError;
use crate::graph::{NodeFactory, NodeId};
use crate::types::WorkRef;

/// Build the error for a cycle the ordering walk ran into while visiting
/// `node` and finding `successor` already on its path.
pub(crate) fn ordering_cycle_error(
    nodes: &NodeFactory,
    entry_nodes: &[NodeId],
    node: NodeId,
    successor: NodeId,
) -> PlanError {
    let Some(mut members) = find_cycle(nodes, entry_nodes, node, successor) else {
        return PlanError::MisdetectedCycle {
            from: nodes[node].work().clone(),
            to: nodes[successor].work().clone(),
        };
    };
    members.sort_by(|a, b| nodes[*a].work().cmp(nodes[*b].work()));

    let rendered = render_cycle(nodes, &members);
    PlanError::CircularDependency {
        tasks: members.iter().map(|m| nodes[*m].work().clone()).collect(),
        rendered,
    }
}

/// A cycle over hard edges reachable from the entry nodes or from the edge
/// the walk stopped at, preferring one that contains `near`.
///
/// Finalizers are walked in their own segments, so a cycle behind a
/// finalizer is not reachable from the entry nodes alone.
fn find_cycle(
    nodes: &NodeFactory,
    entry_nodes: &[NodeId],
    near: NodeId,
    successor: NodeId,
) -> Option<Vec<NodeId>> {
    let mut graph: DiGraph<NodeId, ()> = DiGraph::new();
    let mut index_of: HashMap<NodeId, NodeIndex> = HashMap::new();
    let mut stack: Vec<NodeId> = entry_nodes.to_vec();
    stack.push(near);
    stack.push(successor);

    while let Some(current) = stack.pop() {
        if index_of.contains_key(&current) {
            continue;
        }
        index_of.insert(current, graph.add_node(current));
        stack.extend(nodes[current].hard_successors());
    }

    for (&from, &from_index) in &index_of {
        for to in nodes[from].hard_successors() {
            if let Some(&to_index) = index_of.get(&to) {
                graph.update_edge(from_index, to_index, ());
            }
        }
    }

    let cycles: Vec<Vec<NodeId>> = tarjan_scc(&graph)
        .into_iter()
        .filter(|component| {
            component.len() > 1
                || component
                    .first()
                    .is_some_and(|only| graph.contains_edge(*only, *only))
        })
        .map(|component| component.into_iter().map(|index| graph[index]).collect())
        .collect();

    let preferred = cycles.iter().position(|cycle| cycle.contains(&near));
    match preferred {
        Some(position) => cycles.into_iter().nth(position),
        None => cycles.into_iter().next(),
    }
}

/// Render the cycle members as a dependency tree rooted at the first member.
///
/// ```text
/// :a
/// \--- :b
///      \--- :a (*)
/// ```
pub(crate) fn render_cycle(nodes: &NodeFactory, members: &[NodeId]) -> String {
    struct Frame {
        node: NodeId,
        prefix: String,
        last: Option<bool>,
    }

    let Some(&root) = members.first() else {
        return String::new();
    };

    let mut out = String::new();
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut omitted = false;
    let mut stack = vec![Frame {
        node: root,
        prefix: String::new(),
        last: None,
    }];

    while let Some(frame) = stack.pop() {
        let work: &WorkRef = nodes[frame.node].work();
        out.push_str(&frame.prefix);
        match frame.last {
            Some(true) => out.push_str("\\--- "),
            Some(false) => out.push_str("+--- "),
            None => {}
        }
        out.push_str(&work.to_string());

        if !seen.insert(frame.node) {
            out.push_str(" (*)\n");
            omitted = true;
            continue;
        }
        out.push('\n');

        let children: Vec<NodeId> = members
            .iter()
            .copied()
            .filter(|member| nodes[frame.node].has_hard_successor(nodes[*member].work()))
            .collect();
        let child_prefix = match frame.last {
            None => String::new(),
            Some(true) => format!("{}     ", frame.prefix),
            Some(false) => format!("{}|    ", frame.prefix),
        };
        let count = children.len();
        for (index, child) in children.into_iter().enumerate().rev() {
            stack.push(Frame {
                node: child,
                prefix: child_prefix.clone(),
                last: Some(index + 1 == count),
            });
        }
    }

    if omitted {
        out.push_str("\n(*) - details omitted (listed previously)\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskId;

    fn add(nodes: &mut NodeFactory, path: &str) -> NodeId {
        nodes.get_or_create(WorkRef::Task(TaskId::parse(path).unwrap()))
    }

    #[test]
    fn renders_two_node_cycle() {
        let mut nodes = NodeFactory::new();
        let a = add(&mut nodes, "a");
        let b = add(&mut nodes, "b");
        nodes.add_dependency(a, b);
        nodes.add_dependency(b, a);

        let rendered = render_cycle(&nodes, &[a, b]);
        assert_eq!(
            rendered,
            ":a\n\\--- :b\n     \\--- :a (*)\n\n(*) - details omitted (listed previously)\n"
        );
    }

    #[test]
    fn reports_members_in_natural_order() {
        let mut nodes = NodeFactory::new();
        let c = add(&mut nodes, "c");
        let a = add(&mut nodes, "a");
        let b = add(&mut nodes, "b");
        nodes.add_dependency(c, a);
        nodes.add_must_successor(a, b);
        nodes.add_dependency(b, c);

        match ordering_cycle_error(&nodes, &[c], c, a) {
            PlanError::CircularDependency { tasks, rendered } => {
                let names: Vec<String> = tasks.iter().map(|t| t.to_string()).collect();
                assert_eq!(names, vec![":a", ":b", ":c"]);
                assert!(rendered.starts_with(":a\n"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn finds_cycles_not_reachable_from_the_entry_nodes() {
        let mut nodes = NodeFactory::new();
        let t = add(&mut nodes, "t");
        let f = add(&mut nodes, "f");
        let g = add(&mut nodes, "g");
        nodes.add_finalizer(t, f);
        nodes.add_dependency(f, g);
        nodes.add_dependency(g, f);

        match ordering_cycle_error(&nodes, &[t], g, f) {
            PlanError::CircularDependency { tasks, .. } => {
                let names: Vec<String> = tasks.iter().map(|t| t.to_string()).collect();
                assert_eq!(names, vec![":f", ":g"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn no_hard_cycle_is_reported_as_misdetected() {
        let mut nodes = NodeFactory::new();
        let a = add(&mut nodes, "a");
        let b = add(&mut nodes, "b");
        nodes.add_should_successor(a, b);
        nodes.add_should_successor(b, a);

        let err = ordering_cycle_error(&nodes, &[a], a, b);
        assert!(matches!(err, PlanError::MisdetectedCycle { .. }));
    }
}
