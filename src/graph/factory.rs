// src/graph/factory.rs

//! Node factory: one node per unit of work for the lifetime of a graph.

use std::collections::HashMap;
use std::ops::{Index, IndexMut};

use crate::graph::node::{NodeId, WorkNode};
use crate::types::WorkRef;

/// Arena of work nodes plus the canonical unit -> node mapping.
///
/// All edge mutation goes through the factory so that back references
/// (dependency predecessors, finalizing successors) stay consistent.
#[derive(Debug, Default)]
pub struct NodeFactory {
    nodes: Vec<WorkNode>,
    by_work: HashMap<WorkRef, NodeId>,
}

impl NodeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, work: WorkRef) -> NodeId {
        if let Some(id) = self.by_work.get(&work) {
            return *id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(WorkNode::new(id, work.clone()));
        self.by_work.insert(work, id);
        id
    }

    pub fn find(&self, work: &WorkRef) -> Option<NodeId> {
        self.by_work.get(work).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.by_work.clear();
    }

    /// `from` depends on `to`: `to` must run (successfully) first.
    pub fn add_dependency(&mut self, from: NodeId, to: NodeId) {
        let (from_key, to_key) = self.keys(from, to);
        self.nodes[from.0].dependency_successors.insert(to_key, to);
        self.nodes[to.0].dependency_predecessors.insert(from_key, from);
    }

    pub fn add_must_successor(&mut self, from: NodeId, to: NodeId) {
        let (_, to_key) = self.keys(from, to);
        self.nodes[from.0].must_successors.insert(to_key, to);
    }

    pub fn add_should_successor(&mut self, from: NodeId, to: NodeId) {
        let (_, to_key) = self.keys(from, to);
        self.nodes[from.0].should_successors.insert(to_key, to);
    }

    pub fn remove_should_successor(&mut self, from: NodeId, to: NodeId) {
        let key = self.nodes[to.0].work().clone();
        self.nodes[from.0].should_successors.remove(&key);
    }

    /// `finalizer` runs after `node` whenever `node` runs.
    pub fn add_finalizer(&mut self, node: NodeId, finalizer: NodeId) {
        let (node_key, finalizer_key) = self.keys(node, finalizer);
        self.nodes[node.0].finalizers.insert(finalizer_key, finalizer);
        self.nodes[finalizer.0]
            .finalizing_successors
            .insert(node_key, node);
    }

    fn keys(&self, a: NodeId, b: NodeId) -> (WorkRef, WorkRef) {
        (
            self.nodes[a.0].work().clone(),
            self.nodes[b.0].work().clone(),
        )
    }
}

impl Index<NodeId> for NodeFactory {
    type Output = WorkNode;

    fn index(&self, id: NodeId) -> &WorkNode {
        &self.nodes[id.0]
    }
}

impl IndexMut<NodeId> for NodeFactory {
    fn index_mut(&mut self, id: NodeId) -> &mut WorkNode {
        &mut self.nodes[id.0]
    }
}
