// src/graph/mod.rs

//! Work graph: nodes, their identity mapping, declared relations and the
//! graph builder that turns a set of requested units into a populated graph.
//!
//! - [`node`] holds the work node state machine and edge sets.
//! - [`factory`] is the arena that guarantees one node per unit.
//! - [`resolver`] turns declared relations into edges.
//! - [`filter`] decides which units may run at all.
//! - [`builder`] walks the requested units and settles node state.

pub mod builder;
pub mod factory;
pub mod filter;
pub mod node;
pub mod resolver;

pub use builder::WorkGraph;
pub use factory::NodeFactory;
pub use filter::TaskFilter;
pub use node::{EdgeSet, FailureKind, NodeId, NodeState, WorkNode};
pub use resolver::{DependencyResolver, DependencySource, TaskRelations};
