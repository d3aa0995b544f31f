// src/graph/resolver.rs

//! Dependency resolution: declared relations -> graph edges.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::errors::Result;
use crate::graph::factory::NodeFactory;
use crate::graph::node::NodeId;
use crate::types::{TaskId, WorkRef};

/// Relations a task declares towards other units.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskRelations {
    pub depends_on: Vec<WorkRef>,
    pub must_run_after: Vec<TaskId>,
    pub should_run_after: Vec<TaskId>,
    pub finalized_by: Vec<TaskId>,
}

/// Where the declared relations of a task come from.
pub trait DependencySource: Send + Sync {
    fn relations_of(&self, task: &TaskId) -> anyhow::Result<TaskRelations>;
}

/// Caching front for a [`DependencySource`] that adds the edges to the graph.
pub struct DependencyResolver {
    source: Arc<dyn DependencySource>,
    cache: HashMap<TaskId, Arc<TaskRelations>>,
}

impl DependencyResolver {
    pub fn new(source: Arc<dyn DependencySource>) -> Self {
        Self {
            source,
            cache: HashMap::new(),
        }
    }

    fn relations(&mut self, task: &TaskId) -> Result<Arc<TaskRelations>> {
        if let Some(found) = self.cache.get(task) {
            return Ok(Arc::clone(found));
        }
        let relations = Arc::new(self.source.relations_of(task)?);
        self.cache.insert(task.clone(), Arc::clone(&relations));
        Ok(relations)
    }

    /// Resolve every relation of `node` into edges.
    ///
    /// Returns the nodes that must be visited by the graph walk: dependency
    /// targets and finalizers, in declaration order. Ordering-only targets
    /// are linked but not returned; they take part in the plan only if
    /// something else pulls them in.
    pub fn resolve_dependencies(
        &mut self,
        nodes: &mut NodeFactory,
        node: NodeId,
    ) -> Result<Vec<NodeId>> {
        let task = match nodes[node].work() {
            WorkRef::Task(task) => task.clone(),
            WorkRef::Included(_) => return Ok(Vec::new()),
        };
        let relations = self.relations(&task)?;
        let mut discovered = Vec::new();

        for dep in &relations.depends_on {
            let target = nodes.get_or_create(dep.clone());
            trace!(task = %task, dependency = %dep, "dependency edge");
            nodes.add_dependency(node, target);
            discovered.push(target);
        }

        for finalizer in &relations.finalized_by {
            let target = nodes.get_or_create(WorkRef::Task(finalizer.clone()));
            trace!(task = %task, finalizer = %finalizer, "finalizer edge");
            nodes.add_finalizer(node, target);
            if !nodes[target].is_in_known_state() {
                nodes[target].must_not_run();
            }
            discovered.push(target);
        }

        for after in &relations.must_run_after {
            let target = nodes.get_or_create(WorkRef::Task(after.clone()));
            nodes.add_must_successor(node, target);
        }

        for after in &relations.should_run_after {
            let target = nodes.get_or_create(WorkRef::Task(after.clone()));
            nodes.add_should_successor(node, target);
        }

        Ok(discovered)
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(HashMap<TaskId, TaskRelations>);

    impl DependencySource for Fixed {
        fn relations_of(&self, task: &TaskId) -> anyhow::Result<TaskRelations> {
            Ok(self.0.get(task).cloned().unwrap_or_default())
        }
    }

    fn task(path: &str) -> TaskId {
        TaskId::parse(path).unwrap()
    }

    #[test]
    fn resolves_each_relation_kind() {
        let mut relations = HashMap::new();
        relations.insert(
            task("a"),
            TaskRelations {
                depends_on: vec![WorkRef::Task(task("b"))],
                must_run_after: vec![task("c")],
                should_run_after: vec![task("d")],
                finalized_by: vec![task("e")],
            },
        );
        let mut resolver = DependencyResolver::new(Arc::new(Fixed(relations)));
        let mut nodes = NodeFactory::new();
        let a = nodes.get_or_create(WorkRef::Task(task("a")));

        let discovered = resolver.resolve_dependencies(&mut nodes, a).unwrap();
        let b = nodes.find(&WorkRef::Task(task("b"))).unwrap();
        let e = nodes.find(&WorkRef::Task(task("e"))).unwrap();
        assert_eq!(discovered, vec![b, e]);

        assert!(nodes[a].dependency_successors().contains(nodes[b].work()));
        assert!(nodes[b].dependency_predecessors().contains(nodes[a].work()));
        assert_eq!(nodes[a].must_successors().len(), 1);
        assert_eq!(nodes[a].should_successors().len(), 1);
        assert!(nodes[e].finalizing_successors().contains(nodes[a].work()));
        assert!(nodes[e].is_must_not_run());
    }

    #[test]
    fn included_work_has_no_relations() {
        let mut resolver = DependencyResolver::new(Arc::new(Fixed(HashMap::new())));
        let mut nodes = NodeFactory::new();
        let included = WorkRef::parse("@tools:gen").unwrap();
        let id = nodes.get_or_create(included);
        assert!(resolver.resolve_dependencies(&mut nodes, id).unwrap().is_empty());
    }
}
