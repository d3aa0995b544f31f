// src/plan/mutations.rs

//! Output / destroyable tracking used to keep conflicting work apart.
//!
//! Paths are resolved lazily the first time a node is considered for
//! execution and kept until the node is complete and nobody still consumes
//! its outputs.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::trace;

use crate::errors::{PlanError, Result};
use crate::graph::{NodeFactory, NodeId};
use crate::types::{TaskId, WorkRef};

/// What a task declares about the files it touches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclaredMutations {
    pub outputs: Vec<PathBuf>,
    pub local_state: Vec<PathBuf>,
    pub destroyables: Vec<PathBuf>,
    pub has_file_inputs: bool,
    pub has_outputs: bool,
}

/// Where the declared file mutations of a task come from.
pub trait MutationSource: Send + Sync {
    fn mutations_of(&self, task: &TaskId) -> anyhow::Result<DeclaredMutations>;
}

/// A source for builds that declare no files at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMutations;

impl MutationSource for NoMutations {
    fn mutations_of(&self, _task: &TaskId) -> anyhow::Result<DeclaredMutations> {
        Ok(DeclaredMutations::default())
    }
}

#[derive(Debug, Default)]
pub(crate) struct MutationInfo {
    consuming: HashSet<NodeId>,
    consumes_output_of: HashSet<NodeId>,
    output_paths: BTreeSet<PathBuf>,
    destroyable_paths: BTreeSet<PathBuf>,
    has_file_inputs: bool,
    has_outputs: bool,
    has_local_state: bool,
    resolved: bool,
}

/// Per-plan registry of mutation info plus the path and reachability caches.
pub(crate) struct Mutations {
    source: Arc<dyn MutationSource>,
    infos: HashMap<NodeId, MutationInfo>,
    canonical: HashMap<PathBuf, PathBuf>,
    reachable: HashMap<(NodeId, NodeId), bool>,
}

impl Mutations {
    pub(crate) fn new(source: Arc<dyn MutationSource>) -> Self {
        Self {
            source,
            infos: HashMap::new(),
            canonical: HashMap::new(),
            reachable: HashMap::new(),
        }
    }

    /// Record that `consumer` uses the outputs of `producer`.
    pub(crate) fn link_consumer(&mut self, consumer: NodeId, producer: NodeId) {
        self.infos.entry(producer).or_default().consuming.insert(consumer);
        self.infos
            .entry(consumer)
            .or_default()
            .consumes_output_of
            .insert(producer);
    }

    pub(crate) fn track(&mut self, node: NodeId) {
        self.infos.entry(node).or_default();
    }

    /// Resolve the declared paths of `node` once.
    ///
    /// Fails when destroyables are combined with outputs, inputs or local
    /// state.
    pub(crate) fn resolve(&mut self, nodes: &NodeFactory, node: NodeId) -> Result<()> {
        if self.infos.get(&node).is_some_and(|info| info.resolved) {
            return Ok(());
        }

        let work = nodes[node].work();
        let declared = match work {
            WorkRef::Task(task) => self.source.mutations_of(task)?,
            WorkRef::Included(_) => DeclaredMutations::default(),
        };

        let output_paths: BTreeSet<PathBuf> = declared
            .outputs
            .iter()
            .chain(declared.local_state.iter())
            .map(|p| self.canonicalize(p))
            .collect();
        let destroyable_paths: BTreeSet<PathBuf> = declared
            .destroyables
            .iter()
            .map(|p| self.canonicalize(p))
            .collect();

        let info = self.infos.entry(node).or_default();
        info.output_paths = output_paths;
        info.destroyable_paths = destroyable_paths;
        info.has_file_inputs = declared.has_file_inputs;
        info.has_outputs = declared.has_outputs;
        info.has_local_state = !declared.local_state.is_empty();
        info.resolved = true;

        trace!(
            task = %work,
            outputs = info.output_paths.len(),
            destroyables = info.destroyable_paths.len(),
            "resolved mutations"
        );

        if !info.destroyable_paths.is_empty() {
            let conflict = if info.has_outputs {
                Some("outputs")
            } else if info.has_file_inputs {
                Some("inputs")
            } else if info.has_local_state {
                Some("local state")
            } else {
                None
            };
            if let Some(kind) = conflict {
                return Err(PlanError::InvalidMutations {
                    task: work.clone(),
                    reason: format!(
                        "has both {kind} and destroyables defined. A task can define either {kind} or destroyables, but not both."
                    ),
                });
            }
        }
        Ok(())
    }

    /// Whether `node` may start next to the `running` nodes.
    pub(crate) fn can_run_with(
        &mut self,
        nodes: &NodeFactory,
        node: NodeId,
        running: &HashSet<NodeId>,
    ) -> bool {
        let Some(info) = self.infos.get(&node) else {
            return true;
        };

        if !running.is_empty() {
            let candidate = if !info.output_paths.is_empty() {
                &info.output_paths
            } else {
                &info.destroyable_paths
            };
            if !candidate.is_empty() {
                let clash = running.iter().filter_map(|r| self.infos.get(r)).any(|other| {
                    has_overlap(
                        candidate,
                        other.output_paths.iter().chain(other.destroyable_paths.iter()),
                    )
                });
                if clash {
                    return false;
                }
            }
        }

        if info.destroyable_paths.is_empty() {
            return true;
        }
        let destroyables = info.destroyable_paths.clone();
        !self.destroys_unconsumed_output(nodes, node, &destroyables)
    }

    /// A destroyer must wait while a finished producer's output under its
    /// paths is still needed by a consumer that is not ordered after it.
    fn destroys_unconsumed_output(
        &mut self,
        nodes: &NodeFactory,
        destroyer: NodeId,
        destroyables: &BTreeSet<PathBuf>,
    ) -> bool {
        let mut consumers: Vec<NodeId> = Vec::new();
        for (&producer, info) in &self.infos {
            if !nodes[producer].is_complete() || info.consuming.is_empty() {
                continue;
            }
            if !has_overlap(destroyables, info.output_paths.iter()) {
                continue;
            }
            consumers.extend(
                info.consuming
                    .iter()
                    .copied()
                    .filter(|c| !nodes[*c].is_complete()),
            );
        }
        consumers.sort();
        consumers.dedup();

        consumers
            .into_iter()
            .any(|consumer| !self.consumer_depends_on_destroyer(nodes, consumer, destroyer))
    }

    fn consumer_depends_on_destroyer(
        &mut self,
        nodes: &NodeFactory,
        consumer: NodeId,
        destroyer: NodeId,
    ) -> bool {
        if consumer == destroyer {
            return true;
        }
        if let Some(&known) = self.reachable.get(&(consumer, destroyer)) {
            return known;
        }

        let mut reachable = false;
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut stack = vec![consumer];
        'walk: while let Some(current) = stack.pop() {
            for successor in nodes[current].all_successors() {
                if nodes[successor].is_complete() {
                    continue;
                }
                if successor == destroyer {
                    reachable = true;
                    break 'walk;
                }
                if seen.insert(successor) {
                    stack.push(successor);
                }
            }
        }

        self.reachable.insert((consumer, destroyer), reachable);
        reachable
    }

    /// Drop what is no longer needed once `node` is done.
    pub(crate) fn record_completed(&mut self, nodes: &NodeFactory, node: NodeId) {
        let producers: Vec<NodeId> = self
            .infos
            .get(&node)
            .map(|info| info.consumes_output_of.iter().copied().collect())
            .unwrap_or_default();

        for producer in producers {
            let removable = match self.infos.get_mut(&producer) {
                Some(info) => info.consuming.remove(&node) && can_remove(nodes, producer, info),
                None => false,
            };
            if removable {
                self.infos.remove(&producer);
            }
        }

        if self
            .infos
            .get(&node)
            .is_some_and(|info| can_remove(nodes, node, info))
        {
            self.infos.remove(&node);
        }
    }

    fn canonicalize(&mut self, path: &Path) -> PathBuf {
        if let Some(found) = self.canonical.get(path) {
            return found.clone();
        }
        let resolved = canonical_path(path);
        self.canonical.insert(path.to_path_buf(), resolved.clone());
        resolved
    }

    pub(crate) fn clear(&mut self) {
        self.infos.clear();
        self.canonical.clear();
        self.reachable.clear();
    }
}

fn can_remove(nodes: &NodeFactory, node: NodeId, info: &MutationInfo) -> bool {
    nodes[node].is_complete() && info.consuming.is_empty()
}

fn has_overlap<'a>(paths: &BTreeSet<PathBuf>, others: impl Iterator<Item = &'a PathBuf> + Clone) -> bool {
    paths
        .iter()
        .any(|path| others.clone().any(|other| paths_overlap(path, other)))
}

/// Equal, or one is an ancestor directory of the other.
pub fn paths_overlap(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

/// Absolute, lexically normalised path with symlinks resolved for the part
/// that exists on disk.
pub fn canonical_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };
    let normalized = normalize(&absolute);

    let mut existing = normalized.clone();
    let mut missing = Vec::new();
    loop {
        if let Ok(resolved) = fs::canonicalize(&existing) {
            let mut out = resolved;
            for part in missing.iter().rev() {
                out.push(part);
            }
            return out;
        }
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) => {
                missing.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => return normalized,
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
