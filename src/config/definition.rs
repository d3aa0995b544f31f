// src/config/definition.rs

//! A loaded build: the validated build file plus the directory it lives in.
//!
//! This is what the planner talks to when it needs the relations or the
//! declared files of a task, and what the shell executor asks for commands.

use std::path::{Path, PathBuf};

use anyhow::anyhow;

use crate::config::loader::{load_and_validate, DEFAULT_BUILD_FILE};
use crate::config::model::{ConfigFile, TaskConfig};
use crate::config::validate::resolve_reference;
use crate::errors::{PlanError, Result};
use crate::graph::{DependencySource, TaskRelations};
use crate::plan::{DeclaredMutations, MutationSource};
use crate::types::{ProjectPath, TaskId, WorkRef};

/// What to run for a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCommand {
    /// `None` for lifecycle tasks that only aggregate dependencies.
    pub cmd: Option<String>,
    pub dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct BuildDefinition {
    root: PathBuf,
    config: ConfigFile,
}

impl BuildDefinition {
    pub fn new(root: impl Into<PathBuf>, config: ConfigFile) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Load and validate the build file at `path`. The build root is the
    /// directory containing it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = load_and_validate(path)?;
        Ok(Self::new(build_root_dir(path), config))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn max_workers(&self) -> Option<usize> {
        self.config.build.max_workers
    }

    pub fn continue_on_failure(&self) -> bool {
        self.config.build.continue_on_failure
    }

    pub fn contains(&self, task: &TaskId) -> bool {
        self.config.task.contains_key(task)
    }

    pub fn command_of(&self, task: &TaskId) -> Option<TaskCommand> {
        let config = self.config.task.get(task)?;
        Some(TaskCommand {
            cmd: config.cmd.clone(),
            dir: self.task_dir(config),
        })
    }

    /// Root directory of an included build.
    pub fn included_build_dir(&self, build: &str) -> Option<PathBuf> {
        self.config
            .included_build
            .get(build)
            .map(|included| self.root.join(&included.path))
    }

    /// Build file of an included build.
    pub fn included_build_file(&self, build: &str) -> Option<PathBuf> {
        self.included_build_dir(build)
            .map(|dir| dir.join(DEFAULT_BUILD_FILE))
    }

    /// Resolve the tasks requested on the command line, falling back to
    /// `[build].default_tasks` when none are given. Bare names refer to the
    /// root project.
    pub fn resolve_requested(&self, requested: &[String]) -> Result<Vec<WorkRef>> {
        let raw: &[String] = if requested.is_empty() {
            &self.config.build.default_tasks
        } else {
            requested
        };
        if raw.is_empty() {
            return Err(PlanError::Config(
                "no tasks given and [build].default_tasks is empty".to_string(),
            ));
        }

        raw.iter()
            .map(|name| {
                let work = resolve_reference(&ProjectPath::root(), name).map_err(PlanError::Config)?;
                let known = match &work {
                    WorkRef::Task(task) => self.contains(task),
                    WorkRef::Included(task) => self.config.included_build.contains_key(task.build()),
                };
                if known {
                    Ok(work)
                } else {
                    Err(PlanError::TaskNotFound(name.clone()))
                }
            })
            .collect()
    }

    fn task(&self, task: &TaskId) -> anyhow::Result<&TaskConfig> {
        self.config
            .task
            .get(task)
            .ok_or_else(|| anyhow!("task '{task}' is not declared in the build file"))
    }

    fn task_dir(&self, config: &TaskConfig) -> PathBuf {
        match &config.dir {
            Some(dir) => self.root.join(dir),
            None => self.root.clone(),
        }
    }

    fn resolve_paths(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        paths.iter().map(|path| self.root.join(path)).collect()
    }
}

impl DependencySource for BuildDefinition {
    fn relations_of(&self, task: &TaskId) -> anyhow::Result<TaskRelations> {
        let config = self.task(task)?;
        let project = task.project();

        let mut relations = TaskRelations::default();
        for raw in &config.depends_on {
            relations.depends_on.push(resolve_reference(project, raw).map_err(anyhow::Error::msg)?);
        }
        relations.must_run_after = local_references(task, &config.must_run_after)?;
        relations.should_run_after = local_references(task, &config.should_run_after)?;
        relations.finalized_by = local_references(task, &config.finalized_by)?;
        Ok(relations)
    }
}

impl MutationSource for BuildDefinition {
    fn mutations_of(&self, task: &TaskId) -> anyhow::Result<DeclaredMutations> {
        let config = self.task(task)?;
        Ok(DeclaredMutations {
            outputs: self.resolve_paths(&config.outputs),
            local_state: self.resolve_paths(&config.local_state),
            destroyables: self.resolve_paths(&config.destroys),
            has_file_inputs: !config.inputs.is_empty(),
            has_outputs: !config.outputs.is_empty(),
        })
    }
}

fn local_references(owner: &TaskId, raw: &[String]) -> anyhow::Result<Vec<TaskId>> {
    raw.iter()
        .map(|reference| match resolve_reference(owner.project(), reference) {
            Ok(WorkRef::Task(task)) => Ok(task),
            Ok(WorkRef::Included(included)) => Err(anyhow!(
                "task '{owner}' cannot order itself against included task '{included}'"
            )),
            Err(err) => Err(anyhow!(err)),
        })
        .collect()
}

/// A bare file name (`Buildplan.toml`) means the current directory.
fn build_root_dir(build_file: &Path) -> PathBuf {
    match build_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
