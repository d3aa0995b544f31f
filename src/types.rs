// src/types.rs

//! Identity types for schedulable work.
//!
//! Every node in the work graph wraps exactly one [`WorkRef`]. The natural
//! ordering of these types is what makes graph walks and tie-breaks
//! deterministic.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Colon separated project path. The root project is `:`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectPath(Arc<str>);

impl ProjectPath {
    pub fn root() -> Self {
        ProjectPath(Arc::from(":"))
    }

    /// Build a project path from its segments (`["app", "core"]` -> `:app:core`).
    pub fn from_segments<'a>(segments: impl IntoIterator<Item = &'a str>) -> Self {
        let mut path = String::new();
        for segment in segments {
            path.push(':');
            path.push_str(segment);
        }
        if path.is_empty() {
            Self::root()
        } else {
            ProjectPath(Arc::from(path))
        }
    }

    pub fn is_root(&self) -> bool {
        &*self.0 == ":"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A task owned by one project of the current build.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId {
    project: ProjectPath,
    name: Arc<str>,
}

impl TaskId {
    pub fn new(project: ProjectPath, name: impl Into<Arc<str>>) -> Self {
        Self {
            project,
            name: name.into(),
        }
    }

    /// Parse `compile`, `:compile`, `app:compile` or `:app:compile`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        let body = trimmed.strip_prefix(':').unwrap_or(trimmed);
        if body.is_empty() {
            return Err(format!("invalid task path '{raw}': empty"));
        }

        let segments: Vec<&str> = body.split(':').collect();
        if segments.iter().any(|s| s.trim().is_empty()) {
            return Err(format!("invalid task path '{raw}': empty path segment"));
        }

        let (name, project) = match segments.split_last() {
            Some((name, project)) => (*name, project),
            None => return Err(format!("invalid task path '{raw}'")),
        };

        Ok(Self::new(
            ProjectPath::from_segments(project.iter().copied()),
            name,
        ))
    }

    pub fn project(&self) -> &ProjectPath {
        &self.project
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Ord for TaskId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.project
            .cmp(&other.project)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for TaskId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.project.is_root() {
            write!(f, ":{}", self.name)
        } else {
            write!(f, "{}:{}", self.project, self.name)
        }
    }
}

impl FromStr for TaskId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskId::parse(s)
    }
}

/// A task that lives in an included build and is delegated to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IncludedTask {
    build: Arc<str>,
    task: TaskId,
}

impl IncludedTask {
    pub fn new(build: impl Into<Arc<str>>, task: TaskId) -> Self {
        Self {
            build: build.into(),
            task,
        }
    }

    /// Parse `@tools:gen` (build `tools`, task `:gen`).
    pub fn parse(raw: &str) -> Result<Self, String> {
        let body = raw
            .trim()
            .strip_prefix('@')
            .ok_or_else(|| format!("invalid included task '{raw}': expected '@<build>:<task>'"))?;
        let (build, task) = body
            .split_once(':')
            .ok_or_else(|| format!("invalid included task '{raw}': missing task path"))?;
        if build.is_empty() {
            return Err(format!("invalid included task '{raw}': empty build name"));
        }
        Ok(Self::new(build, TaskId::parse(task)?))
    }

    pub fn build(&self) -> &str {
        &self.build
    }

    pub fn task(&self) -> &TaskId {
        &self.task
    }
}

impl fmt::Display for IncludedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}{}", self.build, self.task)
    }
}

/// The unit of work wrapped by a graph node.
///
/// Local tasks are partitioned by project, resolve their declared relations
/// and are subject to the task filter. Included tasks are delegated to
/// another build and carry none of that.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkRef {
    Task(TaskId),
    Included(IncludedTask),
}

impl WorkRef {
    /// Parse either a local task path or an `@build:task` reference.
    pub fn parse(raw: &str) -> Result<Self, String> {
        if raw.trim_start().starts_with('@') {
            IncludedTask::parse(raw).map(WorkRef::Included)
        } else {
            TaskId::parse(raw).map(WorkRef::Task)
        }
    }

    /// Partition used for mutual exclusion, if any.
    pub fn project(&self) -> Option<&ProjectPath> {
        match self {
            WorkRef::Task(task) => Some(task.project()),
            WorkRef::Included(_) => None,
        }
    }

    /// Adds the local task (if any) to `into`. Delegated work is reported by
    /// the build that owns it.
    pub fn collect_task_into(&self, into: &mut Vec<TaskId>) {
        if let WorkRef::Task(task) = self {
            into.push(task.clone());
        }
    }
}

impl From<TaskId> for WorkRef {
    fn from(task: TaskId) -> Self {
        WorkRef::Task(task)
    }
}

impl From<IncludedTask> for WorkRef {
    fn from(task: IncludedTask) -> Self {
        WorkRef::Included(task)
    }
}

impl fmt::Display for WorkRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkRef::Task(task) => task.fmt(f),
            WorkRef::Included(task) => task.fmt(f),
        }
    }
}
