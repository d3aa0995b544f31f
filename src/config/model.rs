// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::types::TaskId;

/// Build file as read from TOML, before validation.
///
/// ```toml
/// [build]
/// max_workers = 4
/// continue_on_failure = false
/// default_tasks = ["build"]
///
/// [included_build.tools]
/// path = "tools"
///
/// [task."app:compile"]
/// cmd = "cc -c src/main.c -o out/main.o"
/// depends_on = ["app:generate", "@tools:gen"]
/// outputs = ["out"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBuildFile {
    #[serde(default)]
    pub build: BuildSection,

    #[serde(default)]
    pub included_build: BTreeMap<String, IncludedBuildConfig>,

    /// Keys are task paths as written (`compile`, `:compile`, `app:compile`).
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// `[build]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildSection {
    /// Worker threads; defaults to the available parallelism.
    #[serde(default)]
    pub max_workers: Option<usize>,

    /// Keep running independent work after a task fails.
    #[serde(default)]
    pub continue_on_failure: bool,

    /// Tasks to run when none are given on the command line.
    #[serde(default)]
    pub default_tasks: Vec<String>,
}

/// `[included_build.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct IncludedBuildConfig {
    /// Directory holding the included build's own build file.
    pub path: PathBuf,
}

/// `[task."<path>"]` section.
///
/// References in the relation lists are either absolute task paths
/// (anything containing a `:`), bare names resolved in the task's own
/// project, or `@build:task` references to an included build
/// (`depends_on` only).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskConfig {
    /// Shell command. Tasks without one only aggregate their dependencies.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Working directory relative to the build root.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(default)]
    pub must_run_after: Vec<String>,

    #[serde(default)]
    pub should_run_after: Vec<String>,

    #[serde(default)]
    pub finalized_by: Vec<String>,

    #[serde(default)]
    pub inputs: Vec<PathBuf>,

    #[serde(default)]
    pub outputs: Vec<PathBuf>,

    #[serde(default)]
    pub local_state: Vec<PathBuf>,

    #[serde(default)]
    pub destroys: Vec<PathBuf>,
}

/// A validated build file: task keys are normalised and every reference
/// points at something declared.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub build: BuildSection,
    pub included_build: BTreeMap<String, IncludedBuildConfig>,
    pub task: BTreeMap<TaskId, TaskConfig>,
}

impl ConfigFile {
    /// Only for callers that already validated the parts.
    pub(crate) fn new_unchecked(
        build: BuildSection,
        included_build: BTreeMap<String, IncludedBuildConfig>,
        task: BTreeMap<TaskId, TaskConfig>,
    ) -> Self {
        Self {
            build,
            included_build,
            task,
        }
    }
}
