#![allow(dead_code)]

use std::path::PathBuf;

use buildplan::config::{ConfigFile, IncludedBuildConfig, RawBuildFile, TaskConfig};

/// Builder for `ConfigFile` to simplify test setup.
pub struct BuildFileBuilder {
    raw: RawBuildFile,
}

impl BuildFileBuilder {
    pub fn new() -> Self {
        Self {
            raw: RawBuildFile::default(),
        }
    }

    pub fn with_task(mut self, path: &str, task: TaskConfig) -> Self {
        self.raw.task.insert(path.to_string(), task);
        self
    }

    pub fn with_included_build(mut self, name: &str, path: &str) -> Self {
        self.raw.included_build.insert(
            name.to_string(),
            IncludedBuildConfig {
                path: PathBuf::from(path),
            },
        );
        self
    }

    pub fn max_workers(mut self, workers: usize) -> Self {
        self.raw.build.max_workers = Some(workers);
        self
    }

    pub fn continue_on_failure(mut self, val: bool) -> Self {
        self.raw.build.continue_on_failure = val;
        self
    }

    pub fn default_task(mut self, task: &str) -> Self {
        self.raw.build.default_tasks.push(task.to_string());
        self
    }

    /// The unvalidated file, for validation tests.
    pub fn raw(self) -> RawBuildFile {
        self.raw
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.raw).expect("Failed to build valid config from builder")
    }
}

impl Default for BuildFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`. Without `cmd` the task is a lifecycle task.
#[derive(Default)]
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cmd(mut self, cmd: &str) -> Self {
        self.task.cmd = Some(cmd.to_string());
        self
    }

    pub fn dir(mut self, dir: &str) -> Self {
        self.task.dir = Some(PathBuf::from(dir));
        self
    }

    pub fn depends_on(mut self, dep: &str) -> Self {
        self.task.depends_on.push(dep.to_string());
        self
    }

    pub fn must_run_after(mut self, other: &str) -> Self {
        self.task.must_run_after.push(other.to_string());
        self
    }

    pub fn should_run_after(mut self, other: &str) -> Self {
        self.task.should_run_after.push(other.to_string());
        self
    }

    pub fn finalized_by(mut self, finalizer: &str) -> Self {
        self.task.finalized_by.push(finalizer.to_string());
        self
    }

    pub fn input(mut self, path: &str) -> Self {
        self.task.inputs.push(PathBuf::from(path));
        self
    }

    pub fn output(mut self, path: &str) -> Self {
        self.task.outputs.push(PathBuf::from(path));
        self
    }

    pub fn local_state(mut self, path: &str) -> Self {
        self.task.local_state.push(PathBuf::from(path));
        self
    }

    pub fn destroys(mut self, path: &str) -> Self {
        self.task.destroys.push(PathBuf::from(path));
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
