// src/exec/shell.rs

//! Shell-backed task executor used by the CLI.

use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info};

use crate::config::BuildDefinition;
use crate::exec::backend::{TaskContext, TaskExecutor, TaskOutcome};
use crate::types::{IncludedTask, TaskId, WorkRef};

/// Runs each task's `cmd` through the platform shell in the task's
/// directory. Included-build work re-invokes the current executable
/// against the included build file.
#[derive(Debug, Clone)]
pub struct ShellTaskExecutor {
    definition: Arc<BuildDefinition>,
}

impl ShellTaskExecutor {
    pub fn new(definition: Arc<BuildDefinition>) -> Self {
        Self { definition }
    }

    fn run_task(&self, task: &TaskId) -> Result<TaskOutcome> {
        let command = self
            .definition
            .command_of(task)
            .ok_or_else(|| anyhow!("task '{task}' is not declared in the build file"))?;

        let Some(cmd) = command.cmd else {
            debug!(task = %task, "no command; nothing to run");
            return Ok(TaskOutcome::Success);
        };

        let mut process = shell_command(&cmd);
        process.current_dir(&command.dir);
        info!(task = %task, cmd = %cmd, dir = %command.dir.display(), "starting task process");
        run_process(&task.to_string(), process)
    }

    fn run_included(&self, included: &IncludedTask) -> Result<TaskOutcome> {
        let build = included.build();
        let build_file = self
            .definition
            .included_build_file(build)
            .ok_or_else(|| anyhow!("included build '{build}' is not declared"))?;
        let dir = self
            .definition
            .included_build_dir(build)
            .ok_or_else(|| anyhow!("included build '{build}' is not declared"))?;
        let exe = std::env::current_exe().context("locating the current executable")?;

        let mut process = Command::new(exe);
        process
            .arg("--build-file")
            .arg(&build_file)
            .arg(included.task().to_string())
            .current_dir(dir);
        info!(task = %included, build_file = %build_file.display(), "delegating to included build");
        run_process(&included.to_string(), process)
    }
}

impl TaskExecutor for ShellTaskExecutor {
    fn execute(&self, work: &WorkRef, _context: &TaskContext<'_>) -> Result<TaskOutcome> {
        match work {
            WorkRef::Task(task) => self.run_task(task),
            WorkRef::Included(included) => self.run_included(included),
        }
    }
}

/// Build a shell command appropriate for the platform.
fn shell_command(cmd: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    }
}

/// Spawn `process`, stream its output into the log and wait for it.
///
/// A non-zero exit is a reported failure; failing to spawn or wait is an
/// error.
fn run_process(name: &str, mut process: Command) -> Result<TaskOutcome> {
    process.stdout(Stdio::piped()).stderr(Stdio::piped());

    let mut child = process
        .spawn()
        .with_context(|| format!("spawning process for task '{name}'"))?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let status = thread::scope(|scope| {
        if let Some(stdout) = stdout {
            scope.spawn(move || {
                for line in lines_of(stdout) {
                    info!(task = %name, "{line}");
                }
            });
        }
        // Always consume stderr so the pipe doesn't fill up.
        if let Some(stderr) = stderr {
            scope.spawn(move || {
                for line in lines_of(stderr) {
                    debug!(task = %name, "stderr: {line}");
                }
            });
        }
        child.wait()
    })
    .with_context(|| format!("waiting for process of task '{name}'"))?;

    let code = status.code().unwrap_or(-1);
    info!(task = %name, exit_code = code, success = status.success(), "task process exited");

    if status.success() {
        Ok(TaskOutcome::Success)
    } else {
        Ok(TaskOutcome::Failed(anyhow!("process exited with code {code}")))
    }
}

fn lines_of(reader: impl Read) -> impl Iterator<Item = String> {
    BufReader::new(reader).lines().map_while(|line| line.ok())
}
