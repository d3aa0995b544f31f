use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use buildplan::exec::{CancellationToken, TaskContext, TaskExecutor, TaskOutcome};
use buildplan::plan::mutations::paths_overlap;
use buildplan::types::WorkRef;
use parking_lot::Mutex;

/// What the fake should do when a given task runs.
#[derive(Debug, Clone)]
enum Behaviour {
    Fail,
    Error,
    Panic,
    Skip,
    Cancel(CancellationToken),
    WithoutProjectLock(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started(String),
    Finished(String),
}

#[derive(Default)]
struct Log {
    events: Vec<Event>,
    running: BTreeSet<String>,
    max_concurrency: usize,
    overlaps: Vec<(String, String)>,
}

/// A fake executor that:
/// - records start/finish events per task (rendered path)
/// - tracks which tasks run at the same time, flagging overlapping outputs
/// - can be told to fail, error, panic, skip, sleep or cancel per task.
#[derive(Default)]
pub struct RecordingExecutor {
    behaviours: HashMap<String, Behaviour>,
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    outputs: HashMap<String, Vec<PathBuf>>,
    log: Mutex<Log>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a failure for `task` (policy-controlled).
    pub fn failing(mut self, task: &str) -> Self {
        self.behaviours.insert(task.to_string(), Behaviour::Fail);
        self
    }

    /// Return an error from `task` (always fatal).
    pub fn erroring(mut self, task: &str) -> Self {
        self.behaviours.insert(task.to_string(), Behaviour::Error);
        self
    }

    pub fn panicking(mut self, task: &str) -> Self {
        self.behaviours.insert(task.to_string(), Behaviour::Panic);
        self
    }

    pub fn skipping(mut self, task: &str) -> Self {
        self.behaviours.insert(task.to_string(), Behaviour::Skip);
        self
    }

    /// Cancel `token` while `task` runs.
    pub fn cancelling(mut self, task: &str, token: &CancellationToken) -> Self {
        self.behaviours
            .insert(task.to_string(), Behaviour::Cancel(token.clone()));
        self
    }

    /// Sleep for `delay` with the project lock released.
    pub fn without_project_lock(mut self, task: &str, delay: Duration) -> Self {
        self.behaviours
            .insert(task.to_string(), Behaviour::WithoutProjectLock(delay));
        self
    }

    pub fn sleeping(mut self, task: &str, delay: Duration) -> Self {
        self.delays.insert(task.to_string(), delay);
        self
    }

    /// Sleep this long in every task without a specific delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Declare the output paths of `task` for overlap tracking.
    pub fn with_outputs(mut self, task: &str, paths: &[&str]) -> Self {
        self.outputs.insert(
            task.to_string(),
            paths.iter().map(PathBuf::from).collect(),
        );
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.log.lock().events.clone()
    }

    /// Tasks in the order they started.
    pub fn started(&self) -> Vec<String> {
        self.log
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                Event::Started(task) => Some(task.clone()),
                Event::Finished(_) => None,
            })
            .collect()
    }

    /// Tasks in the order they finished.
    pub fn finished(&self) -> Vec<String> {
        self.log
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                Event::Finished(task) => Some(task.clone()),
                Event::Started(_) => None,
            })
            .collect()
    }

    pub fn ran(&self, task: &str) -> bool {
        self.started().iter().any(|t| t == task)
    }

    pub fn max_concurrency(&self) -> usize {
        self.log.lock().max_concurrency
    }

    /// Pairs of tasks with overlapping outputs that ran at the same time.
    pub fn overlaps(&self) -> Vec<(String, String)> {
        self.log.lock().overlaps.clone()
    }

    /// Whether `a` and `b` were running at the same time.
    pub fn ran_concurrently(&self, a: &str, b: &str) -> bool {
        let events = self.events();
        let position = |event: Event| events.iter().position(|e| *e == event);
        match (
            position(Event::Started(a.to_string())),
            position(Event::Finished(a.to_string())),
            position(Event::Started(b.to_string())),
            position(Event::Finished(b.to_string())),
        ) {
            (Some(start_a), Some(end_a), Some(start_b), Some(end_b)) => {
                start_a < end_b && start_b < end_a
            }
            _ => false,
        }
    }

    fn start(&self, task: &str) {
        let mut log = self.log.lock();
        let mine = self.outputs.get(task);
        let mut overlaps = Vec::new();
        if let Some(mine) = mine {
            for other in log.running.iter() {
                let Some(theirs) = self.outputs.get(other) else {
                    continue;
                };
                let clash = mine
                    .iter()
                    .any(|a| theirs.iter().any(|b| paths_overlap(a, b)));
                if clash {
                    overlaps.push((other.clone(), task.to_string()));
                }
            }
        }
        log.overlaps.extend(overlaps);
        log.running.insert(task.to_string());
        log.max_concurrency = log.max_concurrency.max(log.running.len());
        log.events.push(Event::Started(task.to_string()));
    }

    fn finish(&self, task: &str) {
        let mut log = self.log.lock();
        log.running.remove(task);
        log.events.push(Event::Finished(task.to_string()));
    }
}

impl TaskExecutor for RecordingExecutor {
    fn execute(&self, work: &WorkRef, context: &TaskContext<'_>) -> anyhow::Result<TaskOutcome> {
        let task = work.to_string();
        self.start(&task);

        let delay = self
            .delays
            .get(&task)
            .copied()
            .unwrap_or(self.default_delay);
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let behaviour = self.behaviours.get(&task).cloned();
        if let Some(Behaviour::WithoutProjectLock(delay)) = &behaviour {
            context.without_project_lock(|| thread::sleep(*delay));
        }
        if let Some(Behaviour::Cancel(token)) = &behaviour {
            token.cancel();
        }

        self.finish(&task);

        match behaviour {
            Some(Behaviour::Fail) => Ok(TaskOutcome::Failed(anyhow!("{task} reported a failure"))),
            Some(Behaviour::Error) => Err(anyhow!("{task} could not be executed")),
            Some(Behaviour::Panic) => panic!("{task} panicked"),
            Some(Behaviour::Skip) => Ok(TaskOutcome::Skipped),
            _ => Ok(TaskOutcome::Success),
        }
    }
}
