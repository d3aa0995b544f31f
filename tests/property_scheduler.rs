// tests/property_scheduler.rs

mod common;
use crate::common::builders::{BuildFileBuilder, TaskConfigBuilder};
use crate::common::recording::{Event, RecordingExecutor};
use crate::common::{plan_for, plan_order};

use std::collections::BTreeSet;
use std::time::Duration;

use buildplan::config::ConfigFile;
use buildplan::exec::{CancellationToken, PlanExecutor};
use proptest::prelude::*;

const PROJECTS: [&str; 3] = ["alpha", "beta", "gamma"];
const OUTPUTS: [&str; 4] = ["out", "out/a", "out/b", "other"];

/// One generated task: its dependencies (indices below its own), soft
/// ordering hints (any index), project and output.
#[derive(Debug, Clone)]
struct GenTask {
    deps: BTreeSet<usize>,
    should: BTreeSet<usize>,
    project: usize,
    output: Option<usize>,
}

fn name(tasks: &[GenTask], index: usize) -> String {
    format!(":{}:task_{index}", PROJECTS[tasks[index].project])
}

// Acyclic by construction: task N only depends on tasks 0..N-1.
// Should-run-after hints go in any direction and may form cycles.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<GenTask>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            (
                proptest::collection::vec(any::<usize>(), 0..3),
                proptest::collection::vec(any::<usize>(), 0..2),
                0..PROJECTS.len(),
                proptest::option::of(0..OUTPUTS.len()),
            ),
            num_tasks,
        )
        .prop_map(move |raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, (deps, should, project, output))| GenTask {
                    deps: if i == 0 {
                        BTreeSet::new()
                    } else {
                        deps.into_iter().map(|d| d % i).collect()
                    },
                    should: should
                        .into_iter()
                        .map(|s| s % num_tasks)
                        .filter(|s| *s != i)
                        .collect(),
                    project,
                    output,
                })
                .collect()
        })
    })
}

fn config_for(tasks: &[GenTask]) -> ConfigFile {
    let mut builder = BuildFileBuilder::new();
    for (i, task) in tasks.iter().enumerate() {
        let mut config = TaskConfigBuilder::new().cmd("true");
        for dep in &task.deps {
            config = config.depends_on(&name(tasks, *dep));
        }
        for other in &task.should {
            config = config.should_run_after(&name(tasks, *other));
        }
        if let Some(output) = task.output {
            config = config.output(OUTPUTS[output]);
        }
        builder = builder.with_task(&name(tasks, i), config.build());
    }
    builder.build()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn plan_respects_every_dependency(tasks in dag_strategy(12)) {
        let names: Vec<String> = (0..tasks.len()).map(|i| name(&tasks, i)).collect();
        let requested: Vec<&str> = names.iter().map(String::as_str).collect();

        let plan = plan_for(config_for(&tasks), &requested).expect("acyclic graphs always plan");
        let order = plan_order(&plan);

        prop_assert_eq!(order.len(), tasks.len());
        let position = |n: &str| order.iter().position(|o| o == n);
        for (i, task) in tasks.iter().enumerate() {
            for dep in &task.deps {
                prop_assert!(
                    position(&names[*dep]) < position(&names[i]),
                    "{} planned before its dependency {}", names[i], names[*dep]
                );
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn concurrent_runs_respect_dependencies_and_outputs(
        tasks in dag_strategy(8),
        workers in 1usize..4,
    ) {
        let names: Vec<String> = (0..tasks.len()).map(|i| name(&tasks, i)).collect();
        let requested: Vec<&str> = names.iter().map(String::as_str).collect();

        let mut recorder = RecordingExecutor::new().with_delay(Duration::from_millis(2));
        for (i, task) in tasks.iter().enumerate() {
            if let Some(output) = task.output {
                recorder = recorder.with_outputs(&names[i], &[OUTPUTS[output]]);
            }
        }

        let plan = plan_for(config_for(&tasks), &requested).expect("acyclic graphs always plan");
        let outcome = PlanExecutor::new(workers, CancellationToken::new()).process(plan, &recorder);

        prop_assert!(outcome.result.is_ok());
        prop_assert!(recorder.overlaps().is_empty(), "overlapping outputs ran together: {:?}", recorder.overlaps());
        prop_assert!(recorder.max_concurrency() <= workers);

        let events = recorder.events();
        let position = |event: Event| events.iter().position(|e| *e == event);
        for (i, task) in tasks.iter().enumerate() {
            let started = position(Event::Started(names[i].clone()));
            prop_assert!(started.is_some());
            for dep in &task.deps {
                let finished = position(Event::Finished(names[*dep].clone()));
                prop_assert!(finished.is_some() && finished < started);
            }
        }
    }
}
