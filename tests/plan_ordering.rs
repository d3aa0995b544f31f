// tests/plan_ordering.rs

mod common;
use crate::common::builders::{BuildFileBuilder, TaskConfigBuilder};
use crate::common::{init_tracing, plan_for, plan_order, plan_with, state};

use std::error::Error;

use buildplan::errors::PlanError;
use buildplan::graph::{NodeState, TaskFilter};
use buildplan::types::TaskId;

type TestResult = Result<(), Box<dyn Error>>;

fn task() -> TaskConfigBuilder {
    TaskConfigBuilder::new().cmd("true")
}

#[test]
fn dependency_chain_runs_deepest_first() -> TestResult {
    init_tracing();
    let config = BuildFileBuilder::new()
        .with_task("A", task().depends_on("B").build())
        .with_task("B", task().depends_on("C").build())
        .with_task("C", task().build())
        .build();

    let plan = plan_for(config, &["A"])?;

    assert_eq!(plan_order(&plan), vec![":C", ":B", ":A"]);
    for name in [":A", ":B", ":C"] {
        assert_eq!(state(&plan, name), Some(NodeState::ShouldRun));
    }
    Ok(())
}

#[test]
fn requested_tasks_are_walked_in_natural_order() -> TestResult {
    let config = BuildFileBuilder::new()
        .with_task("zeta", task().build())
        .with_task("alpha", task().build())
        .with_task("app:mid", task().build())
        .build();

    let plan = plan_for(config, &["zeta", "app:mid", "alpha"])?;

    assert_eq!(plan_order(&plan), vec![":alpha", ":zeta", ":app:mid"]);
    Ok(())
}

#[test]
fn mutual_should_run_after_does_not_fail_the_plan() -> TestResult {
    let config = BuildFileBuilder::new()
        .with_task("X", task().should_run_after("Y").build())
        .with_task("Y", task().should_run_after("X").build())
        .build();

    let plan = plan_for(config, &["X", "Y"])?;

    let mut order = plan_order(&plan);
    order.sort();
    assert_eq!(order, vec![":X", ":Y"]);
    Ok(())
}

#[test]
fn should_run_after_yields_to_a_dependency() -> TestResult {
    let config = BuildFileBuilder::new()
        .with_task("A", task().depends_on("B").build())
        .with_task("B", task().should_run_after("A").build())
        .build();

    let plan = plan_for(config, &["A"])?;

    assert_eq!(plan_order(&plan), vec![":B", ":A"]);
    Ok(())
}

#[test]
fn should_run_after_orders_independent_tasks() -> TestResult {
    let config = BuildFileBuilder::new()
        .with_task("a", task().should_run_after("b").build())
        .with_task("b", task().build())
        .build();

    let plan = plan_for(config, &["a", "b"])?;

    assert_eq!(plan_order(&plan), vec![":b", ":a"]);
    Ok(())
}

#[test]
fn must_run_after_orders_but_does_not_pull_in() -> TestResult {
    let config = BuildFileBuilder::new()
        .with_task("deploy", task().must_run_after("test").build())
        .with_task("test", task().build())
        .build();

    let alone = plan_for(config.clone(), &["deploy"])?;
    assert_eq!(plan_order(&alone), vec![":deploy"]);

    let both = plan_for(config, &["deploy", "test"])?;
    assert_eq!(plan_order(&both), vec![":test", ":deploy"]);
    Ok(())
}

#[test]
fn dependency_cycle_is_reported_with_its_members() {
    let config = BuildFileBuilder::new()
        .with_task("A", task().depends_on("B").build())
        .with_task("B", task().depends_on("C").build())
        .with_task("C", task().depends_on("A").build())
        .with_task("D", task().build())
        .build();

    let err = match plan_for(config, &["A", "D"]) {
        Err(err) => err,
        Ok(_) => panic!("expected a circular dependency error"),
    };

    match &err {
        PlanError::CircularDependency { tasks, rendered } => {
            let members: Vec<String> = tasks.iter().map(|t| t.to_string()).collect();
            assert_eq!(members, vec![":A", ":B", ":C"]);
            assert!(rendered.starts_with(":A"));
            assert!(!rendered.contains(":D"));
        }
        other => panic!("expected a circular dependency error, got {other}"),
    }
    assert!(err.to_string().starts_with("Circular dependency between the following tasks:"));
}

#[test]
fn must_run_after_counts_as_a_hard_edge_in_cycles() {
    let config = BuildFileBuilder::new()
        .with_task("A", task().depends_on("B").build())
        .with_task("B", task().must_run_after("A").build())
        .build();

    assert!(matches!(
        plan_for(config, &["A"]),
        Err(PlanError::CircularDependency { .. })
    ));
}

#[test]
fn cycle_behind_a_finalizer_is_reported_with_its_members() {
    let config = BuildFileBuilder::new()
        .with_task("T", task().finalized_by("F").build())
        .with_task("F", task().depends_on("G").build())
        .with_task("G", task().depends_on("F").build())
        .build();

    match plan_for(config, &["T"]) {
        Err(PlanError::CircularDependency { tasks, rendered }) => {
            let members: Vec<String> = tasks.iter().map(|t| t.to_string()).collect();
            assert_eq!(members, vec![":F", ":G"]);
            assert!(rendered.starts_with(":F"));
        }
        Err(other) => panic!("expected a circular dependency error, got {other}"),
        Ok(_) => panic!("expected a circular dependency error"),
    }
}

#[test]
fn finalizer_is_planned_after_the_task_it_finalizes() -> TestResult {
    let config = BuildFileBuilder::new()
        .with_task("T", task().finalized_by("F").build())
        .with_task("F", task().build())
        .build();

    let plan = plan_for(config, &["T"])?;

    assert_eq!(plan_order(&plan), vec![":T", ":F"]);
    assert_eq!(state(&plan, ":T"), Some(NodeState::ShouldRun));
    // Runs only once the task it finalizes has run.
    assert_eq!(state(&plan, ":F"), Some(NodeState::MustNotRun));
    Ok(())
}

#[test]
fn finalizer_waits_for_its_own_dependencies() -> TestResult {
    let config = BuildFileBuilder::new()
        .with_task("T", task().finalized_by("F").build())
        .with_task("F", task().depends_on("G").build())
        .with_task("G", task().build())
        .build();

    let plan = plan_for(config, &["T"])?;

    let order = plan_order(&plan);
    let position = |name: &str| order.iter().position(|t| t == name);
    assert!(position(":T") < position(":F"));
    assert!(position(":G") < position(":F"));
    Ok(())
}

#[test]
fn excluded_tasks_are_left_out_with_their_dependencies() -> TestResult {
    let config = BuildFileBuilder::new()
        .with_task("app:build", task().depends_on("app:test").depends_on("app:compile").build())
        .with_task("app:test", task().depends_on("app:fixtures").build())
        .with_task("app:compile", task().build())
        .with_task("app:fixtures", task().build())
        .build();

    let plan = plan_with(config, &["app:build"], |plan| {
        plan.use_filter(TaskFilter::excluding([":app:test"]).expect("valid glob"));
    })?;

    assert_eq!(plan_order(&plan), vec![":app:compile", ":app:build"]);
    assert_eq!(plan.filtered_tasks(), vec![TaskId::parse("app:test")?]);
    assert_eq!(state(&plan, ":app:test"), Some(NodeState::NotRequired));
    assert_eq!(state(&plan, ":app:fixtures"), None);
    Ok(())
}

#[test]
fn dependencies_of_lists_direct_dependencies() -> TestResult {
    let config = BuildFileBuilder::new()
        .with_task("A", task().depends_on("B").depends_on("C").build())
        .with_task("B", task().depends_on("C").build())
        .with_task("C", task().build())
        .build();

    let plan = plan_for(config, &["A"])?;

    assert_eq!(
        plan.dependencies_of(&TaskId::parse("A")?)?,
        vec![TaskId::parse("B")?, TaskId::parse("C")?]
    );
    assert!(plan.dependencies_of(&TaskId::parse("C")?)?.is_empty());
    assert!(matches!(
        plan.dependencies_of(&TaskId::parse("missing")?),
        Err(PlanError::TaskNotFound(_))
    ));
    Ok(())
}

#[test]
fn included_work_is_planned_without_a_project() -> TestResult {
    let config = BuildFileBuilder::new()
        .with_included_build("tools", "tools")
        .with_task("app:compile", task().depends_on("@tools:gen").build())
        .build();

    let plan = plan_for(config, &["app:compile"])?;

    assert_eq!(plan_order(&plan), vec!["@tools:gen", ":app:compile"]);
    assert_eq!(plan.tasks(), vec![TaskId::parse("app:compile")?]);
    assert_eq!(plan.projects().map(|p| p.to_string()).collect::<Vec<_>>(), vec![":app"]);
    Ok(())
}
