// tests/config_loading.rs

mod common;
use crate::common::builders::{BuildFileBuilder, TaskConfigBuilder};

use std::error::Error;
use std::fs;
use std::io::Write;

use tempfile::{NamedTempFile, TempDir};

use buildplan::config::{load_and_validate, BuildDefinition, ConfigFile, DEFAULT_BUILD_FILE};
use buildplan::errors::PlanError;
use buildplan::graph::DependencySource;
use buildplan::types::{TaskId, WorkRef};

type TestResult = Result<(), Box<dyn Error>>;

fn write_build_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

fn config_error(contents: &str) -> String {
    match load_and_validate(write_build_file(contents).path()) {
        Err(PlanError::Config(msg)) => msg,
        Err(other) => panic!("expected a configuration error, got {other}"),
        Ok(_) => panic!("expected a configuration error"),
    }
}

#[test]
fn loads_a_complete_build_file() -> TestResult {
    let file = write_build_file(
        r#"
[build]
max_workers = 3
continue_on_failure = true
default_tasks = ["build"]

[included_build.tools]
path = "tools"

[task.build]
depends_on = ["app:compile"]

[task."app:generate"]
cmd = "./gen.sh"

[task."app:compile"]
cmd = "cc -c main.c"
dir = "app"
depends_on = ["generate", "@tools:gen"]
should_run_after = [":lint"]
finalized_by = [":report"]
inputs = ["app/src"]
outputs = ["app/out"]

[task.lint]
cmd = "lint"

[task.report]
cmd = "report"
"#,
    );

    let cfg = load_and_validate(file.path())?;

    assert_eq!(cfg.build.max_workers, Some(3));
    assert!(cfg.build.continue_on_failure);
    assert_eq!(cfg.task.len(), 5);
    assert!(cfg.task.contains_key(&TaskId::parse(":app:compile")?));
    assert!(cfg.included_build.contains_key("tools"));
    Ok(())
}

#[test]
fn duplicate_task_paths_are_rejected() {
    let msg = config_error(
        r#"
[task.compile]
[task.":compile"]
"#,
    );
    assert!(msg.contains("declared more than once"));
}

#[test]
fn unknown_dependency_is_rejected() {
    let msg = config_error(
        r#"
[task.A]
depends_on = ["missing"]
"#,
    );
    assert!(msg.contains("unknown task ':missing'"));
}

#[test]
fn bare_reference_resolves_in_the_owning_project() {
    // `compile` inside `app` means `:app:compile`, which is not declared.
    let msg = config_error(
        r#"
[task.compile]
[task."app:build"]
depends_on = ["compile"]
"#,
    );
    assert!(msg.contains("':app:compile'"));
}

#[test]
fn self_reference_is_rejected() {
    let msg = config_error(
        r#"
[task.A]
must_run_after = ["A"]
"#,
    );
    assert!(msg.contains("cannot reference itself"));
}

#[test]
fn included_tasks_only_in_depends_on() {
    let msg = config_error(
        r#"
[included_build.tools]
path = "tools"

[task.A]
must_run_after = ["@tools:gen"]
"#,
    );
    assert!(msg.contains("only appear in `depends_on`"));
}

#[test]
fn unknown_included_build_is_rejected() {
    let msg = config_error(
        r#"
[task.A]
depends_on = ["@nowhere:gen"]
"#,
    );
    assert!(msg.contains("unknown included build 'nowhere'"));
}

#[test]
fn zero_workers_is_rejected() {
    let msg = config_error(
        r#"
[build]
max_workers = 0

[task.A]
"#,
    );
    assert!(msg.contains("max_workers"));
}

#[test]
fn empty_build_file_is_rejected() {
    let msg = config_error("");
    assert!(msg.contains("at least one"));
}

#[test]
fn unknown_default_task_is_rejected() {
    let msg = config_error(
        r#"
[build]
default_tasks = ["nope"]

[task.A]
"#,
    );
    assert!(msg.contains("default_tasks"));
}

#[test]
fn ordering_cycles_are_left_to_the_planner() {
    let cfg = BuildFileBuilder::new()
        .with_task("A", TaskConfigBuilder::new().depends_on("B").build())
        .with_task("B", TaskConfigBuilder::new().depends_on("A").build())
        .raw();

    assert!(ConfigFile::try_from(cfg).is_ok());
}

#[test]
fn invalid_toml_is_a_parse_error() {
    let file = write_build_file("[task.A\ncmd = ");
    assert!(matches!(load_and_validate(file.path()), Err(PlanError::Toml(_))));
}

#[test]
fn missing_file_is_an_io_error() -> TestResult {
    let dir = TempDir::new()?;
    let result = load_and_validate(dir.path().join(DEFAULT_BUILD_FILE));
    assert!(matches!(result, Err(PlanError::Io(_))));
    Ok(())
}

#[test]
fn definition_is_rooted_at_the_build_file_directory() -> TestResult {
    let dir = TempDir::new()?;
    let path = dir.path().join(DEFAULT_BUILD_FILE);
    fs::write(
        &path,
        r#"
[included_build.tools]
path = "tools"

[task."app:compile"]
cmd = "make"
dir = "app"
depends_on = ["@tools:gen"]
"#,
    )?;

    let definition = BuildDefinition::load(&path)?;
    let compile = TaskId::parse("app:compile")?;

    assert_eq!(definition.root(), dir.path());
    assert_eq!(definition.command_of(&compile).map(|c| c.dir), Some(dir.path().join("app")));
    assert_eq!(
        definition.included_build_file("tools"),
        Some(dir.path().join("tools").join(DEFAULT_BUILD_FILE))
    );
    assert_eq!(
        definition.relations_of(&compile)?.depends_on,
        vec![WorkRef::parse("@tools:gen")?]
    );
    Ok(())
}
