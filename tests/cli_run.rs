// tests/cli_run.rs
#![cfg(unix)]

mod common;
use crate::common::init_tracing;

use std::error::Error;
use std::fs;
use std::path::Path;

use clap::Parser;
use tempfile::TempDir;

use buildplan::cli::CliArgs;
use buildplan::config::DEFAULT_BUILD_FILE;

type TestResult = Result<(), Box<dyn Error>>;

fn args(build_file: &Path, extra: &[&str]) -> CliArgs {
    let mut argv = vec![
        "buildplan".to_string(),
        "--build-file".to_string(),
        build_file.display().to_string(),
    ];
    argv.extend(extra.iter().map(|s| s.to_string()));
    CliArgs::try_parse_from(argv).expect("valid arguments")
}

fn write_build(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(DEFAULT_BUILD_FILE);
    fs::write(&path, contents).expect("write build file");
    path
}

#[test]
fn runs_commands_in_dependency_order() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let build_file = write_build(
        &dir,
        r#"
[build]
default_tasks = ["package"]

[task.compile]
cmd = "echo compiled > compile.txt"

[task.package]
cmd = "cat compile.txt > package.txt"
depends_on = ["compile"]
"#,
    );

    buildplan::run(args(&build_file, &["--max-workers", "2"]))?;

    assert_eq!(fs::read_to_string(dir.path().join("package.txt"))?.trim(), "compiled");
    Ok(())
}

#[test]
fn commands_run_in_the_task_directory() -> TestResult {
    let dir = TempDir::new()?;
    fs::create_dir(dir.path().join("app"))?;
    let build_file = write_build(
        &dir,
        r#"
[task."app:touch"]
cmd = "touch marker"
dir = "app"
"#,
    );

    buildplan::run(args(&build_file, &["app:touch"]))?;

    assert!(dir.path().join("app").join("marker").exists());
    Ok(())
}

#[test]
fn failing_command_fails_the_run() -> TestResult {
    let dir = TempDir::new()?;
    let build_file = write_build(
        &dir,
        r#"
[task.broken]
cmd = "exit 2"

[task.after]
cmd = "touch after"
depends_on = ["broken"]
"#,
    );

    let err = match buildplan::run(args(&build_file, &["after"])) {
        Err(err) => err,
        Ok(()) => panic!("expected the run to fail"),
    };

    assert!(err.to_string().contains("Execution failed for task ':broken'"));
    assert!(!dir.path().join("after").exists());
    Ok(())
}

#[test]
fn dry_run_executes_nothing() -> TestResult {
    let dir = TempDir::new()?;
    let build_file = write_build(
        &dir,
        r#"
[task.make]
cmd = "touch made"
"#,
    );

    buildplan::run(args(&build_file, &["make", "--dry-run"]))?;

    assert!(!dir.path().join("made").exists());
    Ok(())
}

#[test]
fn excluded_tasks_do_not_run() -> TestResult {
    let dir = TempDir::new()?;
    let build_file = write_build(
        &dir,
        r#"
[task.slow_check]
cmd = "touch checked"

[task.build]
cmd = "touch built"
depends_on = ["slow_check"]
"#,
    );

    buildplan::run(args(&build_file, &["build", "-x", ":slow_check"]))?;

    assert!(dir.path().join("built").exists());
    assert!(!dir.path().join("checked").exists());
    Ok(())
}

#[test]
fn unknown_requested_task_is_an_error() -> TestResult {
    let dir = TempDir::new()?;
    let build_file = write_build(
        &dir,
        r#"
[task.real]
cmd = "true"
"#,
    );

    let err = match buildplan::run(args(&build_file, &["imaginary"])) {
        Err(err) => err,
        Ok(()) => panic!("expected an unknown task error"),
    };
    assert!(err.to_string().contains("Task not found: imaginary"));
    Ok(())
}
