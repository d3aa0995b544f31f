// src/config/validate.rs

use std::collections::BTreeMap;

use crate::config::model::{BuildSection, ConfigFile, IncludedBuildConfig, RawBuildFile, TaskConfig};
use crate::errors::{PlanError, Result};
use crate::types::{ProjectPath, TaskId, WorkRef};

impl TryFrom<RawBuildFile> for ConfigFile {
    type Error = PlanError;

    fn try_from(raw: RawBuildFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_tasks(&raw)?;
        validate_build_section(&raw.build)?;
        validate_included_builds(&raw)?;
        let tasks = normalize_task_keys(raw.task)?;
        validate_task_references(&raw.included_build, &tasks)?;
        validate_default_tasks(&raw.build, &raw.included_build, &tasks)?;
        Ok(ConfigFile::new_unchecked(raw.build, raw.included_build, tasks))
    }
}

/// Resolve a reference written inside the section of a task owned by
/// `owner`. Anything with a `:` is an absolute path, a bare name lives in
/// the owner's project and `@build:task` points into an included build.
pub(crate) fn resolve_reference(owner: &ProjectPath, raw: &str) -> std::result::Result<WorkRef, String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('@') || trimmed.contains(':') {
        return WorkRef::parse(trimmed);
    }
    if trimmed.is_empty() {
        return Err(format!("invalid task path '{raw}': empty"));
    }
    Ok(WorkRef::Task(TaskId::new(owner.clone(), trimmed)))
}

fn ensure_has_tasks(cfg: &RawBuildFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(PlanError::Config(
            "build file must contain at least one [task.\"<path>\"] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_build_section(build: &BuildSection) -> Result<()> {
    if build.max_workers == Some(0) {
        return Err(PlanError::Config(
            "[build].max_workers must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_included_builds(cfg: &RawBuildFile) -> Result<()> {
    for (name, included) in cfg.included_build.iter() {
        if name.is_empty() || name.contains(':') || name.starts_with('@') {
            return Err(PlanError::Config(format!(
                "included build name '{name}' must be non-empty and must not contain ':' or '@'"
            )));
        }
        if included.path.as_os_str().is_empty() {
            return Err(PlanError::Config(format!(
                "[included_build.{name}].path must not be empty"
            )));
        }
    }
    Ok(())
}

fn normalize_task_keys(raw: BTreeMap<String, TaskConfig>) -> Result<BTreeMap<TaskId, TaskConfig>> {
    let mut tasks = BTreeMap::new();
    for (key, task) in raw {
        let id = TaskId::parse(&key).map_err(PlanError::Config)?;
        if tasks.contains_key(&id) {
            return Err(PlanError::Config(format!(
                "task '{key}' is declared more than once (as '{id}')"
            )));
        }
        tasks.insert(id, task);
    }
    Ok(tasks)
}

fn validate_task_references(
    included: &BTreeMap<String, IncludedBuildConfig>,
    tasks: &BTreeMap<TaskId, TaskConfig>,
) -> Result<()> {
    for (id, task) in tasks.iter() {
        let lists: [(&str, &Vec<String>, bool); 4] = [
            ("depends_on", &task.depends_on, true),
            ("must_run_after", &task.must_run_after, false),
            ("should_run_after", &task.should_run_after, false),
            ("finalized_by", &task.finalized_by, false),
        ];

        for (field, references, allows_included) in lists {
            for raw in references {
                let target = resolve_reference(id.project(), raw).map_err(|err| {
                    PlanError::Config(format!("task '{id}' has an invalid `{field}` entry: {err}"))
                })?;
                match &target {
                    WorkRef::Task(target) => {
                        if target == id {
                            return Err(PlanError::Config(format!(
                                "task '{id}' cannot reference itself in `{field}`"
                            )));
                        }
                        if !tasks.contains_key(target) {
                            return Err(PlanError::Config(format!(
                                "task '{id}' has unknown task '{target}' in `{field}`"
                            )));
                        }
                    }
                    WorkRef::Included(target) => {
                        if !allows_included {
                            return Err(PlanError::Config(format!(
                                "task '{id}' references included task '{target}' in `{field}`; \
                                 included builds can only appear in `depends_on`"
                            )));
                        }
                        if !included.contains_key(target.build()) {
                            return Err(PlanError::Config(format!(
                                "task '{id}' references unknown included build '{}'",
                                target.build()
                            )));
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn validate_default_tasks(
    build: &BuildSection,
    included: &BTreeMap<String, IncludedBuildConfig>,
    tasks: &BTreeMap<TaskId, TaskConfig>,
) -> Result<()> {
    for raw in build.default_tasks.iter() {
        let target = resolve_reference(&ProjectPath::root(), raw).map_err(|err| {
            PlanError::Config(format!("[build].default_tasks has an invalid entry: {err}"))
        })?;
        let declared = match &target {
            WorkRef::Task(task) => tasks.contains_key(task),
            WorkRef::Included(task) => included.contains_key(task.build()),
        };
        if !declared {
            return Err(PlanError::Config(format!(
                "[build].default_tasks names unknown task '{target}'"
            )));
        }
    }
    Ok(())
}
