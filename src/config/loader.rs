// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::model::{ConfigFile, RawBuildFile};
use crate::errors::Result;

/// File name looked up when no build file is given.
pub const DEFAULT_BUILD_FILE: &str = "Buildplan.toml";

/// Read and deserialize a build file without validating it.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawBuildFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let raw: RawBuildFile = toml::from_str(&contents)?;
    debug!(path = %path.display(), tasks = raw.task.len(), "build file read");
    Ok(raw)
}

/// Read a build file and validate it.
///
/// Ordering cycles are not checked here; the planner reports them with the
/// full cycle when the affected tasks are actually requested.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw = load_from_path(&path)?;
    ConfigFile::try_from(raw)
}
