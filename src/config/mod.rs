// src/config/mod.rs

//! Build file loading and validation.
//!
//! - `model.rs` holds the TOML-backed data model.
//! - `loader.rs` reads a build file from disk.
//! - `validate.rs` checks references and normalises task paths.
//! - `definition.rs` answers the planner's and executor's questions about a
//!   loaded build.

pub mod definition;
pub mod loader;
pub mod model;
pub mod validate;

pub use definition::{BuildDefinition, TaskCommand};
pub use loader::{load_and_validate, load_from_path, DEFAULT_BUILD_FILE};
pub use model::{BuildSection, ConfigFile, IncludedBuildConfig, RawBuildFile, TaskConfig};
