//! Job configuration and persisted option defaults.

mod file;
mod job;

pub use file::{DefaultsFile, DefaultsFileError};
pub use job::{ConfigError, JobConfig, ToolPaths};
