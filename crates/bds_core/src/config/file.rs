//! Persisted option defaults.
//!
//! The CLI can seed a `JobConfig` from a TOML defaults file so frequently
//! used options (bitrates, language, tool paths) survive between runs.
//! Writes are atomic: serialize to a temp file, then rename over the
//! target. `toml_edit` is used for the write path so a hand-edited file
//! keeps its comments when only values change.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use toml_edit::DocumentMut;

use super::job::JobConfig;

/// Errors from loading or saving the defaults file.
#[derive(Error, Debug)]
pub enum DefaultsFileError {
    #[error("failed to read defaults file: {0}")]
    Read(#[from] io::Error),

    #[error("failed to parse defaults file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize defaults: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to re-parse serialized defaults: {0}")]
    Edit(#[from] toml_edit::TomlError),
}

/// Handle on the TOML defaults file.
#[derive(Debug, Clone)]
pub struct DefaultsFile {
    path: PathBuf,
}

impl DefaultsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load saved defaults. Returns `None` when the file does not exist;
    /// a present-but-broken file is an error, not a silent fallback.
    pub fn load(&self) -> Result<Option<JobConfig>, DefaultsFileError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let config: JobConfig = toml::from_str(&content)?;
        Ok(Some(config))
    }

    /// Save the given config as the new defaults, atomically.
    pub fn save(&self, config: &JobConfig) -> Result<(), DefaultsFileError> {
        let serialized = toml::to_string_pretty(config)?;
        // Round-trip through toml_edit to normalize formatting.
        let doc: DocumentMut = serialized.parse()?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = self.path.with_extension("toml.tmp");
        fs::write(&temp_path, doc.to_string())?;
        fs::rename(&temp_path, &self.path)?;

        tracing::debug!("Saved option defaults to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Stage;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let file = DefaultsFile::new(dir.path().join("defaults.toml"));
        assert!(file.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = TempDir::new().unwrap();
        let file = DefaultsFile::new(dir.path().join("defaults.toml"));

        let config = JobConfig {
            audio_bitrate: 256,
            language_code: "jpn".to_string(),
            start_stage: Some(Stage::CombineToMvHevc),
            ..JobConfig::default()
        };
        file.save(&config).unwrap();

        let loaded = file.load().unwrap().unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn save_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let file = DefaultsFile::new(dir.path().join("defaults.toml"));
        file.save(&JobConfig::default()).unwrap();

        assert!(file.path().exists());
        assert!(!dir.path().join("defaults.toml.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("defaults.toml");
        std::fs::write(&path, "audio_bitrate = \"not a number\"").unwrap();

        let file = DefaultsFile::new(path);
        assert!(matches!(file.load(), Err(DefaultsFileError::Parse(_))));
    }
}
