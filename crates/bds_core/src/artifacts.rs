//! Per-item artifact tracking.
//!
//! Every stage output has a fixed role and a deterministic filename
//! derived from the item name, which is what makes resume work: a rerun
//! recomputes the same paths and finds what an earlier run left behind.
//! Validation is deliberately strict about what counts as present, since
//! a zero-byte file from a killed tool must read as absent.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::fsutil::find_largest_file_with_extensions;

/// Role of an intermediate or final file in the conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactRole {
    /// Ripped or copied source container.
    SourceMkv,
    /// Demuxed MVC elementary stream.
    MvcVideo,
    /// Demuxed 24-bit PCM audio.
    PcmAudio,
    /// OCRed subtitles.
    Subtitles,
    /// Encoded left view.
    LeftView,
    /// Encoded right view.
    RightView,
    LeftViewUpscaled,
    RightViewUpscaled,
    /// Combined MV-HEVC video.
    MvHevc,
    /// Transcoded AAC audio.
    AacAudio,
    /// Fully muxed output, still inside the working directory.
    FinalMov,
}

impl ArtifactRole {
    /// Extensions a valid file of this role may carry. Transport-stream
    /// sources skip the rip and stand in for the source MKV directly.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            ArtifactRole::SourceMkv => &["mkv", "mts", "m2ts"],
            ArtifactRole::MvcVideo => &["h264"],
            ArtifactRole::Subtitles => &["srt"],
            ArtifactRole::PcmAudio
            | ArtifactRole::LeftView
            | ArtifactRole::RightView
            | ArtifactRole::LeftViewUpscaled
            | ArtifactRole::RightViewUpscaled
            | ArtifactRole::MvHevc
            | ArtifactRole::AacAudio
            | ArtifactRole::FinalMov => &["mov"],
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            ArtifactRole::SourceMkv => "source MKV",
            ArtifactRole::MvcVideo => "MVC video stream",
            ArtifactRole::PcmAudio => "PCM audio",
            ArtifactRole::Subtitles => "subtitles",
            ArtifactRole::LeftView => "left view video",
            ArtifactRole::RightView => "right view video",
            ArtifactRole::LeftViewUpscaled => "upscaled left view",
            ArtifactRole::RightViewUpscaled => "upscaled right view",
            ArtifactRole::MvHevc => "MV-HEVC video",
            ArtifactRole::AacAudio => "AAC audio",
            ArtifactRole::FinalMov => "final output",
        }
    }
}

/// Missing or unusable artifact.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("{} not found; run the producing stage first", .0.describe())]
    Missing(ArtifactRole),

    #[error("{} at {path} is invalid: {reason}", role.describe())]
    Invalid {
        role: ArtifactRole,
        path: PathBuf,
        reason: String,
    },
}

/// Tracks artifact paths for one item's working directory.
pub struct ArtifactStore {
    work_dir: PathBuf,
    item_name: String,
    paths: HashMap<ArtifactRole, PathBuf>,
}

impl ArtifactStore {
    pub fn new(work_dir: impl Into<PathBuf>, item_name: impl Into<String>) -> Self {
        Self {
            work_dir: work_dir.into(),
            item_name: item_name.into(),
            paths: HashMap::new(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn item_name(&self) -> &str {
        &self.item_name
    }

    /// The deterministic path for a role.
    ///
    /// `SourceMkv` is the exception: MakeMKV picks its own output name,
    /// so that role is discovered as the largest .mkv in the working
    /// directory (recorded via [`put`](Self::put) once found).
    pub fn path_for(&self, role: ArtifactRole) -> PathBuf {
        if let Some(path) = self.paths.get(&role) {
            return path.clone();
        }
        let name = &self.item_name;
        let file_name = match role {
            ArtifactRole::SourceMkv => format!("{name}.mkv"),
            ArtifactRole::MvcVideo => format!("{name}_mvc.h264"),
            ArtifactRole::PcmAudio => format!("{name}_audio_PCM.mov"),
            ArtifactRole::Subtitles => format!("{name}_subtitles.srt"),
            ArtifactRole::LeftView => format!("{name}_left.mov"),
            ArtifactRole::RightView => format!("{name}_right.mov"),
            ArtifactRole::LeftViewUpscaled => format!("{name}_left Upscaled.mov"),
            ArtifactRole::RightViewUpscaled => format!("{name}_right Upscaled.mov"),
            ArtifactRole::MvHevc => format!("{name}_MV-HEVC.mov"),
            ArtifactRole::AacAudio => format!("{name}_audio_AAC.mov"),
            ArtifactRole::FinalMov => format!("{name}_AVP.mov"),
        };
        self.work_dir.join(file_name)
    }

    /// Record a produced artifact at an explicit path.
    pub fn put(&mut self, role: ArtifactRole, path: PathBuf) {
        self.paths.insert(role, path);
    }

    /// Path of a recorded or deterministic artifact, without validation.
    pub fn get(&self, role: ArtifactRole) -> PathBuf {
        self.path_for(role)
    }

    fn validate(&self, role: ArtifactRole, path: &Path) -> Result<(), ArtifactError> {
        if !path.is_file() {
            return Err(ArtifactError::Missing(role));
        }
        let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(ArtifactError::Invalid {
                role,
                path: path.to_path_buf(),
                reason: "file is empty".to_string(),
            });
        }
        let expected = role.extensions();
        let actual = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());
        if !actual
            .as_deref()
            .is_some_and(|ext| expected.contains(&ext))
        {
            return Err(ArtifactError::Invalid {
                role,
                path: path.to_path_buf(),
                reason: format!("expected .{} extension", expected[0]),
            });
        }
        Ok(())
    }

    /// Whether a valid artifact for `role` is already on disk.
    pub fn exists(&mut self, role: ArtifactRole) -> bool {
        if role == ArtifactRole::SourceMkv {
            self.discover_source_mkv();
        }
        let path = self.path_for(role);
        self.validate(role, &path).is_ok()
    }

    /// Path of a required artifact, validated.
    pub fn require(&mut self, role: ArtifactRole) -> Result<PathBuf, ArtifactError> {
        if role == ArtifactRole::SourceMkv {
            self.discover_source_mkv();
        }
        let path = self.path_for(role);
        self.validate(role, &path)?;
        Ok(path)
    }

    fn discover_source_mkv(&mut self) {
        if self.paths.contains_key(&ArtifactRole::SourceMkv) {
            return;
        }
        if let Some(found) =
            find_largest_file_with_extensions(&self.work_dir, ArtifactRole::SourceMkv.extensions())
        {
            self.paths.insert(ArtifactRole::SourceMkv, found);
        }
    }

    /// Delete every known artifact except the final output.
    pub fn purge_intermediates(&mut self) {
        const ALL: [ArtifactRole; 10] = [
            ArtifactRole::SourceMkv,
            ArtifactRole::MvcVideo,
            ArtifactRole::PcmAudio,
            ArtifactRole::Subtitles,
            ArtifactRole::LeftView,
            ArtifactRole::RightView,
            ArtifactRole::LeftViewUpscaled,
            ArtifactRole::RightViewUpscaled,
            ArtifactRole::MvHevc,
            ArtifactRole::AacAudio,
        ];
        self.discover_source_mkv();
        for role in ALL {
            let path = self.path_for(role);
            let _ = fs::remove_file(path);
        }
    }
}

/// Exclusive lock on a working directory.
///
/// Two concurrent runs over the same item would corrupt each other's
/// artifacts; the lock file makes the second run fail fast. Removed on
/// drop so a clean exit never leaves the directory locked.
pub struct WorkDirLock {
    path: PathBuf,
}

impl WorkDirLock {
    const LOCK_NAME: &'static str = ".bds.lock";

    pub fn acquire(work_dir: &Path) -> std::io::Result<Self> {
        let path = work_dir.join(Self::LOCK_NAME);
        OpenOptions::new().write(true).create_new(true).open(&path)?;
        Ok(Self { path })
    }
}

impl Drop for WorkDirLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> ArtifactStore {
        ArtifactStore::new(dir.path(), "Movie")
    }

    #[test]
    fn deterministic_names_follow_item() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert_eq!(
            store.path_for(ArtifactRole::MvcVideo).file_name().unwrap(),
            "Movie_mvc.h264"
        );
        assert_eq!(
            store.path_for(ArtifactRole::FinalMov).file_name().unwrap(),
            "Movie_AVP.mov"
        );
        assert_eq!(
            store
                .path_for(ArtifactRole::LeftViewUpscaled)
                .file_name()
                .unwrap(),
            "Movie_left Upscaled.mov"
        );
    }

    #[test]
    fn zero_byte_artifact_reads_as_invalid() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        fs::write(store.path_for(ArtifactRole::MvHevc), b"").unwrap();

        assert!(!store.exists(ArtifactRole::MvHevc));
        assert!(matches!(
            store.require(ArtifactRole::MvHevc),
            Err(ArtifactError::Invalid { .. })
        ));
    }

    #[test]
    fn valid_artifact_is_found() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        fs::write(store.path_for(ArtifactRole::MvHevc), b"data").unwrap();

        assert!(store.exists(ArtifactRole::MvHevc));
        assert!(store.require(ArtifactRole::MvHevc).is_ok());
    }

    #[test]
    fn source_mkv_is_discovered_by_size() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("title_t00.mkv"), vec![0u8; 100]).unwrap();
        fs::write(dir.path().join("title_t01.mkv"), vec![0u8; 2000]).unwrap();

        let mut store = store(&dir);
        let found = store.require(ArtifactRole::SourceMkv).unwrap();
        assert_eq!(found.file_name().unwrap(), "title_t01.mkv");
    }

    #[test]
    fn purge_keeps_final_output() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        fs::write(store.path_for(ArtifactRole::MvHevc), b"x").unwrap();
        fs::write(store.path_for(ArtifactRole::FinalMov), b"x").unwrap();

        store.purge_intermediates();
        assert!(!store.path_for(ArtifactRole::MvHevc).exists());
        assert!(store.path_for(ArtifactRole::FinalMov).exists());
    }

    #[test]
    fn lock_is_exclusive_and_released_on_drop() {
        let dir = TempDir::new().unwrap();
        let lock = WorkDirLock::acquire(dir.path()).unwrap();
        assert!(WorkDirLock::acquire(dir.path()).is_err());
        drop(lock);
        assert!(WorkDirLock::acquire(dir.path()).is_ok());
    }
}
