//! Read-only context passed to stages.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::JobConfig;
use crate::logging::JobLogger;
use crate::models::{DiscInfo, SourceItem};
use crate::tools::CommandRunner;

/// Everything a stage may read. Mutable state lives in the
/// [`ArtifactStore`](crate::artifacts::ArtifactStore) only.
pub struct Context {
    pub config: JobConfig,
    pub item: SourceItem,
    pub disc: DiscInfo,
    /// Per-item working directory under the output root.
    pub work_dir: PathBuf,
    /// Final destination directory.
    pub output_root: PathBuf,
    pub logger: Arc<JobLogger>,
    pub runner: CommandRunner,
}

impl Context {
    /// Sanitized item name; names the working directory and all
    /// artifacts.
    pub fn item_name(&self) -> &str {
        &self.disc.name
    }

    /// Path the finished file ends up at after the move stage.
    pub fn final_destination(&self) -> PathBuf {
        self.output_root.join(format!("{}_AVP.mov", self.disc.name))
    }
}
