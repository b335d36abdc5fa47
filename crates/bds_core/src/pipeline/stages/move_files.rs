//! Stage 8: move the finished file to the output root and clean up.

use std::fs;
use std::io;
use std::path::Path;

use crate::artifacts::{ArtifactRole, ArtifactStore};
use crate::config::JobConfig;
use crate::fsutil::remove_dir_if_exists;
use crate::models::Stage;
use crate::pipeline::{ConversionStage, Context, StageError, StageOutcome, StageResult};

pub struct MoveFilesStage;

/// Rename with a copy fallback for when the output root sits on a
/// different filesystem than the working directory.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}

impl ConversionStage for MoveFilesStage {
    fn id(&self) -> Stage {
        Stage::MoveFiles
    }

    fn outputs(&self, _config: &JobConfig) -> Vec<ArtifactRole> {
        // The result lives outside the working directory; nothing to
        // declare in the store.
        Vec::new()
    }

    fn execute(&self, ctx: &Context, store: &mut ArtifactStore) -> StageResult<StageOutcome> {
        let finished = store.require(ArtifactRole::FinalMov)?;
        let destination = ctx.final_destination();

        if destination.exists() {
            if !ctx.config.overwrite {
                return Err(StageError::precondition(format!(
                    "output already exists: {} (use --overwrite)",
                    destination.display()
                )));
            }
            fs::remove_file(&destination)
                .map_err(|e| StageError::io("replace existing output", e))?;
        }
        move_file(&finished, &destination)
            .map_err(|e| StageError::io("move finished file to output root", e))?;
        ctx.logger
            .info(&format!("finished file at {}", destination.display()));

        if !ctx.config.keep_files {
            store.purge_intermediates();
            remove_dir_if_exists(&ctx.work_dir);
        }
        Ok(StageOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{JobLogger, LogConfig};
    use crate::models::{DiscInfo, SourceItem};
    use crate::pipeline::CancelHandle;
    use crate::tools::CommandRunner;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn context_for(root: &TempDir, work: &Path, config: JobConfig) -> Context {
        Context {
            config,
            item: SourceItem::Mkv(PathBuf::from("/tmp/in.mkv")),
            disc: DiscInfo {
                name: "Item".to_string(),
                ..DiscInfo::default()
            },
            work_dir: work.to_path_buf(),
            output_root: root.path().to_path_buf(),
            logger: Arc::new(
                JobLogger::new("Item", root.path().join(".logs"), LogConfig::default()).unwrap(),
            ),
            runner: CommandRunner::new(false, CancelHandle::new()),
        }
    }

    #[test]
    fn moves_final_file_and_removes_work_dir() {
        let root = TempDir::new().unwrap();
        let work = root.path().join("Item");
        fs::create_dir(&work).unwrap();

        let mut store = ArtifactStore::new(&work, "Item");
        fs::write(store.path_for(ArtifactRole::FinalMov), b"final").unwrap();
        fs::write(store.path_for(ArtifactRole::MvHevc), b"leftover").unwrap();

        let ctx = context_for(&root, &work, JobConfig::default());
        MoveFilesStage.execute(&ctx, &mut store).unwrap();

        assert!(root.path().join("Item_AVP.mov").exists());
        assert!(!work.exists());
    }

    #[test]
    fn keep_files_retains_working_directory() {
        let root = TempDir::new().unwrap();
        let work = root.path().join("Item");
        fs::create_dir(&work).unwrap();

        let mut store = ArtifactStore::new(&work, "Item");
        fs::write(store.path_for(ArtifactRole::FinalMov), b"final").unwrap();
        fs::write(store.path_for(ArtifactRole::MvHevc), b"leftover").unwrap();

        let config = JobConfig {
            keep_files: true,
            ..JobConfig::default()
        };
        let ctx = context_for(&root, &work, config);
        MoveFilesStage.execute(&ctx, &mut store).unwrap();

        assert!(root.path().join("Item_AVP.mov").exists());
        assert!(store.path_for(ArtifactRole::MvHevc).exists());
    }

    #[test]
    fn existing_destination_without_overwrite_is_an_error() {
        let root = TempDir::new().unwrap();
        let work = root.path().join("Item");
        fs::create_dir(&work).unwrap();
        fs::write(root.path().join("Item_AVP.mov"), b"old").unwrap();

        let mut store = ArtifactStore::new(&work, "Item");
        fs::write(store.path_for(ArtifactRole::FinalMov), b"new").unwrap();

        let ctx = context_for(&root, &work, JobConfig::default());
        let err = MoveFilesStage.execute(&ctx, &mut store).unwrap_err();
        assert!(matches!(err, StageError::Precondition(_)));
    }

    #[test]
    fn overwrite_replaces_existing_destination() {
        let root = TempDir::new().unwrap();
        let work = root.path().join("Item");
        fs::create_dir(&work).unwrap();
        fs::write(root.path().join("Item_AVP.mov"), b"old").unwrap();

        let mut store = ArtifactStore::new(&work, "Item");
        fs::write(store.path_for(ArtifactRole::FinalMov), b"new").unwrap();

        let config = JobConfig {
            overwrite: true,
            ..JobConfig::default()
        };
        let ctx = context_for(&root, &work, config);
        MoveFilesStage.execute(&ctx, &mut store).unwrap();

        let content = fs::read(root.path().join("Item_AVP.mov")).unwrap();
        assert_eq!(content, b"new");
    }
}
