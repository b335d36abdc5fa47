//! Stage 1: get a Matroska (or transport stream) file into the working
//! directory.
//!
//! Discs and disc images are ripped with MakeMKV; file sources are
//! copied so later stages and cleanup never touch the original.

use std::fs;

use crate::artifacts::{ArtifactRole, ArtifactStore};
use crate::config::JobConfig;
use crate::models::{SourceItem, Stage};
use crate::pipeline::{ConversionStage, Context, StageError, StageOutcome, StageResult};
use crate::tools::MakeMkv;

pub struct CreateMkvStage;

impl ConversionStage for CreateMkvStage {
    fn id(&self) -> Stage {
        Stage::CreateMkv
    }

    fn outputs(&self, _config: &JobConfig) -> Vec<ArtifactRole> {
        vec![ArtifactRole::SourceMkv]
    }

    fn execute(&self, ctx: &Context, store: &mut ArtifactStore) -> StageResult<StageOutcome> {
        match &ctx.item {
            SourceItem::Mkv(path) | SourceItem::Stream(path) => {
                let file_name = path.file_name().ok_or_else(|| {
                    StageError::precondition(format!("source has no file name: {}", path.display()))
                })?;
                let dest = ctx.work_dir.join(file_name);
                ctx.logger
                    .info(&format!("copying source into {}", ctx.work_dir.display()));
                fs::copy(path, &dest)
                    .map_err(|e| StageError::io("copy source into working directory", e))?;
                store.put(ArtifactRole::SourceMkv, dest);
            }
            SourceItem::Disc(_) | SourceItem::Image(_) => {
                let makemkv = MakeMkv::new(&ctx.runner, &ctx.config);
                makemkv.rip_title(&ctx.item, &ctx.disc, &ctx.work_dir, &ctx.logger)?;
                // MakeMKV names the rip itself; the store discovers it
                // as the largest .mkv in the working directory.
            }
        }
        Ok(StageOutcome::Completed)
    }
}
