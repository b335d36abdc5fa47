//! Stage 5: merge the per-eye files into one MV-HEVC stream.

use std::fs;

use crate::artifacts::{ArtifactRole, ArtifactStore};
use crate::config::JobConfig;
use crate::models::Stage;
use crate::pipeline::{ConversionStage, Context, StageOutcome, StageResult};
use crate::tools::SpatialMediaTool;

pub struct CombineToMvHevcStage;

impl CombineToMvHevcStage {
    fn view_roles(config: &JobConfig) -> (ArtifactRole, ArtifactRole) {
        if config.fx_upscale {
            (
                ArtifactRole::LeftViewUpscaled,
                ArtifactRole::RightViewUpscaled,
            )
        } else {
            (ArtifactRole::LeftView, ArtifactRole::RightView)
        }
    }
}

impl ConversionStage for CombineToMvHevcStage {
    fn id(&self) -> Stage {
        Stage::CombineToMvHevc
    }

    fn outputs(&self, _config: &JobConfig) -> Vec<ArtifactRole> {
        vec![ArtifactRole::MvHevc]
    }

    fn execute(&self, ctx: &Context, store: &mut ArtifactStore) -> StageResult<StageOutcome> {
        let (left_role, right_role) = Self::view_roles(&ctx.config);
        let left = store.require(left_role)?;
        let right = store.require(right_role)?;
        let output = store.path_for(ArtifactRole::MvHevc);

        let spatial = SpatialMediaTool::new(&ctx.runner, &ctx.config);
        spatial.merge(&left, &right, &output, &ctx.logger)?;

        if !ctx.config.keep_files {
            let _ = fs::remove_file(&left);
            let _ = fs::remove_file(&right);
        }
        Ok(StageOutcome::Completed)
    }
}
