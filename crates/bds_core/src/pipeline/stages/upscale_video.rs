//! Stage 4 (optional): AI-upscale the per-eye files.

use std::fs;

use crate::artifacts::{ArtifactRole, ArtifactStore};
use crate::config::JobConfig;
use crate::models::Stage;
use crate::pipeline::{ConversionStage, Context, StageOutcome, StageResult};
use crate::tools::FxUpscale;

pub struct UpscaleVideoStage;

impl ConversionStage for UpscaleVideoStage {
    fn id(&self) -> Stage {
        Stage::UpscaleVideo
    }

    fn outputs(&self, _config: &JobConfig) -> Vec<ArtifactRole> {
        vec![
            ArtifactRole::LeftViewUpscaled,
            ArtifactRole::RightViewUpscaled,
        ]
    }

    fn execute(&self, ctx: &Context, store: &mut ArtifactStore) -> StageResult<StageOutcome> {
        let upscaler = FxUpscale::new(&ctx.runner, &ctx.config);
        for (input_role, output_role) in [
            (ArtifactRole::LeftView, ArtifactRole::LeftViewUpscaled),
            (ArtifactRole::RightView, ArtifactRole::RightViewUpscaled),
        ] {
            let input = store.require(input_role)?;
            let produced = upscaler.upscale(&input, &ctx.logger)?;
            store.put(output_role, produced);
            if !ctx.config.keep_files {
                let _ = fs::remove_file(&input);
            }
        }
        Ok(StageOutcome::Completed)
    }
}
