//! Stage 3: decode the MVC pair into per-eye HEVC files.

use crate::artifacts::{ArtifactRole, ArtifactStore};
use crate::config::JobConfig;
use crate::models::Stage;
use crate::pipeline::{ConversionStage, Context, StageOutcome, StageResult};
use crate::tools::{Ffmpeg, FrimDecoder, SplitRequest};

pub struct CreateLeftRightStage;

impl ConversionStage for CreateLeftRightStage {
    fn id(&self) -> Stage {
        Stage::CreateLeftRight
    }

    fn outputs(&self, _config: &JobConfig) -> Vec<ArtifactRole> {
        vec![ArtifactRole::LeftView, ArtifactRole::RightView]
    }

    fn execute(&self, ctx: &Context, store: &mut ArtifactStore) -> StageResult<StageOutcome> {
        // FRIM can read a transport stream directly; demuxed sources go
        // through the extracted elementary stream.
        let (input, transport_stream) = if ctx.item.is_stream() {
            (store.require(ArtifactRole::SourceMkv)?, true)
        } else {
            (store.require(ArtifactRole::MvcVideo)?, false)
        };

        let ffmpeg = Ffmpeg::new(&ctx.runner, &ctx.config);
        let mut disc = ctx.disc.clone();
        if let Some(depth) = ffmpeg.color_depth(&input, &ctx.logger) {
            disc.color_depth = depth;
        }

        let crop = if ctx.config.crop_black_bars {
            let source = store.require(ArtifactRole::SourceMkv)?;
            ctx.logger.info("detecting crop parameters");
            ffmpeg.detect_crop(&source, &ctx.logger)?
        } else {
            String::new()
        };
        if !crop.is_empty() {
            ctx.logger.info(&format!("cropping to {crop}"));
        }

        let request = SplitRequest {
            input,
            left_output: store.path_for(ArtifactRole::LeftView),
            right_output: store.path_for(ArtifactRole::RightView),
            transport_stream,
        };
        let decoder = FrimDecoder::new(&ctx.runner, &ctx.config);
        decoder.split_to_stereo(&request, &disc, &crop, &ctx.logger)?;
        Ok(StageOutcome::Completed)
    }
}
