//! Stage 7: mux video, audio, and subtitles into the final container.

use std::fs;

use crate::artifacts::{ArtifactRole, ArtifactStore};
use crate::config::JobConfig;
use crate::models::Stage;
use crate::pipeline::{ConversionStage, Context, StageOutcome, StageResult};
use crate::tools::Mp4Box;

pub struct CreateFinalFileStage;

impl ConversionStage for CreateFinalFileStage {
    fn id(&self) -> Stage {
        Stage::CreateFinalFile
    }

    fn outputs(&self, _config: &JobConfig) -> Vec<ArtifactRole> {
        vec![ArtifactRole::FinalMov]
    }

    fn execute(&self, ctx: &Context, store: &mut ArtifactStore) -> StageResult<StageOutcome> {
        let video = store.require(ArtifactRole::MvHevc)?;
        let audio = if ctx.config.transcode_audio {
            store.require(ArtifactRole::AacAudio)?
        } else {
            store.require(ArtifactRole::PcmAudio)?
        };
        let subtitles = store
            .exists(ArtifactRole::Subtitles)
            .then(|| store.get(ArtifactRole::Subtitles));
        let output = store.path_for(ArtifactRole::FinalMov);

        let mp4box = Mp4Box::new(&ctx.runner, &ctx.config);
        mp4box.mux(&video, &audio, subtitles.as_deref(), &output, &ctx.logger)?;

        if !ctx.config.keep_files {
            let _ = fs::remove_file(&video);
            let _ = fs::remove_file(&audio);
        }
        Ok(StageOutcome::Completed)
    }
}
