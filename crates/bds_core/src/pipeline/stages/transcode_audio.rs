//! Stage 6 (optional): transcode the PCM audio to AAC.

use std::fs;

use crate::artifacts::{ArtifactRole, ArtifactStore};
use crate::config::JobConfig;
use crate::models::Stage;
use crate::pipeline::{ConversionStage, Context, StageOutcome, StageResult};
use crate::tools::Ffmpeg;

pub struct TranscodeAudioStage;

impl ConversionStage for TranscodeAudioStage {
    fn id(&self) -> Stage {
        Stage::TranscodeAudio
    }

    fn outputs(&self, _config: &JobConfig) -> Vec<ArtifactRole> {
        vec![ArtifactRole::AacAudio]
    }

    fn execute(&self, ctx: &Context, store: &mut ArtifactStore) -> StageResult<StageOutcome> {
        let input = store.require(ArtifactRole::PcmAudio)?;
        let output = store.path_for(ArtifactRole::AacAudio);

        let ffmpeg = Ffmpeg::new(&ctx.runner, &ctx.config);
        ffmpeg.transcode_audio(&input, &output, ctx.config.audio_bitrate, &ctx.logger)?;

        if !ctx.config.keep_files {
            let _ = fs::remove_file(&input);
        }
        Ok(StageOutcome::Completed)
    }
}
