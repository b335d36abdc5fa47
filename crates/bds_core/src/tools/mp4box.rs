//! MP4Box adapter: final mux of video, audio, and tx3g subtitles.

use std::path::Path;

use crate::config::JobConfig;
use crate::logging::JobLogger;

use super::runner::{CommandRunner, ToolError};

pub struct Mp4Box<'a> {
    runner: &'a CommandRunner,
    config: &'a JobConfig,
}

impl<'a> Mp4Box<'a> {
    pub fn new(runner: &'a CommandRunner, config: &'a JobConfig) -> Self {
        Self { runner, config }
    }

    /// Mux the MV-HEVC video, the audio track, and an optional SRT
    /// subtitle (converted to tx3g) into the final .mov.
    pub fn mux(
        &self,
        video: &Path,
        audio: &Path,
        subtitles: Option<&Path>,
        output: &Path,
        logger: &JobLogger,
    ) -> Result<(), ToolError> {
        let mut args = vec![
            "-new".to_string(),
            "-lang".to_string(),
            self.config.language_code.clone(),
            "-add".to_string(),
            video.display().to_string(),
            "-add".to_string(),
            audio.display().to_string(),
        ];
        if let Some(sub) = subtitles {
            args.push("-add".to_string());
            args.push(format!(
                "{}:hdlr=sbtl:group=2:name=Subtitles:tx3g",
                sub.display()
            ));
        }
        args.push(output.display().to_string());

        self.runner
            .run(&self.config.tools.mp4box, &args, "MP4Box", logger)?;
        Ok(())
    }
}
