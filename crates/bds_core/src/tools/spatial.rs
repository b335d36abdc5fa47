//! spatial-media-kit-tool adapter: merge two HEVC views into MV-HEVC.

use std::fs;
use std::path::Path;

use crate::config::JobConfig;
use crate::logging::JobLogger;

use super::runner::{CommandRunner, ToolError};

const RESOLUTION_MISMATCH: &str = "left and right input resolutions do not match. aborting!";

pub struct SpatialMediaTool<'a> {
    runner: &'a CommandRunner,
    config: &'a JobConfig,
}

impl<'a> SpatialMediaTool<'a> {
    pub fn new(runner: &'a CommandRunner, config: &'a JobConfig) -> Self {
        Self { runner, config }
    }

    /// Merge left/right into an MV-HEVC file with the left view primary.
    ///
    /// The tool reports some failures only in output text while exiting
    /// zero, so the captured output is scanned for its abort marker.
    pub fn merge(
        &self,
        left: &Path,
        right: &Path,
        output: &Path,
        logger: &JobLogger,
    ) -> Result<(), ToolError> {
        // The tool refuses to overwrite.
        let _ = fs::remove_file(output);

        let args = vec![
            "merge".to_string(),
            "-l".to_string(),
            left.display().to_string(),
            "-r".to_string(),
            right.display().to_string(),
            "-q".to_string(),
            self.config.mv_hevc_quality.to_string(),
            "--left-is-primary".to_string(),
            "--horizontal-field-of-view".to_string(),
            self.config.fov.to_string(),
            "-o".to_string(),
            output.display().to_string(),
        ];
        let out = self.runner.run(
            &self.config.tools.spatial_media,
            &args,
            "spatial-media-kit-tool",
            logger,
        )?;

        if out.output.contains(RESOLUTION_MISMATCH) {
            return Err(ToolError::OutputInvalid {
                tool: "spatial-media-kit-tool".to_string(),
                message: "left and right resolutions do not match; try without AI upscaling"
                    .to_string(),
            });
        }
        if out.output.contains("aborting!") {
            return Err(ToolError::OutputInvalid {
                tool: "spatial-media-kit-tool".to_string(),
                message: "failed to combine stereo HEVC streams".to_string(),
            });
        }
        Ok(())
    }
}
