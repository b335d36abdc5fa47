//! fx-upscale adapter.
//!
//! The upscaler takes only an input path and writes its result next to
//! it with an " Upscaled" stem suffix; the expected output path is
//! computed here so callers and the artifact store agree on it.

use std::path::{Path, PathBuf};

use crate::config::JobConfig;
use crate::logging::JobLogger;

use super::runner::{CommandRunner, ToolError};

pub struct FxUpscale<'a> {
    runner: &'a CommandRunner,
    config: &'a JobConfig,
}

impl<'a> FxUpscale<'a> {
    pub fn new(runner: &'a CommandRunner, config: &'a JobConfig) -> Self {
        Self { runner, config }
    }

    /// Path the upscaler will write for `input`.
    pub fn output_path(input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = input
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        input.with_file_name(format!("{stem} Upscaled{ext}"))
    }

    /// Upscale one view file in place next to the input.
    pub fn upscale(&self, input: &Path, logger: &JobLogger) -> Result<PathBuf, ToolError> {
        let args = vec![input.display().to_string()];
        self.runner
            .run(&self.config.tools.fx_upscale, &args, "fx-upscale", logger)?;

        let output = Self::output_path(input);
        if !output.is_file() {
            return Err(ToolError::OutputInvalid {
                tool: "fx-upscale".to_string(),
                message: format!("expected upscaled file at {}", output.display()),
            });
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_appends_upscaled_to_stem() {
        let input = Path::new("/work/Movie_left.mov");
        assert_eq!(
            FxUpscale::output_path(input),
            Path::new("/work/Movie_left Upscaled.mov")
        );
    }

    #[test]
    fn output_path_without_extension() {
        let input = Path::new("/work/clip");
        assert_eq!(FxUpscale::output_path(input), Path::new("/work/clip Upscaled"));
    }
}
