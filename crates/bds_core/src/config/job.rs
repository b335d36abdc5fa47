//! Immutable job configuration.
//!
//! One `JobConfig` describes a whole conversion request. It is validated
//! once when the runner is constructed and never mutated during a run;
//! stages only read it through the pipeline context.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Stage;

/// Errors detected before any stage runs.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("audio bitrate must be positive (got {0} kb/s)")]
    InvalidAudioBitrate(u32),

    #[error("left/right bitrate must be positive (got {0} Mb/s)")]
    InvalidVideoBitrate(u32),

    #[error("MV-HEVC quality must be 0-100 (got {0})")]
    InvalidQuality(u32),

    #[error("field of view must be 1-360 degrees (got {0})")]
    InvalidFov(u32),

    #[error("language must be an ISO 639-2 three-letter code (got '{0}')")]
    InvalidLanguage(String),

    #[error("invalid source: {0}")]
    InvalidSource(String),
}

/// External tool locations.
///
/// Plain names are resolved through `PATH`; the Windows-only MVC decoder
/// and the GPAC muxer live at fixed install locations by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub makemkvcon: PathBuf,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub wine: PathBuf,
    pub frim_decoder: PathBuf,
    pub spatial_media: PathBuf,
    pub mp4box: PathBuf,
    pub fx_upscale: PathBuf,
    pub pgsrip: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            makemkvcon: PathBuf::from("makemkvcon"),
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            wine: PathBuf::from("wine"),
            frim_decoder: PathBuf::from(
                "/usr/local/share/bd-spatial/FRIM_x64/FRIMDecode64.exe",
            ),
            spatial_media: PathBuf::from("spatial-media-kit-tool"),
            mp4box: PathBuf::from("/Applications/GPAC.app/Contents/MacOS/MP4Box"),
            fx_upscale: PathBuf::from("fx-upscale"),
            pgsrip: PathBuf::from("pgsrip"),
        }
    }
}

/// Immutable description of one conversion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Root folder for final outputs and per-item working directories.
    pub output_root: PathBuf,
    /// Replace an existing final output instead of skipping the item.
    pub overwrite: bool,
    /// Delete the source file/folder after a successful conversion.
    pub remove_original: bool,
    /// Keep intermediate artifacts after completion.
    pub keep_files: bool,

    /// Transcode PCM audio to AAC.
    pub transcode_audio: bool,
    /// AAC bitrate in kb/s.
    pub audio_bitrate: u32,
    /// Per-eye HEVC bitrate in Mb/s.
    pub left_right_bitrate: u32,
    /// MV-HEVC encoder quality, 0-100.
    pub mv_hevc_quality: u32,
    /// Horizontal field of view in degrees.
    pub fov: u32,
    /// Frame rate override; detected from the source when empty.
    pub frame_rate: String,
    /// Resolution override ("WxH"); detected from the source when empty.
    pub resolution: String,
    /// Use libx265 instead of the hardware encoder.
    pub software_encoder: bool,
    /// Swap left and right eye streams.
    pub swap_eyes: bool,

    /// Run the AI upscaler on the per-eye files.
    pub fx_upscale: bool,
    /// Skip subtitle extraction and OCR entirely.
    pub skip_subtitles: bool,
    /// Detect and crop letterbox black bars.
    pub crop_black_bars: bool,
    /// Record failures and keep going instead of stopping the item.
    pub continue_on_error: bool,
    /// Echo each external command before running it.
    pub output_commands: bool,
    /// ISO 639-2 code for audio/subtitle selection.
    pub language_code: String,
    /// Keep only `language_code` tracks when ripping.
    pub remove_extra_languages: bool,
    /// Resume from this stage; earlier stages are assumed satisfied.
    pub start_stage: Option<Stage>,
    /// Hold the machine awake for the duration of the batch.
    pub keep_awake: bool,

    /// External tool locations.
    pub tools: ToolPaths,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("."),
            overwrite: false,
            remove_original: false,
            keep_files: false,
            transcode_audio: false,
            audio_bitrate: 384,
            left_right_bitrate: 20,
            mv_hevc_quality: 75,
            fov: 90,
            frame_rate: String::new(),
            resolution: String::new(),
            software_encoder: false,
            swap_eyes: false,
            fx_upscale: false,
            skip_subtitles: false,
            crop_black_bars: false,
            continue_on_error: false,
            output_commands: false,
            language_code: "eng".to_string(),
            remove_extra_languages: false,
            start_stage: None,
            keep_awake: true,
            tools: ToolPaths::default(),
        }
    }
}

impl JobConfig {
    /// Validate once at job creation. Fails fast, before any stage runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audio_bitrate == 0 {
            return Err(ConfigError::InvalidAudioBitrate(self.audio_bitrate));
        }
        if self.left_right_bitrate == 0 {
            return Err(ConfigError::InvalidVideoBitrate(self.left_right_bitrate));
        }
        if self.mv_hevc_quality > 100 {
            return Err(ConfigError::InvalidQuality(self.mv_hevc_quality));
        }
        if self.fov == 0 || self.fov > 360 {
            return Err(ConfigError::InvalidFov(self.fov));
        }
        if self.language_code.len() != 3
            || !self.language_code.chars().all(|c| c.is_ascii_lowercase())
        {
            return Err(ConfigError::InvalidLanguage(self.language_code.clone()));
        }
        Ok(())
    }

    /// The stage the pipeline starts from (first stage unless overridden).
    pub fn effective_start_stage(&self) -> Stage {
        self.start_stage.unwrap_or_else(Stage::first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        JobConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut config = JobConfig {
            mv_hevc_quality: 101,
            ..JobConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidQuality(101))
        ));

        config.mv_hevc_quality = 75;
        config.audio_bitrate = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidAudioBitrate(0))
        ));

        config.audio_bitrate = 384;
        config.language_code = "english".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLanguage(_))
        ));
    }

    #[test]
    fn start_stage_defaults_to_first() {
        let mut config = JobConfig::default();
        assert_eq!(config.effective_start_stage(), Stage::CreateMkv);

        config.start_stage = Some(Stage::CombineToMvHevc);
        assert_eq!(config.effective_start_stage(), Stage::CombineToMvHevc);
    }

    #[test]
    fn roundtrips_through_toml() {
        let config = JobConfig {
            transcode_audio: true,
            start_stage: Some(Stage::UpscaleVideo),
            ..JobConfig::default()
        };
        let text = toml::to_string(&config).unwrap();
        let back: JobConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
