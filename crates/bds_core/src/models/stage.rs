//! Pipeline stage identities.
//!
//! Stages form a strict total order; the pipeline always walks them in
//! this order and never revisits a stage. Two stages are conditional:
//! `UpscaleVideo` (fx-upscale flag) and `TranscodeAudio` (transcode-audio
//! flag).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::JobConfig;

/// One named, ordered step of the conversion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Rip/copy the source to a Matroska file.
    CreateMkv,
    /// Demux MVC video, PCM audio, and subtitles from the MKV.
    ExtractStreams,
    /// Decode the MVC pair into per-eye HEVC files.
    CreateLeftRight,
    /// AI-upscale the per-eye files (optional).
    UpscaleVideo,
    /// Merge the per-eye files into one MV-HEVC stream.
    CombineToMvHevc,
    /// Transcode PCM audio to AAC (optional).
    TranscodeAudio,
    /// Mux video, audio, and subtitles into the final container.
    CreateFinalFile,
    /// Move the finished file to the output root and clean up.
    MoveFiles,
}

impl Stage {
    /// All stages in execution order.
    pub const ORDER: [Stage; 8] = [
        Stage::CreateMkv,
        Stage::ExtractStreams,
        Stage::CreateLeftRight,
        Stage::UpscaleVideo,
        Stage::CombineToMvHevc,
        Stage::TranscodeAudio,
        Stage::CreateFinalFile,
        Stage::MoveFiles,
    ];

    /// The first stage in the order.
    pub fn first() -> Stage {
        Stage::ORDER[0]
    }

    /// Position in the fixed order.
    pub fn index(&self) -> usize {
        Stage::ORDER.iter().position(|s| s == self).unwrap_or(0)
    }

    /// Whether this stage runs under the given configuration.
    ///
    /// Flag-disabled stages are skipped by the pipeline without becoming
    /// the current state.
    pub fn applies(&self, config: &JobConfig) -> bool {
        match self {
            Stage::UpscaleVideo => config.fx_upscale,
            Stage::TranscodeAudio => config.transcode_audio,
            _ => true,
        }
    }

    /// Stable machine name accepted by `--start-stage`.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::CreateMkv => "create_mkv",
            Stage::ExtractStreams => "extract_streams",
            Stage::CreateLeftRight => "create_left_right",
            Stage::UpscaleVideo => "upscale_video",
            Stage::CombineToMvHevc => "combine_to_mv_hevc",
            Stage::TranscodeAudio => "transcode_audio",
            Stage::CreateFinalFile => "create_final_file",
            Stage::MoveFiles => "move_files",
        }
    }

    /// Human-readable label for logs and summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::CreateMkv => "Create MKV",
            Stage::ExtractStreams => "Extract MVC, Audio and Subtitles",
            Stage::CreateLeftRight => "Create Left/Right Files",
            Stage::UpscaleVideo => "Upscale Video",
            Stage::CombineToMvHevc => "Combine to MV-HEVC",
            Stage::TranscodeAudio => "Transcode Audio",
            Stage::CreateFinalFile => "Create Final File",
            Stage::MoveFiles => "Move Files",
        }
    }

    /// Names of all stages, for CLI help text.
    pub fn names() -> Vec<&'static str> {
        Stage::ORDER.iter().map(|s| s.name()).collect()
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Error for an unrecognized stage name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown stage '{0}' (expected one of: {names})", names = Stage::names().join(", "))]
pub struct StageParseError(pub String);

impl std::str::FromStr for Stage {
    type Err = StageParseError;

    /// Case-insensitive; accepts `-` or `_` separators.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Stage::ORDER
            .iter()
            .copied()
            .find(|stage| stage.name() == normalized)
            .ok_or_else(|| StageParseError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_is_total_and_fixed() {
        for pair in Stage::ORDER.windows(2) {
            assert!(pair[0] < pair[1], "{:?} must precede {:?}", pair[0], pair[1]);
        }
        assert_eq!(Stage::first(), Stage::CreateMkv);
        assert_eq!(Stage::MoveFiles.index(), Stage::ORDER.len() - 1);
    }

    #[test]
    fn parse_is_case_and_separator_insensitive() {
        assert_eq!("CREATE_MKV".parse::<Stage>().unwrap(), Stage::CreateMkv);
        assert_eq!(
            "combine-to-mv-hevc".parse::<Stage>().unwrap(),
            Stage::CombineToMvHevc
        );
        assert!("make_sandwich".parse::<Stage>().is_err());
    }

    #[test]
    fn conditional_stages_follow_flags() {
        let mut config = JobConfig::default();
        assert!(!Stage::UpscaleVideo.applies(&config));
        assert!(!Stage::TranscodeAudio.applies(&config));
        assert!(Stage::CreateMkv.applies(&config));

        config.fx_upscale = true;
        config.transcode_audio = true;
        assert!(Stage::UpscaleVideo.applies(&config));
        assert!(Stage::TranscodeAudio.applies(&config));
    }
}
