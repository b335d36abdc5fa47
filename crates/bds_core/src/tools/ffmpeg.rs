//! ffmpeg/ffprobe adapter.
//!
//! Covers stream probing, demuxing the MKV into elementary streams, the
//! raw-video view encoders fed by the MVC decoder, AAC transcoding, and
//! letterbox crop detection.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::JobConfig;
use crate::logging::JobLogger;
use crate::models::DiscInfo;

use super::runner::{CommandRunner, ToolError};

/// Facts about a probed stream, reduced to what the pipeline needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbedStream {
    pub index: u32,
    pub codec_type: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub avg_frame_rate: Option<String>,
    pub pix_fmt: Option<String>,
    pub field_order: Option<String>,
    pub language: Option<String>,
    pub forced: bool,
    pub default: bool,
}

/// A subtitle stream eligible for extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleTrack {
    /// Index among subtitle streams, as `-map 0:s:N` counts them.
    pub subtitle_index: u32,
    pub language: String,
    pub forced: bool,
}

/// Parameters for one raw-video view encoder.
#[derive(Debug, Clone)]
pub struct EncodeParams {
    /// FIFO the decoder writes raw frames into.
    pub input: PathBuf,
    pub output: PathBuf,
    pub color_depth: u32,
    /// "WxH" of the incoming raw frames.
    pub resolution: String,
    pub frame_rate: String,
    /// Per-eye bitrate in Mb/s.
    pub bitrate: u32,
    /// "w:h:x:y" crop filter arguments; empty for no crop.
    pub crop: String,
    pub software_encoder: bool,
}

/// ffmpeg + ffprobe wrapper.
pub struct Ffmpeg<'a> {
    runner: &'a CommandRunner,
    config: &'a JobConfig,
}

impl<'a> Ffmpeg<'a> {
    pub fn new(runner: &'a CommandRunner, config: &'a JobConfig) -> Self {
        Self { runner, config }
    }

    fn probe_json(&self, input: &Path, logger: &JobLogger) -> Result<Value, ToolError> {
        let args = vec![
            "-v".to_string(),
            "quiet".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_streams".to_string(),
            input.display().to_string(),
        ];
        let out = self
            .runner
            .run(&self.config.tools.ffprobe, &args, "ffprobe", logger)?;
        serde_json::from_str(&out.output).map_err(|e| ToolError::OutputInvalid {
            tool: "ffprobe".to_string(),
            message: format!("unparseable probe output: {e}"),
        })
    }

    /// Probe all streams of a container.
    pub fn probe_streams(
        &self,
        input: &Path,
        logger: &JobLogger,
    ) -> Result<Vec<ProbedStream>, ToolError> {
        let json = self.probe_json(input, logger)?;
        let streams = json
            .get("streams")
            .and_then(Value::as_array)
            .ok_or_else(|| ToolError::OutputInvalid {
                tool: "ffprobe".to_string(),
                message: "no streams in probe output".to_string(),
            })?;
        Ok(streams.iter().map(parse_stream).collect())
    }

    /// Derive disc properties from a bare transport stream, which has no
    /// MakeMKV metadata to probe.
    pub fn stream_info(
        &self,
        input: &Path,
        name: String,
        logger: &JobLogger,
    ) -> Result<DiscInfo, ToolError> {
        let streams = self.probe_streams(input, logger)?;
        let video = streams
            .iter()
            .find(|s| s.codec_type == "video")
            .ok_or_else(|| ToolError::OutputInvalid {
                tool: "ffprobe".to_string(),
                message: "no video stream in source".to_string(),
            })?;

        let mut info = DiscInfo {
            name,
            ..DiscInfo::default()
        };
        if let (Some(w), Some(h)) = (video.width, video.height) {
            info.resolution = format!("{w}x{h}");
        }
        if let Some(rate) = &video.avg_frame_rate {
            info.frame_rate = rate.clone();
        }
        info.is_interlaced = video
            .field_order
            .as_deref()
            .is_some_and(|order| order != "progressive");
        Ok(info)
    }

    /// Bit depth of the first video stream: 10 for 10-bit pixel formats,
    /// None when it cannot be determined (callers keep their default).
    pub fn color_depth(&self, input: &Path, logger: &JobLogger) -> Option<u32> {
        let streams = self.probe_streams(input, logger).ok()?;
        let pix_fmt = streams
            .iter()
            .find(|s| s.codec_type == "video")?
            .pix_fmt
            .clone()?;
        if pix_fmt.contains("10le") || pix_fmt.contains("10be") {
            Some(10)
        } else {
            Some(8)
        }
    }

    /// Subtitle streams present in the container, in `-map 0:s:N` order.
    pub fn subtitle_tracks(
        &self,
        input: &Path,
        logger: &JobLogger,
    ) -> Result<Vec<SubtitleTrack>, ToolError> {
        let streams = self.probe_streams(input, logger)?;
        Ok(streams
            .iter()
            .filter(|s| s.codec_type == "subtitle")
            .enumerate()
            .map(|(i, s)| SubtitleTrack {
                subtitle_index: i as u32,
                language: s.language.clone().unwrap_or_else(|| "und".to_string()),
                forced: s.forced,
            })
            .collect())
    }

    /// Demux the MKV: MVC video as Annex B H.264, first audio track as
    /// 24-bit PCM, and optionally one subtitle track stream-copied.
    pub fn extract_streams(
        &self,
        input: &Path,
        video_out: &Path,
        audio_out: &Path,
        subtitle: Option<(&Path, u32)>,
        logger: &JobLogger,
    ) -> Result<(), ToolError> {
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input.display().to_string(),
            "-map".to_string(),
            "0:v:0".to_string(),
            "-c:v".to_string(),
            "copy".to_string(),
            "-bsf:v".to_string(),
            "h264_mp4toannexb".to_string(),
            format!("file:{}", video_out.display()),
            "-map".to_string(),
            "0:a:0".to_string(),
            "-c:a".to_string(),
            "pcm_s24le".to_string(),
            format!("file:{}", audio_out.display()),
        ];
        if let Some((subtitle_out, track)) = subtitle {
            args.extend([
                "-map".to_string(),
                format!("0:s:{track}"),
                "-c:s".to_string(),
                "copy".to_string(),
                format!("file:{}", subtitle_out.display()),
            ]);
        }
        self.runner
            .run(&self.config.tools.ffmpeg, &args, "ffmpeg", logger)?;
        Ok(())
    }

    /// Argument list for one view encoder reading raw frames from a FIFO.
    ///
    /// The process is spawned by the decoder orchestration, not run
    /// directly, because it only exits once the FIFO closes.
    pub fn view_encoder_args(&self, params: &EncodeParams) -> Vec<String> {
        let pix_fmt = if params.color_depth == 10 {
            "yuv420p10le"
        } else {
            "yuv420p"
        };
        let codec = if params.software_encoder {
            "libx265"
        } else {
            "hevc_videotoolbox"
        };
        let profile = if params.color_depth == 10 {
            "main10"
        } else {
            "main"
        };

        let mut args = vec![
            "-y".to_string(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            pix_fmt.to_string(),
            "-s".to_string(),
            params.resolution.clone(),
            "-r".to_string(),
            params.frame_rate.clone(),
            "-i".to_string(),
            params.input.display().to_string(),
        ];
        if !params.crop.is_empty() {
            args.extend(["-vf".to_string(), format!("crop={}", params.crop)]);
        }
        args.extend([
            "-c:v".to_string(),
            codec.to_string(),
            "-b:v".to_string(),
            format!("{}M", params.bitrate),
            "-bufsize".to_string(),
            format!("{}M", params.bitrate * 2),
            "-tag:v".to_string(),
            "hvc1".to_string(),
            "-profile:v".to_string(),
            profile.to_string(),
            "-r".to_string(),
            params.frame_rate.clone(),
            format!("file:{}", params.output.display()),
        ]);
        args
    }

    /// Transcode the first audio track to AAC at `bitrate` kb/s.
    pub fn transcode_audio(
        &self,
        input: &Path,
        output: &Path,
        bitrate: u32,
        logger: &JobLogger,
    ) -> Result<(), ToolError> {
        let args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input.display().to_string(),
            "-map".to_string(),
            "0:a:0".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            format!("{bitrate}k"),
            format!("file:{}", output.display()),
        ];
        self.runner
            .run(&self.config.tools.ffmpeg, &args, "ffmpeg", logger)?;
        Ok(())
    }

    /// Run cropdetect over a sample window and return the most specific
    /// "w:h:x:y" crop seen, or empty when detection is disabled or finds
    /// nothing.
    pub fn detect_crop(&self, input: &Path, logger: &JobLogger) -> Result<String, ToolError> {
        const SAMPLE_START_SECS: u32 = 600;
        const SAMPLE_FRAMES: u32 = 300;

        let args = vec![
            "-ss".to_string(),
            SAMPLE_START_SECS.to_string(),
            "-i".to_string(),
            input.display().to_string(),
            "-vframes".to_string(),
            SAMPLE_FRAMES.to_string(),
            "-vf".to_string(),
            "cropdetect".to_string(),
            "-f".to_string(),
            "null".to_string(),
            "-".to_string(),
        ];
        let out = self
            .runner
            .run(&self.config.tools.ffmpeg, &args, "ffmpeg", logger)?;
        Ok(parse_crop_output(&out.output))
    }
}

fn parse_stream(stream: &Value) -> ProbedStream {
    let disposition = stream.get("disposition");
    let flag = |name: &str| {
        disposition
            .and_then(|d| d.get(name))
            .and_then(Value::as_u64)
            .unwrap_or(0)
            == 1
    };
    ProbedStream {
        index: stream.get("index").and_then(Value::as_u64).unwrap_or(0) as u32,
        codec_type: stream
            .get("codec_type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        width: stream.get("width").and_then(Value::as_u64).map(|w| w as u32),
        height: stream.get("height").and_then(Value::as_u64).map(|h| h as u32),
        avg_frame_rate: stream
            .get("avg_frame_rate")
            .and_then(Value::as_str)
            .map(str::to_string),
        pix_fmt: stream
            .get("pix_fmt")
            .and_then(Value::as_str)
            .map(str::to_string),
        field_order: stream
            .get("field_order")
            .and_then(Value::as_str)
            .map(str::to_string),
        language: stream
            .get("tags")
            .and_then(|t| t.get("language"))
            .and_then(Value::as_str)
            .filter(|l| !l.is_empty())
            .map(str::to_string),
        forced: flag("forced"),
        default: flag("default"),
    }
}

/// Pick the longest `crop=w:h:x:y` parameter emitted by cropdetect.
/// Longer is more specific; cropdetect repeats its current estimate per
/// sampled frame.
fn parse_crop_output(output: &str) -> String {
    output
        .lines()
        .filter_map(|line| line.split_once("crop=").map(|(_, rest)| rest))
        .map(|rest| rest.split_whitespace().next().unwrap_or(""))
        .max_by_key(|crop| crop.len())
        .unwrap_or("")
        .to_string()
}
