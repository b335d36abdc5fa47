//! External tool adapters.
//!
//! One adapter per tool, all built on the shared [`CommandRunner`].
//! Adapters translate a narrow intent ("rip title N to folder P") into a
//! process invocation and a typed result; they hold no state between
//! calls. Failure classification lives in [`ToolError`].

mod ffmpeg;
mod frim;
mod makemkv;
mod mp4box;
mod ocr;
mod runner;
mod spatial;
mod upscale;

pub use ffmpeg::{EncodeParams, Ffmpeg, ProbedStream, SubtitleTrack};
pub use frim::{FrimDecoder, SplitRequest, DEFAULT_DECODE_TIMEOUT};
pub use makemkv::MakeMkv;
pub use mp4box::Mp4Box;
pub use ocr::SubtitleOcr;
pub use runner::{CommandOutput, CommandRunner, ToolError};
pub use spatial::SpatialMediaTool;
pub use upscale::FxUpscale;
