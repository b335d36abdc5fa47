//! The eight conversion stages, one file each.

mod combine;
mod create_left_right;
mod create_mkv;
mod extract_streams;
mod final_file;
mod move_files;
mod transcode_audio;
mod upscale_video;

pub use combine::CombineToMvHevcStage;
pub use create_left_right::CreateLeftRightStage;
pub use create_mkv::CreateMkvStage;
pub use extract_streams::ExtractStreamsStage;
pub use final_file::CreateFinalFileStage;
pub use move_files::MoveFilesStage;
pub use transcode_audio::TranscodeAudioStage;
pub use upscale_video::UpscaleVideoStage;
