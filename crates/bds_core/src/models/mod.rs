//! Core data model: source items, disc metadata, and pipeline stages.

mod disc;
mod source;
mod stage;

pub use disc::{parse_robot_output, select_main_mvc_title, DiscInfo, RobotParseError, TitleInfo};
pub use source::{SourceItem, IMAGE_EXTENSIONS, STREAM_EXTENSIONS};
pub use stage::{Stage, StageParseError};
