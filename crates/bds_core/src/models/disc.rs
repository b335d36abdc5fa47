//! Disc metadata and MakeMKV robot-output parsing.
//!
//! `makemkvcon --robot info` emits machine-readable CSV-ish lines:
//! `CINFO:<id>,<code>,"<value>"` for disc attributes, `TINFO:<title>,...`
//! for title attributes, and `SINFO:<title>,<stream>,...` for stream
//! attributes. We only care about the disc name, per-title duration, and
//! whether a title carries an MVC (stereo) video stream.

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fsutil::sanitize_filename;

/// Properties of the selected source title.
///
/// Defaults match a typical 3D Blu-ray feature; probed values override
/// them where available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscInfo {
    /// Sanitized disc/file name; names the working directory and output.
    pub name: String,
    /// Frame rate as ffmpeg accepts it (e.g. "23.976" or "24000/1001").
    pub frame_rate: String,
    /// "WxH" resolution of the base view.
    pub resolution: String,
    /// Bit depth of the video (8 or 10).
    pub color_depth: u32,
    /// MakeMKV title index of the main MVC title.
    pub main_title: u32,
    /// Set for interlaced transport streams.
    pub is_interlaced: bool,
}

impl Default for DiscInfo {
    fn default() -> Self {
        Self {
            name: "Unknown".to_string(),
            frame_rate: "23.976".to_string(),
            resolution: "1920x1080".to_string(),
            color_depth: 8,
            main_title: 0,
            is_interlaced: false,
        }
    }
}

/// Per-title facts gathered from robot output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleInfo {
    pub index: u32,
    /// Title duration in seconds.
    pub duration_secs: u64,
    /// True when any stream of the title reports an MVC codec.
    pub has_mvc: bool,
    pub resolution: Option<String>,
    pub frame_rate: Option<String>,
}

/// Error raised when no usable title can be derived from robot output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RobotParseError {
    #[error("no MVC (3D) video stream found on source")]
    NoMvcTitle,
}

/// Substrings that mark a stream line as MVC video. MakeMKV is not
/// consistent about the codec label across versions.
const MVC_MARKERS: &[&str] = &["mvc-3d", "mpeg4-mvc", "mvc video", "mvc high", "mpeg4 mvc"];

/// Parse `makemkvcon --robot info` output into a disc name and title list.
pub fn parse_robot_output(output: &str) -> (String, Vec<TitleInfo>) {
    // Compiled per call; info runs once per source item.
    let disc_name_re = Regex::new(r#"CINFO:2,0,"(.*?)""#).expect("static regex");
    let title_re = Regex::new(r"TINFO:(\d+),").expect("static regex");
    let duration_re = Regex::new(r#"TINFO:\d+,9,0,"(\d+):(\d+):(\d+)""#).expect("static regex");
    let resolution_re = Regex::new(r#"SINFO:\d+,1,19,0,"(\d+x\d+)""#).expect("static regex");
    let frame_rate_re = Regex::new(r#"SINFO:\d+,1,21,0,"(.*?)""#).expect("static regex");

    let mut disc_name = DiscInfo::default().name;
    let mut titles: Vec<TitleInfo> = Vec::new();
    let mut current: Option<usize> = None;

    for line in output.lines() {
        if line.starts_with("CINFO:2,0,") {
            if let Some(caps) = disc_name_re.captures(line) {
                let sanitized = sanitize_filename(&caps[1]);
                if !sanitized.is_empty() {
                    disc_name = sanitized;
                }
            }
        } else if line.starts_with("TINFO:") {
            if let Some(caps) = title_re.captures(line) {
                let index: u32 = caps[1].parse().unwrap_or(0);
                current = Some(match titles.iter().position(|t| t.index == index) {
                    Some(pos) => pos,
                    None => {
                        titles.push(TitleInfo {
                            index,
                            ..TitleInfo::default()
                        });
                        titles.len() - 1
                    }
                });
            }
            if let (Some(pos), Some(caps)) = (current, duration_re.captures(line)) {
                let h: u64 = caps[1].parse().unwrap_or(0);
                let m: u64 = caps[2].parse().unwrap_or(0);
                let s: u64 = caps[3].parse().unwrap_or(0);
                titles[pos].duration_secs = h * 3600 + m * 60 + s;
            }
        } else if line.starts_with("SINFO:") {
            let Some(pos) = current else { continue };
            let lower = line.to_ascii_lowercase();
            if MVC_MARKERS.iter().any(|m| lower.contains(m)) {
                titles[pos].has_mvc = true;
            }
            if let Some(caps) = resolution_re.captures(line) {
                titles[pos].resolution = Some(caps[1].to_string());
            }
            if let Some(caps) = frame_rate_re.captures(line) {
                titles[pos].frame_rate = Some(caps[1].to_string());
            }
        }
    }

    (disc_name, titles)
}

/// Pick the longest MVC-bearing title and fold its properties into a
/// [`DiscInfo`].
pub fn select_main_mvc_title(
    disc_name: String,
    titles: &[TitleInfo],
) -> Result<DiscInfo, RobotParseError> {
    let main = titles
        .iter()
        .filter(|t| t.has_mvc)
        .max_by_key(|t| t.duration_secs)
        .ok_or(RobotParseError::NoMvcTitle)?;

    let mut info = DiscInfo {
        name: disc_name,
        main_title: main.index,
        ..DiscInfo::default()
    };
    if let Some(resolution) = &main.resolution {
        info.resolution = resolution.clone();
    }
    if let Some(frame_rate) = &main.frame_rate {
        // MakeMKV reports e.g. "23.976 (24000/1001)"; keep the leading form.
        info.frame_rate = frame_rate
            .split_whitespace()
            .next()
            .unwrap_or(frame_rate)
            .to_string();
    }
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROBOT_SAMPLE: &str = r#"MSG:1005,0,1,"MakeMKV started","%1 started"
CINFO:2,0,"AVATAR 3D"
TINFO:0,9,0,"0:14:03"
SINFO:0,1,6,0,"Mpeg4 MVC High@L4.1"
SINFO:0,1,19,0,"1920x1080"
SINFO:0,1,21,0,"23.976 (24000/1001)"
TINFO:1,9,0,"2:41:57"
SINFO:1,1,6,0,"Mpeg4 MVC High@L4.1"
SINFO:1,1,19,0,"1920x1080"
SINFO:1,1,21,0,"23.976 (24000/1001)"
TINFO:2,9,0,"0:03:12"
SINFO:2,1,6,0,"Mpeg4 AVC High@L4.1"
"#;

    #[test]
    fn parses_disc_name_and_titles() {
        let (name, titles) = parse_robot_output(ROBOT_SAMPLE);
        assert_eq!(name, "AVATAR 3D");
        assert_eq!(titles.len(), 3);
        assert!(titles[0].has_mvc);
        assert!(titles[1].has_mvc);
        assert!(!titles[2].has_mvc);
        assert_eq!(titles[1].duration_secs, 2 * 3600 + 41 * 60 + 57);
    }

    #[test]
    fn longest_mvc_title_wins() {
        let (name, titles) = parse_robot_output(ROBOT_SAMPLE);
        let info = select_main_mvc_title(name, &titles).unwrap();
        assert_eq!(info.main_title, 1);
        assert_eq!(info.resolution, "1920x1080");
        assert_eq!(info.frame_rate, "23.976");
    }

    #[test]
    fn no_mvc_is_an_error() {
        let titles = vec![TitleInfo {
            index: 0,
            duration_secs: 100,
            has_mvc: false,
            ..TitleInfo::default()
        }];
        assert_eq!(
            select_main_mvc_title("X".into(), &titles),
            Err(RobotParseError::NoMvcTitle)
        );
    }

    #[test]
    fn disc_name_is_sanitized() {
        let output = "CINFO:2,0,\"My: Movie/3D?\"\n";
        let (name, _) = parse_robot_output(output);
        assert_eq!(name, "My Movie3D");
    }
}
