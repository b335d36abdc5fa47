//! MakeMKV adapter: disc probing and title ripping.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::JobConfig;
use crate::logging::JobLogger;
use crate::models::{parse_robot_output, select_main_mvc_title, DiscInfo, SourceItem};

use super::runner::{CommandRunner, ToolError};

/// Output lines that indicate a failed or corrupted rip even when
/// makemkvcon exits zero.
const RIP_ERROR_MARKERS: &[&str] = &[
    "corrupt or invalid",
    "video frame timecode differs",
    "secondary stream video frame timecode differs",
];

/// Benign noise stripped from rip output before it is surfaced in an
/// error message.
const RIP_NOISE_FILTERS: &[&str] = &[
    "which is less than minimum title length",
    "Debug logging",
    "AnyDVD",
    "MakeMKV",
    "Do you want to continue anyway",
    "AACS directory not present",
    "Evaluation version",
    "Using direct disc access mode",
    "Program reads data faster than it can write to disk",
];

/// Conversion profile template. Keeps the MVC video stream and selects
/// audio/subtitle tracks for the configured language; `{lang}` is
/// substituted at write time. With remove-extra-languages the leading
/// `+sel:all` flips to `-sel:all` so only matching tracks survive.
const PROFILE_TEMPLATE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<profile>
  <name lang="eng">bd-spatial</name>
  <Profile name="bd-spatial" description="3D Blu-ray rip preserving MVC video">
    <Input OpenMultiplexedTitles="true" />
    <Output>
      <Format name="mkv" />
    </Output>
  </Profile>
  <TrackSelection>
    <Selection>+sel:all,+sel:mvcvideo,+sel:(audio&amp;{lang}),+sel:(subtitle&amp;{lang}),=100:all</Selection>
  </TrackSelection>
</profile>
"#;

/// makemkvcon wrapper.
pub struct MakeMkv<'a> {
    runner: &'a CommandRunner,
    config: &'a JobConfig,
}

impl<'a> MakeMkv<'a> {
    pub fn new(runner: &'a CommandRunner, config: &'a JobConfig) -> Self {
        Self { runner, config }
    }

    /// Probe the source with `makemkvcon --robot info` and pick the
    /// longest title with an MVC stream.
    pub fn disc_info(
        &self,
        source: &SourceItem,
        logger: &JobLogger,
    ) -> Result<DiscInfo, ToolError> {
        let mut args = vec!["--robot".to_string()];
        if !matches!(source, SourceItem::Disc(_)) {
            args.push("--noscan".to_string());
        }
        args.push("info".to_string());
        args.push(source.makemkv_arg());

        let out = self
            .runner
            .run(&self.config.tools.makemkvcon, &args, "makemkvcon", logger)?;

        let (disc_name, titles) = parse_robot_output(&out.output);
        select_main_mvc_title(disc_name, &titles).map_err(|e| ToolError::OutputInvalid {
            tool: "makemkvcon".to_string(),
            message: e.to_string(),
        })
    }

    /// Rip the main title into `output_folder` using a per-run
    /// conversion profile.
    ///
    /// makemkvcon routinely exits zero on partially-failed rips, so the
    /// captured output is also scanned for known error markers unless
    /// continue-on-error is set.
    pub fn rip_title(
        &self,
        source: &SourceItem,
        disc: &DiscInfo,
        output_folder: &Path,
        logger: &JobLogger,
    ) -> Result<(), ToolError> {
        let profile_path = self.write_profile(output_folder)?;

        let mut args = vec![format!("--profile={}", profile_path.display())];
        if !matches!(source, SourceItem::Disc(_)) {
            args.push("--noscan".to_string());
        }
        args.push("mkv".to_string());
        args.push(source.makemkv_arg());
        args.push(disc.main_title.to_string());
        args.push(output_folder.display().to_string());

        let out = self
            .runner
            .run(&self.config.tools.makemkvcon, &args, "makemkvcon", logger)?;

        if self.config.continue_on_error {
            return Ok(());
        }
        if RIP_ERROR_MARKERS.iter().any(|m| out.output.contains(m)) {
            return Err(ToolError::OutputInvalid {
                tool: "makemkvcon".to_string(),
                message: format!(
                    "rip reported stream errors:\n{}",
                    filter_noise(&out.output)
                ),
            });
        }
        Ok(())
    }

    fn write_profile(&self, output_folder: &Path) -> Result<PathBuf, ToolError> {
        let mut content = PROFILE_TEMPLATE.replace("{lang}", &self.config.language_code);
        if self.config.remove_extra_languages {
            content = content.replace("+sel:all", "-sel:all");
        }
        let path = output_folder.join("custom_profile.mmcp.xml");
        fs::write(&path, content).map_err(|e| ToolError::Io {
            tool: "makemkvcon".to_string(),
            source: e,
        })?;
        Ok(path)
    }
}

fn filter_noise(output: &str) -> String {
    output
        .lines()
        .filter(|line| !RIP_NOISE_FILTERS.iter().any(|f| line.contains(f)))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_lines_are_filtered() {
        let output = "real error line\nEvaluation version, 30 days left\nanother real line";
        let filtered = filter_noise(output);
        assert!(filtered.contains("real error line"));
        assert!(filtered.contains("another real line"));
        assert!(!filtered.contains("Evaluation"));
    }

    #[test]
    fn profile_substitutes_language() {
        let content = PROFILE_TEMPLATE.replace("{lang}", "fra");
        assert!(content.contains("audio&amp;fra"));
        assert!(content.contains("+sel:all"));
    }

    #[test]
    fn remove_extra_languages_flips_selector() {
        let content = PROFILE_TEMPLATE
            .replace("{lang}", "eng")
            .replace("+sel:all", "-sel:all");
        assert!(content.contains("-sel:all"));
        assert!(!content.contains("+sel:all"));
    }
}
