//! pgsrip adapter: OCR PGS subtitles in an MKV into SRT files.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::JobConfig;
use crate::logging::JobLogger;

use super::runner::{CommandRunner, ToolError};

pub struct SubtitleOcr<'a> {
    runner: &'a CommandRunner,
    config: &'a JobConfig,
}

impl<'a> SubtitleOcr<'a> {
    pub fn new(runner: &'a CommandRunner, config: &'a JobConfig) -> Self {
        Self { runner, config }
    }

    /// OCR the PGS tracks of `mkv` and collect resulting .srt files from
    /// the working directory. Empty results are deleted and not
    /// reported; OCR on stylized subs regularly produces nothing usable.
    pub fn rip_to_srt(
        &self,
        mkv: &Path,
        work_dir: &Path,
        logger: &JobLogger,
    ) -> Result<Vec<PathBuf>, ToolError> {
        // Stale results from an earlier attempt would be collected as
        // fresh output.
        for srt in srt_files(work_dir) {
            let _ = fs::remove_file(srt);
        }

        let args = vec![
            "--language".to_string(),
            self.config.language_code.clone(),
            "--force".to_string(),
            mkv.display().to_string(),
        ];
        self.runner
            .run(&self.config.tools.pgsrip, &args, "pgsrip", logger)?;

        let mut produced = Vec::new();
        for srt in srt_files(work_dir) {
            let size = fs::metadata(&srt).map(|m| m.len()).unwrap_or(0);
            if size == 0 {
                logger.debug(&format!(
                    "dropping empty OCR result {}",
                    srt.file_name().unwrap_or_default().to_string_lossy()
                ));
                let _ = fs::remove_file(&srt);
            } else {
                produced.push(srt);
            }
        }
        produced.sort();
        Ok(produced)
    }
}

fn srt_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("srt"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn finds_only_srt_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.srt"), b"1").unwrap();
        fs::write(dir.path().join("b.SRT"), b"1").unwrap();
        fs::write(dir.path().join("c.sup"), b"1").unwrap();

        let found = srt_files(dir.path());
        assert_eq!(found.len(), 2);
    }
}
