//! Stage 2: demux the source container.
//!
//! The MVC video goes out as an Annex B elementary stream, the first
//! audio track as 24-bit PCM. Subtitles are OCRed from the PGS tracks
//! in a single external pgsrip call; the best result is renamed into
//! the deterministic subtitle slot.

use std::fs;
use std::path::{Path, PathBuf};

use crate::artifacts::{ArtifactRole, ArtifactStore};
use crate::config::JobConfig;
use crate::models::Stage;
use crate::pipeline::{ConversionStage, Context, StageError, StageOutcome, StageResult};
use crate::tools::{Ffmpeg, SubtitleOcr};

pub struct ExtractStreamsStage;

impl ExtractStreamsStage {
    fn extract_subtitles(&self, ctx: &Context, store: &mut ArtifactStore) -> StageResult<()> {
        let mkv = store.require(ArtifactRole::SourceMkv)?;
        let ffmpeg = Ffmpeg::new(&ctx.runner, &ctx.config);

        let tracks = ffmpeg.subtitle_tracks(&mkv, &ctx.logger)?;
        if tracks.is_empty() {
            if ctx.config.continue_on_error {
                ctx.logger.warn("no subtitle tracks found in source");
                return Ok(());
            }
            return Err(StageError::precondition(
                "no subtitle tracks found in source",
            ));
        }

        let forced_language = tracks.iter().find(|t| t.forced).map(|t| t.language.clone());

        let ocr = SubtitleOcr::new(&ctx.runner, &ctx.config);
        let mut produced = ocr.rip_to_srt(&mkv, &ctx.work_dir, &ctx.logger)?;
        if let Some(language) = &forced_language {
            mark_forced_result(&mut produced, language)?;
        }
        let Some(best) = pick_subtitle(&produced, &ctx.config.language_code) else {
            if ctx.config.continue_on_error {
                ctx.logger.warn("no usable SRT subtitles produced");
                return Ok(());
            }
            return Err(StageError::invalid_output(
                "no SRT subtitle files with data created",
            ));
        };

        let target = store.path_for(ArtifactRole::Subtitles);
        if best != target {
            fs::rename(&best, &target).map_err(|e| StageError::io("rename subtitle file", e))?;
        }
        store.put(ArtifactRole::Subtitles, target);
        Ok(())
    }
}

/// pgsrip names its results with the ISO 639-1 code; map the configured
/// 639-2 code onto it. Codes whose 639-1 form is not a simple prefix
/// (jpn, ger, chi, swe, ...) need the table.
fn alpha2(language_code: &str) -> &str {
    match language_code {
        "eng" => "en",
        "fre" | "fra" => "fr",
        "ger" | "deu" => "de",
        "spa" => "es",
        "ita" => "it",
        "jpn" => "ja",
        "chi" | "zho" => "zh",
        "kor" => "ko",
        "por" => "pt",
        "rus" => "ru",
        "dut" | "nld" => "nl",
        "swe" => "sv",
        "nor" => "no",
        "dan" => "da",
        "fin" => "fi",
        "pol" => "pl",
        "cze" | "ces" => "cs",
        "gre" | "ell" => "el",
        "hun" => "hu",
        "tur" => "tr",
        "ara" => "ar",
        "heb" => "he",
        "tha" => "th",
        other => &other[..other.len().min(2)],
    }
}

fn file_name_contains(path: &Path, needle: &str) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().contains(needle))
        .unwrap_or(false)
}

/// Rename the forced track's SRT with a `.forced.` stem marker so it
/// stays distinguishable from the full subtitle file.
fn mark_forced_result(produced: &mut [PathBuf], forced_language: &str) -> StageResult<()> {
    let needle = format!(".{}.", alpha2(forced_language));
    let Some(slot) = produced
        .iter()
        .position(|p| file_name_contains(p, &needle) && !file_name_contains(p, ".forced."))
    else {
        return Ok(());
    };
    let marked = format!(".forced{needle}");
    let file_name = produced[slot]
        .file_name()
        .map(|n| n.to_string_lossy().replace(&needle, &marked))
        .unwrap_or_default();
    let renamed = produced[slot].with_file_name(file_name);
    fs::rename(&produced[slot], &renamed)
        .map_err(|e| StageError::io("mark forced subtitle file", e))?;
    produced[slot] = renamed;
    Ok(())
}

/// Prefer the full result in the configured language over its forced
/// variant, falling back to any language match and then the first file.
fn pick_subtitle(produced: &[PathBuf], language_code: &str) -> Option<PathBuf> {
    let needle = format!(".{}.", alpha2(language_code));
    produced
        .iter()
        .find(|p| file_name_contains(p, &needle) && !file_name_contains(p, ".forced."))
        .or_else(|| produced.iter().find(|p| file_name_contains(p, &needle)))
        .or_else(|| produced.first())
        .cloned()
}

impl ConversionStage for ExtractStreamsStage {
    fn id(&self) -> Stage {
        Stage::ExtractStreams
    }

    fn outputs(&self, _config: &JobConfig) -> Vec<ArtifactRole> {
        // Subtitles are conditional and may legitimately not exist, so
        // they are not declared for resume/validation.
        vec![ArtifactRole::MvcVideo, ArtifactRole::PcmAudio]
    }

    fn execute(&self, ctx: &Context, store: &mut ArtifactStore) -> StageResult<StageOutcome> {
        let source = store.require(ArtifactRole::SourceMkv)?;
        let video_out = store.path_for(ArtifactRole::MvcVideo);
        let audio_out = store.path_for(ArtifactRole::PcmAudio);

        let ffmpeg = Ffmpeg::new(&ctx.runner, &ctx.config);
        ffmpeg.extract_streams(&source, &video_out, &audio_out, None, &ctx.logger)?;

        // PGS OCR needs a Matroska container; raw transport streams
        // carry no usable subtitle tracks.
        if !ctx.config.skip_subtitles && !ctx.item.is_stream() {
            self.extract_subtitles(ctx, store)?;
        }
        Ok(StageOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtitle_selection_prefers_language_match() {
        let produced = vec![
            PathBuf::from("/w/Movie.fr.srt"),
            PathBuf::from("/w/Movie.en.srt"),
        ];
        assert_eq!(
            pick_subtitle(&produced, "eng").unwrap(),
            PathBuf::from("/w/Movie.en.srt")
        );
    }

    #[test]
    fn subtitle_selection_falls_back_to_first() {
        let produced = vec![PathBuf::from("/w/Movie.de.srt")];
        assert_eq!(
            pick_subtitle(&produced, "eng").unwrap(),
            PathBuf::from("/w/Movie.de.srt")
        );
        assert!(pick_subtitle(&[], "eng").is_none());
    }

    #[test]
    fn subtitle_selection_maps_bibliographic_codes() {
        let produced = vec![
            PathBuf::from("/w/Movie.en.srt"),
            PathBuf::from("/w/Movie.ja.srt"),
        ];
        assert_eq!(
            pick_subtitle(&produced, "jpn").unwrap(),
            PathBuf::from("/w/Movie.ja.srt")
        );

        let produced = vec![
            PathBuf::from("/w/Movie.sv.srt"),
            PathBuf::from("/w/Movie.de.srt"),
        ];
        assert_eq!(
            pick_subtitle(&produced, "ger").unwrap(),
            PathBuf::from("/w/Movie.de.srt")
        );
        assert_eq!(
            pick_subtitle(&produced, "swe").unwrap(),
            PathBuf::from("/w/Movie.sv.srt")
        );
    }

    #[test]
    fn subtitle_selection_prefers_full_over_forced() {
        let produced = vec![
            PathBuf::from("/w/Movie.forced.en.srt"),
            PathBuf::from("/w/Movie.en.srt"),
        ];
        assert_eq!(
            pick_subtitle(&produced, "eng").unwrap(),
            PathBuf::from("/w/Movie.en.srt")
        );

        // With no full variant the forced one still beats an unrelated
        // language.
        let produced = vec![
            PathBuf::from("/w/Movie.fr.srt"),
            PathBuf::from("/w/Movie.forced.en.srt"),
        ];
        assert_eq!(
            pick_subtitle(&produced, "eng").unwrap(),
            PathBuf::from("/w/Movie.forced.en.srt")
        );
    }

    #[test]
    fn forced_track_result_is_marked() {
        let dir = tempfile::TempDir::new().unwrap();
        let original = dir.path().join("Movie.en.srt");
        fs::write(&original, b"1\n00:00:01,000 --> 00:00:02,000\nHi\n").unwrap();
        let mut produced = vec![original.clone()];

        mark_forced_result(&mut produced, "eng").unwrap();

        let marked = dir.path().join("Movie.forced.en.srt");
        assert_eq!(produced, vec![marked.clone()]);
        assert!(marked.exists());
        assert!(!original.exists());

        // Already-marked files are left alone.
        mark_forced_result(&mut produced, "eng").unwrap();
        assert!(marked.exists());
    }
}
