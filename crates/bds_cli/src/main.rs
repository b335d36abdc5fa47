//! bd-spatial command line interface.
//!
//! Thin shell: parse flags, fold them over saved defaults into a
//! `JobConfig`, hand everything to the runner and turn the batch report
//! into an exit code.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use bds_core::config::{DefaultsFile, JobConfig};
use bds_core::logging::{init_tracing, LogLevel};
use bds_core::models::{SourceItem, Stage};
use bds_core::runner::{JobOutcome, JobRunner, SourceSpec};

/// Convert 3D Blu-ray MVC sources into MV-HEVC spatial video.
#[derive(Parser, Debug)]
#[command(name = "bd-spatial", version = bds_core::version(), about)]
struct Cli {
    /// Source to convert: disc:N, or a path to an .iso/.img/.bin/.mkv/.mts/.m2ts file.
    #[arg(long, conflicts_with = "source_folder", required_unless_present = "source_folder")]
    source: Option<String>,

    /// Convert every supported file under this folder, recursively.
    #[arg(long)]
    source_folder: Option<PathBuf>,

    /// Root folder for final outputs and working directories.
    #[arg(long)]
    output_root: Option<PathBuf>,

    /// Replace an existing final output instead of skipping the item.
    #[arg(long)]
    overwrite: bool,

    /// Delete the source file after a successful conversion.
    #[arg(long)]
    remove_original: bool,

    /// Keep intermediate files after completion.
    #[arg(long)]
    keep_files: bool,

    /// Transcode PCM audio to AAC.
    #[arg(long)]
    transcode_audio: bool,

    /// AAC bitrate in kb/s.
    #[arg(long)]
    audio_bitrate: Option<u32>,

    /// Per-eye HEVC bitrate in Mb/s.
    #[arg(long)]
    left_right_bitrate: Option<u32>,

    /// MV-HEVC encoder quality (0-100).
    #[arg(long)]
    mv_hevc_quality: Option<u32>,

    /// Horizontal field of view in degrees.
    #[arg(long)]
    fov: Option<u32>,

    /// Frame rate override (detected from the source when omitted).
    #[arg(long)]
    frame_rate: Option<String>,

    /// Resolution override as WxH (detected from the source when omitted).
    #[arg(long)]
    resolution: Option<String>,

    /// Encode with libx265 instead of the hardware encoder.
    #[arg(long)]
    software_encoder: bool,

    /// Swap the left and right eye streams.
    #[arg(long)]
    swap_eyes: bool,

    /// Run the AI upscaler on the per-eye files.
    #[arg(long)]
    fx_upscale: bool,

    /// Skip subtitle extraction and OCR.
    #[arg(long)]
    skip_subtitles: bool,

    /// Detect and crop letterbox black bars.
    #[arg(long)]
    crop_black_bars: bool,

    /// Record failures and keep going instead of stopping the item.
    #[arg(long)]
    continue_on_error: bool,

    /// Echo each external command before running it.
    #[arg(long)]
    output_commands: bool,

    /// ISO 639-2 language code for audio/subtitle selection.
    #[arg(long)]
    language: Option<String>,

    /// Keep only tracks matching --language when ripping.
    #[arg(long)]
    remove_extra_languages: bool,

    /// Resume from this stage; earlier stages are assumed satisfied.
    #[arg(long, value_parser = clap::value_parser!(Stage))]
    start_stage: Option<Stage>,

    /// Allow the machine to sleep during processing.
    #[arg(long)]
    no_keep_awake: bool,

    /// Persist the effective options as defaults for future runs.
    #[arg(long)]
    save_defaults: bool,

    /// Defaults file location.
    #[arg(long)]
    defaults_file: Option<PathBuf>,
}

impl Cli {
    fn defaults_path(&self) -> PathBuf {
        if let Some(path) = &self.defaults_file {
            return path.clone();
        }
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config/bd-spatial/defaults.toml")
    }

    /// Fold CLI flags over the saved defaults. Boolean flags only turn
    /// features on; persisted values are changed by re-saving.
    fn into_config(self, base: JobConfig) -> JobConfig {
        let mut config = base;
        if let Some(root) = self.output_root {
            config.output_root = root;
        }
        config.overwrite |= self.overwrite;
        config.remove_original |= self.remove_original;
        config.keep_files |= self.keep_files;
        config.transcode_audio |= self.transcode_audio;
        if let Some(v) = self.audio_bitrate {
            config.audio_bitrate = v;
        }
        if let Some(v) = self.left_right_bitrate {
            config.left_right_bitrate = v;
        }
        if let Some(v) = self.mv_hevc_quality {
            config.mv_hevc_quality = v;
        }
        if let Some(v) = self.fov {
            config.fov = v;
        }
        if let Some(v) = self.frame_rate {
            config.frame_rate = v;
        }
        if let Some(v) = self.resolution {
            config.resolution = v;
        }
        config.software_encoder |= self.software_encoder;
        config.swap_eyes |= self.swap_eyes;
        config.fx_upscale |= self.fx_upscale;
        config.skip_subtitles |= self.skip_subtitles;
        config.crop_black_bars |= self.crop_black_bars;
        config.continue_on_error |= self.continue_on_error;
        config.output_commands |= self.output_commands;
        if let Some(v) = self.language {
            config.language_code = v;
        }
        config.remove_extra_languages |= self.remove_extra_languages;
        if let Some(v) = self.start_stage {
            config.start_stage = Some(v);
        }
        if self.no_keep_awake {
            config.keep_awake = false;
        }
        config
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(if cli.output_commands {
        LogLevel::Debug
    } else {
        LogLevel::Info
    });

    let defaults = DefaultsFile::new(cli.defaults_path());
    let base = match defaults.load() {
        Ok(saved) => saved.unwrap_or_default(),
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    let source = cli.source.clone();
    let source_folder = cli.source_folder.clone();
    let save_defaults = cli.save_defaults;
    let config = cli.into_config(base);

    let spec = match (source, source_folder) {
        (Some(spec), None) => match SourceItem::from_spec(&spec) {
            Ok(item) => SourceSpec::Single(item),
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::from(2);
            }
        },
        (None, Some(folder)) => SourceSpec::Folder(folder),
        // clap enforces exactly one of the two.
        _ => unreachable!("source selection enforced by clap"),
    };

    let runner = match JobRunner::new(config.clone()) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    if save_defaults {
        if let Err(e) = defaults.save(&config) {
            eprintln!("warning: could not save defaults: {e}");
        }
    }

    let report = runner.run(&spec);
    print_summary(&report);

    if report.is_failure(&config) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn print_summary(report: &bds_core::runner::BatchReport) {
    println!();
    println!("=== Summary ===");
    for job in &report.jobs {
        match &job.outcome {
            Ok(JobOutcome::Converted(path)) => {
                println!("[OK]   {} -> {}", job.item, path.display());
            }
            Ok(JobOutcome::SkippedExisting(path)) => {
                println!("[SKIP] {} (already at {})", job.item, path.display());
            }
            Err(e) => {
                println!("[FAIL] {}: {e}", job.item);
            }
        }
    }
    println!(
        "{} converted, {} failed, {} total",
        report.converted(),
        report.failures(),
        report.jobs.len()
    );
}
