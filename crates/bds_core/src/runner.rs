//! Batch job runner.
//!
//! Iterates source items, probes each one, prepares its working
//! directory and drives the pipeline. One item's failure never aborts
//! the batch; the report records per-item outcomes and the CLI decides
//! the exit code from it.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;

use crate::artifacts::{ArtifactStore, WorkDirLock};
use crate::config::{ConfigError, JobConfig};
use crate::fsutil::{file_exists_normalized, remove_dir_if_exists, sanitize_filename};
use crate::logging::{JobLogger, LogConfig};
use crate::models::{DiscInfo, SourceItem, Stage};
use crate::pipeline::{CancelHandle, Context, Pipeline, PipelineError};
use crate::tools::{CommandRunner, Ffmpeg, MakeMkv};

/// What to convert: one item, or every supported file under a folder.
#[derive(Debug, Clone)]
pub enum SourceSpec {
    Single(SourceItem),
    Folder(PathBuf),
}

/// Successful end state of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Conversion ran; final file is at the contained path.
    Converted(PathBuf),
    /// A finished output already existed and overwrite was unset.
    SkippedExisting(PathBuf),
}

/// Per-item record in the batch report.
pub struct JobReport {
    pub item: String,
    pub outcome: Result<JobOutcome, PipelineError>,
}

/// Outcome of a whole batch.
#[derive(Default)]
pub struct BatchReport {
    pub jobs: Vec<JobReport>,
}

impl BatchReport {
    pub fn failures(&self) -> usize {
        self.jobs.iter().filter(|j| j.outcome.is_err()).count()
    }

    pub fn converted(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| matches!(j.outcome, Ok(JobOutcome::Converted(_))))
            .count()
    }

    /// Whether the process should exit non-zero.
    pub fn is_failure(&self, config: &JobConfig) -> bool {
        self.failures() > 0 && !config.continue_on_error
    }
}

/// Holds the machine awake for the life of the guard.
///
/// Best effort: when `caffeinate` is unavailable the guard is inert.
struct KeepAwake {
    child: Option<Child>,
}

impl KeepAwake {
    fn engage(enabled: bool) -> Self {
        if !enabled || which::which("caffeinate").is_err() {
            return Self { child: None };
        }
        let child = Command::new("caffeinate")
            .args(["-d", "-i", "-m", "-s"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .ok();
        Self { child }
    }
}

impl Drop for KeepAwake {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Builds the pipeline an item runs through.
type PipelineFactory = Box<dyn Fn(CancelHandle) -> Pipeline + Send + Sync>;

/// Replaces the external-tool probe with a caller-supplied one.
type ProbeOverride = Box<dyn Fn(&SourceItem) -> Result<DiscInfo, String> + Send + Sync>;

/// Runs batches of conversion jobs.
pub struct JobRunner {
    config: JobConfig,
    cancel: CancelHandle,
    pipeline_factory: PipelineFactory,
    probe_override: Option<ProbeOverride>,
}

impl JobRunner {
    /// Validates the configuration up front; nothing runs on invalid
    /// settings.
    pub fn new(config: JobConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancelHandle::new(),
            pipeline_factory: Box::new(Pipeline::standard),
            probe_override: None,
        })
    }

    /// Swap the pipeline items run through. Embedders (and the batch
    /// tests) drive the runner with their own stage set.
    pub fn with_pipeline_factory(
        mut self,
        factory: impl Fn(CancelHandle) -> Pipeline + Send + Sync + 'static,
    ) -> Self {
        self.pipeline_factory = Box::new(factory);
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    fn log_dir(&self) -> PathBuf {
        self.config.output_root.join(".logs")
    }

    /// Convert everything named by `spec`.
    pub fn run(&self, spec: &SourceSpec) -> BatchReport {
        let _awake = KeepAwake::engage(self.config.keep_awake);
        let items = match spec {
            SourceSpec::Single(item) => vec![item.clone()],
            SourceSpec::Folder(folder) => discover_items(folder),
        };

        let mut report = BatchReport::default();
        for item in items {
            if self.cancel.is_cancelled() {
                break;
            }
            tracing::info!(source = %item, "processing");
            let outcome = self.run_item(&item);
            if let Err(e) = &outcome {
                tracing::error!(source = %item, "{e}");
            }
            report.jobs.push(JobReport {
                item: item.to_string(),
                outcome,
            });
        }
        report
    }

    fn run_item(&self, item: &SourceItem) -> Result<JobOutcome, PipelineError> {
        let probe_name = sanitize_filename(&item.fallback_name());
        let runner = CommandRunner::new(self.config.output_commands, self.cancel.clone());

        let log_config = if self.config.output_commands {
            LogConfig::verbose()
        } else {
            LogConfig::default()
        };
        let probe_logger = JobLogger::new(&probe_name, self.log_dir(), log_config.clone())
            .map_err(|e| PipelineError::setup(&probe_name, format!("cannot open log: {e}")))?;

        let disc = self
            .probe(item, &runner, &probe_logger)
            .map_err(|e| PipelineError::setup(&probe_name, e))?;
        probe_logger.close();

        let name = disc.name.clone();
        let work_dir = self.config.output_root.join(&name);

        if let Some(existing) = self.existing_output(&name) {
            tracing::info!(item = %name, "output already exists, skipping");
            // A leftover empty working directory from an earlier run is
            // noise; only an empty one is removed.
            let _ = fs::remove_dir(&work_dir);
            return Ok(JobOutcome::SkippedExisting(existing));
        }

        if self.config.effective_start_stage() == Stage::first() {
            remove_dir_if_exists(&work_dir);
        }
        fs::create_dir_all(&work_dir)
            .map_err(|e| PipelineError::setup(&name, format!("cannot create work dir: {e}")))?;

        let _lock = WorkDirLock::acquire(&work_dir).map_err(|_| {
            PipelineError::setup(
                &name,
                format!(
                    "working directory {} is locked by another run",
                    work_dir.display()
                ),
            )
        })?;

        let logger = Arc::new(
            JobLogger::new(&name, self.log_dir(), log_config)
                .map_err(|e| PipelineError::setup(&name, format!("cannot open log: {e}")))?,
        );

        let ctx = Context {
            config: self.config.clone(),
            item: item.clone(),
            disc,
            work_dir: work_dir.clone(),
            output_root: self.config.output_root.clone(),
            logger: logger.clone(),
            runner,
        };
        let mut store = ArtifactStore::new(&work_dir, &name);
        let pipeline = (self.pipeline_factory)(self.cancel.clone());
        let result = pipeline.run(&ctx, &mut store);
        logger.close();
        result?;

        if self.config.remove_original {
            self.remove_original(item);
        }
        Ok(JobOutcome::Converted(ctx.final_destination()))
    }

    /// The final destination, when it already exists and overwrite is
    /// unset. Name matching tolerates underscore/space drift between
    /// ripper versions.
    fn existing_output(&self, name: &str) -> Option<PathBuf> {
        if self.config.overwrite {
            return None;
        }
        let destination = self.config.output_root.join(format!("{name}_AVP.mov"));
        file_exists_normalized(&destination).then_some(destination)
    }

    fn probe(
        &self,
        item: &SourceItem,
        runner: &CommandRunner,
        logger: &JobLogger,
    ) -> Result<DiscInfo, String> {
        let mut disc = match (&self.probe_override, item) {
            (Some(probe), _) => probe(item)?,
            (None, SourceItem::Stream(path)) => {
                let name = sanitize_filename(&item.fallback_name());
                Ffmpeg::new(runner, &self.config)
                    .stream_info(path, name, logger)
                    .map_err(|e| e.to_string())?
            }
            (None, _) => MakeMkv::new(runner, &self.config)
                .disc_info(item, logger)
                .map_err(|e| e.to_string())?,
        };

        if disc.name == DiscInfo::default().name || disc.name.is_empty() {
            disc.name = sanitize_filename(&item.fallback_name());
        }
        if !self.config.resolution.is_empty() {
            disc.resolution = self.config.resolution.clone();
        }
        if !self.config.frame_rate.is_empty() {
            disc.frame_rate = self.config.frame_rate.clone();
        }
        Ok(disc)
    }

    fn remove_original(&self, item: &SourceItem) {
        let Some(path) = item.path() else { return };
        if path.is_dir() {
            remove_dir_if_exists(path);
        } else {
            let _ = fs::remove_file(path);
        }
        tracing::info!(source = %item, "removed original source");
    }
}

/// Recursively find convertible files under a folder, in stable order.
fn discover_items(folder: &Path) -> Vec<SourceItem> {
    walkdir::WalkDir::new(folder)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| SourceItem::from_path(e.path()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactRole;
    use crate::pipeline::{ConversionStage, StageError, StageOutcome, StageResult};
    use tempfile::TempDir;

    #[test]
    fn discovery_finds_supported_files_recursively() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("a.iso"), b"x").unwrap();
        fs::write(dir.path().join("nested/b.mkv"), b"x").unwrap();
        fs::write(dir.path().join("nested/c.m2ts"), b"x").unwrap();
        fs::write(dir.path().join("readme.txt"), b"x").unwrap();
        fs::write(dir.path().join("cover.jpg"), b"x").unwrap();

        let items = discover_items(dir.path());
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let config = JobConfig {
            fov: 0,
            ..JobConfig::default()
        };
        assert!(JobRunner::new(config).is_err());
    }

    #[test]
    fn existing_output_is_skipped_without_overwrite() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("My Movie_AVP.mov"), b"done").unwrap();

        let config = JobConfig {
            output_root: root.path().to_path_buf(),
            ..JobConfig::default()
        };
        let runner = JobRunner::new(config).unwrap();
        // Spacing drift between runs still counts as existing.
        assert!(runner.existing_output("My_Movie").is_some());
        assert!(runner.existing_output("Other").is_none());
    }

    #[test]
    fn overwrite_disables_the_existing_output_check() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("Movie_AVP.mov"), b"done").unwrap();

        let config = JobConfig {
            output_root: root.path().to_path_buf(),
            overwrite: true,
            ..JobConfig::default()
        };
        let runner = JobRunner::new(config).unwrap();
        assert!(runner.existing_output("Movie").is_none());
    }

    struct FlakyTranscode {
        fail_for: &'static str,
    }

    impl ConversionStage for FlakyTranscode {
        fn id(&self) -> Stage {
            Stage::TranscodeAudio
        }

        fn outputs(&self, _config: &JobConfig) -> Vec<ArtifactRole> {
            Vec::new()
        }

        fn execute(&self, ctx: &Context, _store: &mut ArtifactStore) -> StageResult<StageOutcome> {
            if ctx.item_name() == self.fail_for {
                Err(StageError::precondition("no PCM audio to transcode"))
            } else {
                Ok(StageOutcome::Completed)
            }
        }
    }

    #[test]
    fn batch_continues_past_a_failing_item_and_names_the_stage() {
        let sources = TempDir::new().unwrap();
        for name in ["alpha.mkv", "beta.mkv", "gamma.mkv"] {
            fs::write(sources.path().join(name), b"matroska").unwrap();
        }
        let root = TempDir::new().unwrap();

        let config = JobConfig {
            output_root: root.path().to_path_buf(),
            transcode_audio: true,
            ..JobConfig::default()
        };
        let mut runner = JobRunner::new(config)
            .unwrap()
            .with_pipeline_factory(|cancel| {
                Pipeline::new(cancel).with_stage(FlakyTranscode { fail_for: "beta" })
            });
        runner.probe_override = Some(Box::new(|item: &SourceItem| {
            Ok(DiscInfo {
                name: item.fallback_name(),
                ..DiscInfo::default()
            })
        }));

        let report = runner.run(&SourceSpec::Folder(sources.path().to_path_buf()));

        assert_eq!(report.jobs.len(), 3);
        assert_eq!(report.converted(), 2);
        assert_eq!(report.failures(), 1);

        let failed = report.jobs.iter().find(|j| j.outcome.is_err()).unwrap();
        assert!(failed.item.ends_with("beta.mkv"));
        let err = failed.outcome.as_ref().unwrap_err();
        assert_eq!(err.failed_stage(), Some(Stage::TranscodeAudio));
    }

    #[test]
    fn batch_report_counts_and_exit_policy() {
        let mut report = BatchReport::default();
        report.jobs.push(JobReport {
            item: "a.mkv".to_string(),
            outcome: Ok(JobOutcome::Converted(PathBuf::from("/out/a_AVP.mov"))),
        });
        report.jobs.push(JobReport {
            item: "b.mkv".to_string(),
            outcome: Err(PipelineError::setup("b", "no MVC stream")),
        });

        assert_eq!(report.converted(), 1);
        assert_eq!(report.failures(), 1);

        let strict = JobConfig::default();
        assert!(report.is_failure(&strict));

        let tolerant = JobConfig {
            continue_on_error: true,
            ..JobConfig::default()
        };
        assert!(!report.is_failure(&tolerant));
    }
}
