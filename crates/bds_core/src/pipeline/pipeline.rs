//! Pipeline runner executing stages in order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::artifacts::ArtifactStore;
use crate::models::Stage;

use super::context::Context;
use super::errors::{PipelineError, PipelineResult, StageError};
use super::stage::{ConversionStage, StageOutcome};
use super::stages;

/// Handle for cancelling a running pipeline.
///
/// Shared with the [`CommandRunner`](crate::tools::CommandRunner) so a
/// cancellation also terminates whatever external tool is running.
#[derive(Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Takes effect at the next stage boundary or
    /// runner poll, whichever comes first.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// How a stage was handled during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageRecord {
    Completed(Stage),
    /// Declared outputs were already present and valid.
    Reused(Stage),
    Skipped(Stage, String),
}

/// Per-stage accounting for one item.
#[derive(Debug, Default)]
pub struct PipelineRunResult {
    pub records: Vec<StageRecord>,
}

impl PipelineRunResult {
    pub fn completed(&self) -> Vec<Stage> {
        self.records
            .iter()
            .filter_map(|r| match r {
                StageRecord::Completed(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    pub fn reused(&self) -> Vec<Stage> {
        self.records
            .iter()
            .filter_map(|r| match r {
                StageRecord::Reused(s) => Some(*s),
                _ => None,
            })
            .collect()
    }
}

/// Ordered stage executor for one item.
pub struct Pipeline {
    stages: Vec<Box<dyn ConversionStage>>,
    cancel: CancelHandle,
}

impl Pipeline {
    pub fn new(cancel: CancelHandle) -> Self {
        Self {
            stages: Vec::new(),
            cancel,
        }
    }

    pub fn add_stage<S: ConversionStage + 'static>(&mut self, stage: S) -> &mut Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn with_stage<S: ConversionStage + 'static>(mut self, stage: S) -> Self {
        self.add_stage(stage);
        self
    }

    /// The full conversion in its fixed order.
    pub fn standard(cancel: CancelHandle) -> Self {
        Self::new(cancel)
            .with_stage(stages::CreateMkvStage)
            .with_stage(stages::ExtractStreamsStage)
            .with_stage(stages::CreateLeftRightStage)
            .with_stage(stages::UpscaleVideoStage)
            .with_stage(stages::CombineToMvHevcStage)
            .with_stage(stages::TranscodeAudioStage)
            .with_stage(stages::CreateFinalFileStage)
            .with_stage(stages::MoveFilesStage)
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Run every stage against the item described by `ctx`.
    ///
    /// Stages before the configured start stage are skipped without
    /// artifact verification. A stage whose declared outputs already
    /// validate is reused rather than re-run, unless overwrite is set.
    pub fn run(
        &self,
        ctx: &Context,
        store: &mut ArtifactStore,
    ) -> PipelineResult<PipelineRunResult> {
        let mut result = PipelineRunResult::default();
        let start = ctx.config.effective_start_stage();
        let item = ctx.item_name().to_string();

        for stage in &self.stages {
            if self.cancel.is_cancelled() {
                ctx.logger.warn("cancelled between stages");
                return Err(PipelineError::cancelled(&item));
            }

            let id = stage.id();
            if id.index() < start.index() {
                ctx.logger.debug(&format!(
                    "'{}' assumed satisfied (starting at '{}')",
                    id.label(),
                    start.label()
                ));
                result
                    .records
                    .push(StageRecord::Skipped(id, "before start stage".to_string()));
                continue;
            }
            if !stage.applies(&ctx.config) {
                result.records.push(StageRecord::Skipped(
                    id,
                    "disabled by configuration".to_string(),
                ));
                continue;
            }

            let outputs = stage.outputs(&ctx.config);
            if !ctx.config.overwrite
                && !outputs.is_empty()
                && outputs.iter().all(|role| store.exists(*role))
            {
                ctx.logger
                    .info(&format!("'{}' outputs already present, reusing", id.label()));
                result.records.push(StageRecord::Reused(id));
                continue;
            }

            ctx.logger.stage(id.label());
            match stage.execute(ctx, store) {
                Ok(StageOutcome::Completed) => {
                    for role in &outputs {
                        if let Err(e) = store.require(*role) {
                            let err = StageError::invalid_output(e.to_string());
                            ctx.logger.error(&err.to_string());
                            return Err(PipelineError::stage_failed(&item, id, err));
                        }
                    }
                    ctx.logger.success(&format!("{} done", id.label()));
                    result.records.push(StageRecord::Completed(id));
                }
                Ok(StageOutcome::Skipped(reason)) => {
                    ctx.logger.info(&format!("{} skipped: {reason}", id.label()));
                    result.records.push(StageRecord::Skipped(id, reason));
                }
                Err(e) if e.is_cancellation() => {
                    return Err(PipelineError::cancelled(&item));
                }
                Err(e) => {
                    ctx.logger.error(&e.to_string());
                    ctx.logger.show_tail(id.label());
                    return Err(PipelineError::stage_failed(&item, id, e));
                }
            }
        }

        ctx.logger.success("conversion finished");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactRole;
    use crate::config::JobConfig;
    use crate::logging::{JobLogger, LogConfig};
    use crate::models::{DiscInfo, SourceItem};
    use crate::pipeline::StageResult;
    use crate::tools::CommandRunner;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn test_context(dir: &TempDir, config: JobConfig) -> Context {
        let cancel = CancelHandle::new();
        Context {
            config,
            item: SourceItem::Mkv(PathBuf::from("/tmp/in.mkv")),
            disc: DiscInfo {
                name: "Item".to_string(),
                ..DiscInfo::default()
            },
            work_dir: dir.path().to_path_buf(),
            output_root: dir.path().to_path_buf(),
            logger: std::sync::Arc::new(
                JobLogger::new("Item", dir.path(), LogConfig::default()).unwrap(),
            ),
            runner: CommandRunner::new(false, cancel),
        }
    }

    struct RecordingStage {
        id: Stage,
        output: Option<ArtifactRole>,
        log: std::sync::Arc<Mutex<Vec<Stage>>>,
    }

    impl ConversionStage for RecordingStage {
        fn id(&self) -> Stage {
            self.id
        }

        fn outputs(&self, _config: &JobConfig) -> Vec<ArtifactRole> {
            self.output.into_iter().collect()
        }

        fn execute(
            &self,
            _ctx: &Context,
            store: &mut ArtifactStore,
        ) -> StageResult<StageOutcome> {
            self.log.lock().unwrap().push(self.id);
            if let Some(role) = self.output {
                fs::write(store.path_for(role), b"data").unwrap();
            }
            Ok(StageOutcome::Completed)
        }
    }

    #[test]
    fn stages_run_in_order() {
        let dir = TempDir::new().unwrap();
        let log = std::sync::Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(CancelHandle::new())
            .with_stage(RecordingStage {
                id: Stage::CreateMkv,
                output: None,
                log: log.clone(),
            })
            .with_stage(RecordingStage {
                id: Stage::ExtractStreams,
                output: None,
                log: log.clone(),
            });

        let ctx = test_context(&dir, JobConfig::default());
        let mut store = ArtifactStore::new(dir.path(), "Item");
        pipeline.run(&ctx, &mut store).unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![Stage::CreateMkv, Stage::ExtractStreams]
        );
    }

    #[test]
    fn existing_outputs_are_reused() {
        let dir = TempDir::new().unwrap();
        let log = std::sync::Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(CancelHandle::new()).with_stage(RecordingStage {
            id: Stage::CombineToMvHevc,
            output: Some(ArtifactRole::MvHevc),
            log: log.clone(),
        });

        let ctx = test_context(&dir, JobConfig::default());
        let mut store = ArtifactStore::new(dir.path(), "Item");
        fs::write(store.path_for(ArtifactRole::MvHevc), b"existing").unwrap();

        let result = pipeline.run(&ctx, &mut store).unwrap();
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(result.reused(), vec![Stage::CombineToMvHevc]);
    }

    #[test]
    fn overwrite_forces_rerun() {
        let dir = TempDir::new().unwrap();
        let log = std::sync::Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(CancelHandle::new()).with_stage(RecordingStage {
            id: Stage::CombineToMvHevc,
            output: Some(ArtifactRole::MvHevc),
            log: log.clone(),
        });

        let config = JobConfig {
            overwrite: true,
            ..JobConfig::default()
        };
        let ctx = test_context(&dir, config);
        let mut store = ArtifactStore::new(dir.path(), "Item");
        fs::write(store.path_for(ArtifactRole::MvHevc), b"existing").unwrap();

        let result = pipeline.run(&ctx, &mut store).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![Stage::CombineToMvHevc]);
        assert_eq!(result.completed(), vec![Stage::CombineToMvHevc]);
    }

    #[test]
    fn start_stage_skips_earlier_stages() {
        let dir = TempDir::new().unwrap();
        let log = std::sync::Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(CancelHandle::new())
            .with_stage(RecordingStage {
                id: Stage::CreateMkv,
                output: None,
                log: log.clone(),
            })
            .with_stage(RecordingStage {
                id: Stage::CreateFinalFile,
                output: None,
                log: log.clone(),
            });

        let config = JobConfig {
            start_stage: Some(Stage::CreateFinalFile),
            ..JobConfig::default()
        };
        let ctx = test_context(&dir, config);
        let mut store = ArtifactStore::new(dir.path(), "Item");
        pipeline.run(&ctx, &mut store).unwrap();

        assert_eq!(*log.lock().unwrap(), vec![Stage::CreateFinalFile]);
    }

    #[test]
    fn non_applicable_stage_is_skipped() {
        let dir = TempDir::new().unwrap();
        let log = std::sync::Arc::new(Mutex::new(Vec::new()));
        // UpscaleVideo only applies with fx_upscale, which defaults off.
        let pipeline = Pipeline::new(CancelHandle::new()).with_stage(RecordingStage {
            id: Stage::UpscaleVideo,
            output: None,
            log: log.clone(),
        });

        let ctx = test_context(&dir, JobConfig::default());
        let mut store = ArtifactStore::new(dir.path(), "Item");
        let result = pipeline.run(&ctx, &mut store).unwrap();

        assert!(log.lock().unwrap().is_empty());
        assert!(matches!(
            result.records[0],
            StageRecord::Skipped(Stage::UpscaleVideo, _)
        ));
    }

    #[test]
    fn cancellation_stops_before_next_stage() {
        let dir = TempDir::new().unwrap();
        let log = std::sync::Arc::new(Mutex::new(Vec::new()));
        let cancel = CancelHandle::new();
        cancel.cancel();
        let pipeline = Pipeline::new(cancel).with_stage(RecordingStage {
            id: Stage::CreateMkv,
            output: None,
            log: log.clone(),
        });

        let ctx = test_context(&dir, JobConfig::default());
        let mut store = ArtifactStore::new(dir.path(), "Item");
        let err = pipeline.run(&ctx, &mut store).unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled { .. }));
        assert!(log.lock().unwrap().is_empty());
    }

    struct FailingStage;

    impl ConversionStage for FailingStage {
        fn id(&self) -> Stage {
            Stage::CreateMkv
        }

        fn outputs(&self, _config: &JobConfig) -> Vec<ArtifactRole> {
            vec![ArtifactRole::SourceMkv]
        }

        fn execute(
            &self,
            _ctx: &Context,
            _store: &mut ArtifactStore,
        ) -> StageResult<StageOutcome> {
            // Claims success without producing the declared output.
            Ok(StageOutcome::Completed)
        }
    }

    #[test]
    fn missing_declared_output_fails_the_stage() {
        let dir = TempDir::new().unwrap();
        let pipeline = Pipeline::new(CancelHandle::new()).with_stage(FailingStage);

        let ctx = test_context(&dir, JobConfig::default());
        let mut store = ArtifactStore::new(dir.path(), "Item");
        let err = pipeline.run(&ctx, &mut store).unwrap_err();

        match err {
            PipelineError::StageFailed { stage, source, .. } => {
                assert_eq!(stage, Stage::CreateMkv);
                assert!(matches!(source, StageError::InvalidOutput(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
