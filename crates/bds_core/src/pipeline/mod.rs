//! Conversion pipeline.
//!
//! The pipeline is an ordered list of [`ConversionStage`] trait objects
//! executed one item at a time. Each stage reads the immutable
//! [`Context`], consumes prior artifacts from the [`ArtifactStore`] and
//! registers its own. Resume, conditional skipping and cancellation are
//! pipeline concerns; stages only do their one job.
//!
//! [`ArtifactStore`]: crate::artifacts::ArtifactStore

mod context;
mod errors;
mod pipeline;
mod stage;
pub mod stages;

pub use context::Context;
pub use errors::{PipelineError, PipelineResult, StageError, StageResult};
pub use pipeline::{CancelHandle, Pipeline, PipelineRunResult, StageRecord};
pub use stage::{ConversionStage, StageOutcome};
