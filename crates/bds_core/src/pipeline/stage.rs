//! Conversion stage trait.

use crate::artifacts::{ArtifactRole, ArtifactStore};
use crate::config::JobConfig;
use crate::models::Stage;

use super::context::Context;
use super::errors::StageResult;

/// Outcome of a stage execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The stage ran and produced its outputs.
    Completed,
    /// The stage decided at runtime it had nothing to do.
    Skipped(String),
}

/// One stage of the conversion.
///
/// The pipeline drives each stage the same way: check `applies`, check
/// whether the declared `outputs` already exist (resume), call
/// `execute`, then validate the declared outputs. Stages must not
/// assume any ordering knowledge beyond their declared inputs.
pub trait ConversionStage: Send + Sync {
    /// Position in the fixed stage order.
    fn id(&self) -> Stage;

    /// Whether this stage runs under the given configuration.
    ///
    /// The default defers to the stage-order table; stages with richer
    /// conditions override it.
    fn applies(&self, config: &JobConfig) -> bool {
        self.id().applies(config)
    }

    /// Artifact roles this stage produces. Used for resume detection
    /// and post-execution validation; a stage with side effects outside
    /// the store (the final move) declares none.
    fn outputs(&self, config: &JobConfig) -> Vec<ArtifactRole>;

    fn execute(&self, ctx: &Context, store: &mut ArtifactStore) -> StageResult<StageOutcome>;
}
