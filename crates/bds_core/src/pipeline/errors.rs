//! Error types for the conversion pipeline.
//!
//! Errors chain through layers: item, stage, tool, detail. Nothing is
//! swallowed on the way up; the runner decides what a failure means for
//! the batch.

use std::io;

use thiserror::Error;

use crate::artifacts::ArtifactError;
use crate::models::Stage;
use crate::tools::ToolError;

/// Top-level pipeline error with item context.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("'{item}' failed at stage '{}': {source}", stage.label())]
    StageFailed {
        item: String,
        stage: Stage,
        #[source]
        source: StageError,
    },

    #[error("'{item}' was cancelled")]
    Cancelled { item: String },

    #[error("'{item}' setup failed: {message}")]
    Setup { item: String, message: String },
}

impl PipelineError {
    pub fn stage_failed(item: impl Into<String>, stage: Stage, source: StageError) -> Self {
        Self::StageFailed {
            item: item.into(),
            stage,
            source,
        }
    }

    pub fn cancelled(item: impl Into<String>) -> Self {
        Self::Cancelled { item: item.into() }
    }

    pub fn setup(item: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Setup {
            item: item.into(),
            message: message.into(),
        }
    }

    /// The stage a failure occurred in, when one is attached.
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            PipelineError::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Error from one stage.
#[derive(Error, Debug)]
pub enum StageError {
    /// A required input artifact is missing or invalid.
    #[error("missing input: {0}")]
    MissingInput(#[from] ArtifactError),

    /// The stage ran but its output is missing or unusable.
    #[error("invalid output: {0}")]
    InvalidOutput(String),

    /// A precondition unrelated to artifacts was not met.
    #[error("precondition not met: {0}")]
    Precondition(String),

    /// An external tool failed.
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },
}

impl StageError {
    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::InvalidOutput(message.into())
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// True when the underlying cause is a user-requested cancellation.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, StageError::Tool(ToolError::Cancelled { .. }))
    }
}

pub type StageResult<T> = Result<T, StageError>;
pub type PipelineResult<T> = Result<T, PipelineError>;
