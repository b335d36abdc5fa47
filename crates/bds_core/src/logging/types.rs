//! Logging types and configuration.

use serde::{Deserialize, Serialize};

/// Log level for filtering messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// Configuration for per-item logging behavior.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum level written to the item log.
    pub level: LogLevel,
    /// Lines of tool output replayed when a stage fails.
    pub error_tail: usize,
    /// Prefix log lines with timestamps.
    pub show_timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            error_tail: 20,
            show_timestamps: true,
        }
    }
}

impl LogConfig {
    /// Verbose configuration used with `--output-commands`.
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            error_tail: 50,
            show_timestamps: true,
        }
    }
}

/// Message prefix types for consistent formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagePrefix {
    /// Shell command: `$ command`
    Command,
    /// Stage marker: `=== Stage ===`
    Stage,
    /// Success: `[OK]`
    Success,
    /// Warning: `[WARN]`
    Warning,
    /// Error: `[ERROR]`
    Error,
}

impl MessagePrefix {
    pub fn format(&self, message: &str) -> String {
        match self {
            MessagePrefix::Command => format!("$ {message}"),
            MessagePrefix::Stage => format!("=== {message} ==="),
            MessagePrefix::Success => format!("[OK] {message}"),
            MessagePrefix::Warning => format!("[WARN] {message}"),
            MessagePrefix::Error => format!("[ERROR] {message}"),
        }
    }
}
