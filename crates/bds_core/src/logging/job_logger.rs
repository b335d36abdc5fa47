//! Per-item logger with file output and an error tail buffer.
//!
//! Each source item gets its own logger that writes a dedicated log file
//! and mirrors messages to the global `tracing` subscriber. Raw tool
//! output goes to the file and a bounded tail buffer only; the tail is
//! replayed at warn level when a stage fails so the console shows the
//! relevant lines without the full transcript.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;

use super::types::{LogConfig, LogLevel, MessagePrefix};
use crate::fsutil::sanitize_filename;

const TAIL_CAPACITY: usize = 200;

/// Per-item logger.
pub struct JobLogger {
    item_name: String,
    log_path: PathBuf,
    file_writer: Mutex<Option<BufWriter<File>>>,
    config: LogConfig,
    tail_buffer: Mutex<VecDeque<String>>,
}

impl JobLogger {
    /// Create a logger writing to `<log_dir>/<item>.log`.
    pub fn new(
        item_name: impl Into<String>,
        log_dir: impl AsRef<Path>,
        config: LogConfig,
    ) -> std::io::Result<Self> {
        let item_name = item_name.into();
        let log_dir = log_dir.as_ref();
        fs::create_dir_all(log_dir)?;

        let log_path = log_dir.join(format!("{}.log", sanitize_filename(&item_name)));
        let file = File::create(&log_path)?;

        Ok(Self {
            item_name,
            log_path,
            file_writer: Mutex::new(Some(BufWriter::new(file))),
            config,
            tail_buffer: Mutex::new(VecDeque::with_capacity(TAIL_CAPACITY)),
        })
    }

    pub fn item_name(&self) -> &str {
        &self.item_name
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    fn write_line(&self, line: &str) {
        let mut guard = self.file_writer.lock();
        if let Some(writer) = guard.as_mut() {
            let _ = writeln!(writer, "{line}");
            let _ = writer.flush();
        }
    }

    fn format_message(&self, message: &str) -> String {
        if self.config.show_timestamps {
            format!("[{}] {message}", Local::now().format("%H:%M:%S"))
        } else {
            message.to_string()
        }
    }

    fn log(&self, level: LogLevel, message: &str) {
        if level < self.config.level {
            return;
        }
        self.write_line(&self.format_message(message));
        match level {
            LogLevel::Trace | LogLevel::Debug => {
                tracing::debug!(item = %self.item_name, "{message}")
            }
            LogLevel::Info => tracing::info!(item = %self.item_name, "{message}"),
            LogLevel::Warn => tracing::warn!(item = %self.item_name, "{message}"),
            LogLevel::Error => tracing::error!(item = %self.item_name, "{message}"),
        }
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, &MessagePrefix::Warning.format(message));
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, &MessagePrefix::Error.format(message));
    }

    /// Log a stage marker.
    pub fn stage(&self, stage_label: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Stage.format(stage_label));
    }

    /// Log an external command being executed.
    pub fn command(&self, command: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Command.format(command));
    }

    pub fn success(&self, message: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Success.format(message));
    }

    /// Record one line of raw tool output. Goes to the log file and the
    /// tail buffer, not to the console.
    pub fn output_line(&self, line: &str) {
        self.write_line(&format!("  | {line}"));
        let mut tail = self.tail_buffer.lock();
        if tail.len() >= TAIL_CAPACITY {
            tail.pop_front();
        }
        tail.push_back(line.to_string());
    }

    /// Replay the last `error_tail` output lines at warn level.
    pub fn show_tail(&self, heading: &str) {
        let tail = self.tail_buffer.lock();
        let start = tail.len().saturating_sub(self.config.error_tail);
        self.log(LogLevel::Warn, &format!("--- last output ({heading}) ---"));
        for line in tail.iter().skip(start) {
            self.log(LogLevel::Warn, line);
        }
    }

    /// Flush and close the log file. Subsequent writes are dropped.
    pub fn close(&self) {
        let mut guard = self.file_writer.lock();
        if let Some(mut writer) = guard.take() {
            let _ = writer.flush();
        }
    }
}
