//! Shared external-process runner.
//!
//! Every adapter funnels through [`CommandRunner::run`]: resolve the
//! binary, spawn, stream combined output into the item log, poll for
//! completion so cancellation can terminate the child, and classify the
//! result. Adapters never parse exit codes themselves.

use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

use crate::logging::JobLogger;
use crate::pipeline::CancelHandle;

/// How often the runner polls a child for exit/cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Classified failure of an external tool invocation.
#[derive(Error, Debug)]
pub enum ToolError {
    /// The binary is not installed or not resolvable.
    #[error("{tool} not found; is it installed and on PATH?")]
    NotFound { tool: String },

    /// Non-zero exit. Captured output is attached for diagnosis.
    #[error("{tool} exited with code {exit_code}")]
    Invocation {
        tool: String,
        exit_code: i32,
        output: String,
    },

    /// Exit zero but the produced output is missing or unusable.
    #[error("{tool} produced invalid output: {message}")]
    OutputInvalid { tool: String, message: String },

    /// A polling adapter exceeded its stability-wait budget.
    #[error("{tool} did not complete within {waited_secs}s")]
    Timeout { tool: String, waited_secs: u64 },

    /// The run was cancelled and the child terminated.
    #[error("{tool} was cancelled")]
    Cancelled { tool: String },

    /// Failed to spawn or talk to the process.
    #[error("I/O error running {tool}: {source}")]
    Io {
        tool: String,
        #[source]
        source: io::Error,
    },
}

impl ToolError {
    /// Diagnostic output captured from the tool, when any.
    pub fn captured_output(&self) -> Option<&str> {
        match self {
            ToolError::Invocation { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Captured result of a completed invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    /// Combined stdout + stderr, in arrival order per stream.
    pub output: String,
}

/// Synchronous process runner shared by all adapters.
#[derive(Clone)]
pub struct CommandRunner {
    echo_commands: bool,
    cancel: CancelHandle,
}

impl CommandRunner {
    pub fn new(echo_commands: bool, cancel: CancelHandle) -> Self {
        Self {
            echo_commands,
            cancel,
        }
    }

    pub fn cancel_handle(&self) -> &CancelHandle {
        &self.cancel
    }

    /// Resolve a configured tool path to a runnable binary.
    ///
    /// Absolute/relative paths must exist as given; bare names are looked
    /// up on `PATH`.
    pub fn resolve(&self, tool: &Path) -> Result<PathBuf, ToolError> {
        if tool.components().count() > 1 {
            if tool.is_file() {
                return Ok(tool.to_path_buf());
            }
            return Err(ToolError::NotFound {
                tool: tool.display().to_string(),
            });
        }
        which::which(tool).map_err(|_| ToolError::NotFound {
            tool: tool.display().to_string(),
        })
    }

    fn format_command(program: &Path, args: &[String]) -> String {
        let mut parts = vec![quote_if_needed(&program.display().to_string())];
        parts.extend(args.iter().map(|a| quote_if_needed(a)));
        parts.join(" ")
    }

    /// Run a tool to completion, capturing combined output.
    ///
    /// `name` is the short tool name used in errors and logs. The child
    /// is killed if cancellation is requested mid-run.
    pub fn run(
        &self,
        program: &Path,
        args: &[String],
        name: &str,
        logger: &JobLogger,
    ) -> Result<CommandOutput, ToolError> {
        let resolved = self.resolve(program)?;
        let rendered = Self::format_command(&resolved, args);
        if self.echo_commands {
            logger.command(&rendered);
        } else {
            logger.debug(&format!("running {name}"));
        }

        let mut child = Command::new(&resolved)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => ToolError::NotFound {
                    tool: name.to_string(),
                },
                _ => ToolError::Io {
                    tool: name.to_string(),
                    source: e,
                },
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let lines: Mutex<Vec<String>> = Mutex::new(Vec::new());

        let status = thread::scope(|scope| {
            if let Some(out) = stdout {
                scope.spawn(|| collect_lines(out, &lines, logger));
            }
            if let Some(err) = stderr {
                scope.spawn(|| collect_lines(err, &lines, logger));
            }
            self.wait_with_cancel(&mut child, name)
        })?;

        let output = lines.into_inner().join("\n");
        let exit_code = status;
        if exit_code != 0 {
            return Err(ToolError::Invocation {
                tool: name.to_string(),
                exit_code,
                output,
            });
        }
        Ok(CommandOutput { exit_code, output })
    }

    /// Spawn a long-lived child the caller supervises itself (decoder
    /// helpers). Output is redirected to `log_file` when given.
    pub fn spawn_supervised(
        &self,
        program: &Path,
        args: &[String],
        name: &str,
        log_file: Option<&Path>,
        logger: &JobLogger,
    ) -> Result<Child, ToolError> {
        let resolved = self.resolve(program)?;
        if self.echo_commands {
            logger.command(&Self::format_command(&resolved, args));
        }

        let mut command = Command::new(&resolved);
        command.args(args).stdin(Stdio::null());
        match log_file {
            Some(path) => {
                let file = std::fs::File::create(path).map_err(|e| ToolError::Io {
                    tool: name.to_string(),
                    source: e,
                })?;
                let file_err = file.try_clone().map_err(|e| ToolError::Io {
                    tool: name.to_string(),
                    source: e,
                })?;
                command.stdout(Stdio::from(file)).stderr(Stdio::from(file_err));
            }
            None => {
                command.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        command.spawn().map_err(|e| ToolError::Io {
            tool: name.to_string(),
            source: e,
        })
    }

    fn wait_with_cancel(&self, child: &mut Child, name: &str) -> Result<i32, ToolError> {
        loop {
            if self.cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ToolError::Cancelled {
                    tool: name.to_string(),
                });
            }
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status.code().unwrap_or(-1)),
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    return Err(ToolError::Io {
                        tool: name.to_string(),
                        source: e,
                    })
                }
            }
        }
    }
}

fn collect_lines<R: Read>(reader: R, lines: &Mutex<Vec<String>>, logger: &JobLogger) {
    for line in BufReader::new(reader).lines().map_while(Result::ok) {
        logger.output_line(&line);
        lines.lock().push(line);
    }
}

fn quote_if_needed(part: &str) -> String {
    if part.contains(' ') {
        format!("\"{part}\"")
    } else {
        part.to_string()
    }
}
