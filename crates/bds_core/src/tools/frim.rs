//! MVC decode orchestration.
//!
//! FRIMDecode (a Windows binary run under Wine) is the only tool here
//! that can split an MVC elementary stream into two raw views. Writing
//! raw video to disk is infeasible at feature length, so the decoder
//! writes into two named pipes, each drained by an ffmpeg HEVC encoder
//! spawned beforehand. The decoder run is blocking; the encoders are
//! supervised children reaped after it exits.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::stat::Mode;
use nix::unistd::mkfifo;

use crate::config::JobConfig;
use crate::logging::JobLogger;
use crate::models::DiscInfo;

use super::ffmpeg::{EncodeParams, Ffmpeg};
use super::runner::{CommandRunner, ToolError};

/// Budget for the encoders to drain their pipes after the decoder exits.
pub const DEFAULT_DECODE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// How long an encoder output may stop growing before it is considered
/// stalled.
const STALL_WINDOW: Duration = Duration::from_secs(120);

const REAP_POLL: Duration = Duration::from_millis(500);

/// One MVC split: elementary stream in, two encoded view files out.
#[derive(Debug, Clone)]
pub struct SplitRequest {
    pub input: PathBuf,
    pub left_output: PathBuf,
    pub right_output: PathBuf,
    /// Input is a raw transport stream rather than a demuxed
    /// elementary stream. FRIM then needs `-ts` and the input named
    /// twice, once per view.
    pub transport_stream: bool,
}

/// FIFO pair removed when the split ends, success or not.
struct FifoPair {
    left: PathBuf,
    right: PathBuf,
}

impl FifoPair {
    fn create(dir: &Path) -> Result<Self, ToolError> {
        let left = dir.join("left_fifo");
        let right = dir.join("right_fifo");
        for path in [&left, &right] {
            let _ = fs::remove_file(path);
            mkfifo(path, Mode::S_IRWXU).map_err(|e| ToolError::Io {
                tool: "mkfifo".to_string(),
                source: std::io::Error::from_raw_os_error(e as i32),
            })?;
        }
        Ok(Self { left, right })
    }
}

impl Drop for FifoPair {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.left);
        let _ = fs::remove_file(&self.right);
    }
}

/// FRIMDecode-under-Wine wrapper.
pub struct FrimDecoder<'a> {
    runner: &'a CommandRunner,
    config: &'a JobConfig,
}

impl<'a> FrimDecoder<'a> {
    pub fn new(runner: &'a CommandRunner, config: &'a JobConfig) -> Self {
        Self { runner, config }
    }

    /// Decode the MVC stream and encode both views.
    ///
    /// Eye swapping happens here by crossing the FIFO order handed to
    /// the decoder; the encoders always write left to `left_output`.
    pub fn split_to_stereo(
        &self,
        request: &SplitRequest,
        disc: &DiscInfo,
        crop: &str,
        logger: &JobLogger,
    ) -> Result<(), ToolError> {
        let work_dir = request
            .left_output
            .parent()
            .ok_or_else(|| ToolError::OutputInvalid {
                tool: "FRIMDecode".to_string(),
                message: "left output path has no parent directory".to_string(),
            })?;
        let fifos = FifoPair::create(work_dir)?;

        let ffmpeg = Ffmpeg::new(self.runner, self.config);
        let mut encoders = Vec::with_capacity(2);
        for (fifo, output) in [
            (&fifos.left, &request.left_output),
            (&fifos.right, &request.right_output),
        ] {
            let params = EncodeParams {
                input: fifo.clone(),
                output: output.clone(),
                color_depth: disc.color_depth,
                resolution: if self.config.resolution.is_empty() {
                    disc.resolution.clone()
                } else {
                    self.config.resolution.clone()
                },
                frame_rate: if self.config.frame_rate.is_empty() {
                    disc.frame_rate.clone()
                } else {
                    self.config.frame_rate.clone()
                },
                bitrate: self.config.left_right_bitrate,
                crop: crop.to_string(),
                software_encoder: self.config.software_encoder,
            };
            let log_path = output.with_extension("log");
            let child = self.runner.spawn_supervised(
                &self.config.tools.ffmpeg,
                &ffmpeg.view_encoder_args(&params),
                "ffmpeg",
                Some(&log_path),
                logger,
            )?;
            encoders.push(child);
        }

        let decode = self.run_decoder(request, &fifos, logger);
        if let Err(err) = decode {
            kill_all(&mut encoders);
            return Err(err);
        }

        let reaped = self.reap_encoders(&mut encoders, request, logger);
        if !self.config.keep_files {
            let _ = fs::remove_file(request.left_output.with_extension("log"));
            let _ = fs::remove_file(request.right_output.with_extension("log"));
        }
        reaped
    }

    fn run_decoder(
        &self,
        request: &SplitRequest,
        fifos: &FifoPair,
        logger: &JobLogger,
    ) -> Result<(), ToolError> {
        let mut args = vec![self.config.tools.frim_decoder.display().to_string()];
        if request.transport_stream {
            args.push("-ts".to_string());
        }
        args.push("-i:mvc".to_string());
        args.push(request.input.display().to_string());
        if request.transport_stream {
            args.push(request.input.display().to_string());
        }
        args.push("-o".to_string());
        let (first, second) = if self.config.swap_eyes {
            (&fifos.right, &fifos.left)
        } else {
            (&fifos.left, &fifos.right)
        };
        args.push(first.display().to_string());
        args.push(second.display().to_string());

        self.runner
            .run(&self.config.tools.wine, &args, "FRIMDecode", logger)?;
        Ok(())
    }

    /// Wait for both encoders, watching output growth so a wedged pipe
    /// does not hang the run forever.
    fn reap_encoders(
        &self,
        encoders: &mut Vec<Child>,
        request: &SplitRequest,
        logger: &JobLogger,
    ) -> Result<(), ToolError> {
        let started = Instant::now();
        let mut last_growth = Instant::now();
        let mut last_sizes = (0u64, 0u64);

        loop {
            if self.runner.cancel_handle().is_cancelled() {
                kill_all(encoders);
                return Err(ToolError::Cancelled {
                    tool: "ffmpeg".to_string(),
                });
            }

            let mut all_done = true;
            for child in encoders.iter_mut() {
                match child.try_wait() {
                    Ok(Some(status)) if !status.success() => {
                        let code = status.code().unwrap_or(-1);
                        kill_all(encoders);
                        return Err(ToolError::Invocation {
                            tool: "ffmpeg".to_string(),
                            exit_code: code,
                            output: "view encoder failed; see its .log next to the output"
                                .to_string(),
                        });
                    }
                    Ok(Some(_)) => {}
                    Ok(None) => all_done = false,
                    Err(e) => {
                        kill_all(encoders);
                        return Err(ToolError::Io {
                            tool: "ffmpeg".to_string(),
                            source: e,
                        });
                    }
                }
            }
            if all_done {
                return Ok(());
            }

            let sizes = (
                file_size(&request.left_output),
                file_size(&request.right_output),
            );
            if sizes != last_sizes {
                last_sizes = sizes;
                last_growth = Instant::now();
            }

            let stalled = last_growth.elapsed() > STALL_WINDOW;
            if started.elapsed() > DEFAULT_DECODE_TIMEOUT || stalled {
                logger.warn("view encoders stopped making progress; terminating");
                kill_all(encoders);
                return Err(ToolError::Timeout {
                    tool: "ffmpeg".to_string(),
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            thread::sleep(REAP_POLL);
        }
    }
}

fn kill_all(children: &mut Vec<Child>) {
    for child in children.iter_mut() {
        let _ = child.kill();
        let _ = child.wait();
    }
}

fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn fifo_pair_creates_and_removes() {
        let dir = TempDir::new().unwrap();
        let (left, right) = {
            let fifos = FifoPair::create(dir.path()).unwrap();
            assert!(fifos.left.exists());
            assert!(fifos.right.exists());
            (fifos.left.clone(), fifos.right.clone())
        };
        assert!(!left.exists());
        assert!(!right.exists());
    }

    #[test]
    fn fifo_create_replaces_stale_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("left_fifo"), b"stale").unwrap();
        let fifos = FifoPair::create(dir.path()).unwrap();
        assert!(fifos.left.exists());
    }

    #[test]
    fn missing_file_has_zero_size() {
        assert_eq!(file_size(Path::new("/no/such/file")), 0);
    }
}
