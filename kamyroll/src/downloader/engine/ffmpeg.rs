//! FFmpeg transcoder implementation.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::traits::{TranscodeJob, TranscodeSink, Transcoder};
use super::utils::{ProcessEvent, Progress, ProgressParser, answer};
use crate::config::FfmpegConfig;
use crate::error::ProcessFailure;
use crate::{Error, Result};

const READ_BUFFER_SIZE: usize = 4096;

#[cfg(windows)]
fn no_window(command: &mut Command) {
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    command.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn no_window(_command: &mut Command) {}

/// Runs the ffmpeg binary and interprets its stderr.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    config: FfmpegConfig,
}

impl FfmpegRunner {
    pub fn new(config: FfmpegConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FfmpegConfig {
        &self.config
    }

    /// First line of `ffmpeg -version`, `None` when the binary cannot run.
    pub async fn detect_version(&self) -> Option<String> {
        let mut command = Command::new(&self.config.binary_path);
        command.arg("-version").stdin(Stdio::null());
        no_window(&mut command);
        let output = command.output().await.ok()?;
        String::from_utf8(output.stdout)
            .ok()
            .and_then(|s| s.lines().next().map(|l| l.to_string()))
    }

    /// Full command line: quiet stats output, reconnect on network trouble,
    /// the configured extra flags, then the planned arguments.
    pub fn build_args(&self, planned: &[String]) -> Vec<String> {
        let mut args: Vec<String> = [
            "-hide_banner",
            "-stats",
            "-loglevel",
            "error",
            "-reconnect",
            "1",
            "-reconnect_streamed",
            "1",
            "-reconnect_on_network_error",
            "1",
            "-user_agent",
        ]
        .map(String::from)
        .into();
        args.push(self.config.user_agent.clone());
        args.extend(self.config.extra_args.iter().cloned());
        args.extend(planned.iter().cloned());
        args
    }
}

#[async_trait]
impl Transcoder for FfmpegRunner {
    async fn transcode(
        &self,
        job: &TranscodeJob,
        sink: &mut dyn TranscodeSink,
        token: &CancellationToken,
    ) -> Result<Progress> {
        let args = self.build_args(&job.arguments);
        info!(?args, "Started ffmpeg process");

        let mut command = Command::new(&self.config.binary_path);
        command
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        no_window(&mut command);

        let mut child = command.spawn().map_err(|e| {
            ProcessFailure::Spawn(format!("{}: {e}", self.config.binary_path))
        })?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ProcessFailure::Spawn("failed to capture ffmpeg stderr".to_string()))?;
        let mut stdin = child.stdin.take();

        let mut parser = ProgressParser::new(job.duration);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut fatal = None;

        'read: loop {
            let read = tokio::select! {
                _ = token.cancelled() => None,
                read = stderr.read(&mut buf) => Some(read),
            };
            let n = match read {
                None => {
                    parser.stop();
                    let _ = child.kill().await;
                    info!("FFmpeg process stopped");
                    return Err(Error::Cancelled);
                }
                Some(Ok(0)) => break,
                Some(Ok(n)) => n,
                Some(Err(e)) => {
                    warn!(error = %e, "Error reading ffmpeg output");
                    break;
                }
            };
            trace!(data = %String::from_utf8_lossy(&buf[..n]), "Read data");

            for event in parser.feed(&buf[..n]) {
                sink.on_event(&event);
                match event {
                    ProcessEvent::Question(question) => {
                        let yes = sink.confirm(&question).await;
                        if token.is_cancelled() {
                            continue 'read;
                        }
                        if let Some(stdin) = stdin.as_mut() {
                            if let Err(e) = stdin.write_all(answer(yes)).await {
                                warn!(error = %e, "Failed to answer ffmpeg prompt");
                            }
                        }
                    }
                    ProcessEvent::Fatal(error) => {
                        let _ = child.kill().await;
                        fatal = Some(error);
                        break 'read;
                    }
                    _ => {}
                }
            }
        }

        for event in parser.flush() {
            sink.on_event(&event);
            if let ProcessEvent::Fatal(error) = event {
                let _ = child.kill().await;
                fatal = Some(error);
            }
        }
        drop(stdin);

        let status = tokio::select! {
            _ = token.cancelled() => {
                let _ = child.kill().await;
                return Err(Error::Cancelled);
            }
            status = child.wait() => status?,
        };

        if let Some(error) = fatal {
            return Err(ProcessFailure::Fatal(error).into());
        }

        let progress = parser.finish(status.code())?;
        debug!(code = ?status.code(), "FFmpeg process exited successfully");
        sink.on_event(&ProcessEvent::Progress {
            progress,
            record: Default::default(),
        });
        Ok(progress)
    }
}
