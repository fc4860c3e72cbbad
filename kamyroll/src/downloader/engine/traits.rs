//! Transcoder trait and related types.

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::utils::{ProcessEvent, Progress};
use crate::Result;

/// One transcode to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeJob {
    /// Planned arguments, without the fixed prefix the transcoder adds.
    pub arguments: Vec<String>,
    /// Expected duration of the output, bounds the progress.
    pub duration: Duration,
}

/// Receives what the transcoder reports while it runs.
#[async_trait]
pub trait TranscodeSink: Send {
    fn on_event(&mut self, event: &ProcessEvent);

    /// Answer a yes/no question asked by the transcoder.
    async fn confirm(&mut self, question: &str) -> bool;
}

/// Runs a transcode to completion.
///
/// Only one transcode runs at a time per caller; implementations own the
/// child process for the duration of the call.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Run `job`, reporting to `sink`.
    ///
    /// Returns the final progress on a clean exit, `Error::Process` when the
    /// transcoder failed and `Error::Cancelled` when `token` fired.
    async fn transcode(
        &self,
        job: &TranscodeJob,
        sink: &mut dyn TranscodeSink,
        token: &CancellationToken,
    ) -> Result<Progress>;
}
