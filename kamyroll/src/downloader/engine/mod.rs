//! Transcoder abstraction.
//!
//! This module defines the `Transcoder` trait and the ffmpeg implementation
//! that drives the child process and parses its output.

mod ffmpeg;
mod traits;
pub mod utils;

pub use ffmpeg::FfmpegRunner;
pub use traits::{TranscodeJob, TranscodeSink, Transcoder};
pub use utils::{ProcessEvent, Progress, ProgressRecord};
