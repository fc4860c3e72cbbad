//! Kamyroll download engine.
//!
//! Resolves streaming-service URLs through the Kamyroll API, picks the
//! audio, hardsub, resolution and subtitle variants that match the user's
//! settings and drives ffmpeg to produce the finished file.

pub mod config;
pub mod downloader;
pub mod error;
pub mod logging;
pub mod utils;

pub use config::{AppConfig, FfmpegConfig, Resolution, Settings};
pub use error::{Error, ProcessFailure, ProcessFatalError, Result, SelectionError};
