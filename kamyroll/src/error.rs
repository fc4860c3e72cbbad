//! Crate-wide error types.

use kamyroll_api::{ApiError, Locale};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error("The api call failed: {0}")]
    Api(#[from] ApiError),

    #[error(transparent)]
    Process(#[from] ProcessFailure),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error while {op} {}: {source}", path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid filename format: {0}")]
    Format(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution halted")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Selection failures can be fixed by choosing other settings.
    pub fn as_selection(&self) -> Option<&SelectionError> {
        match self {
            Self::Selection(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Api(ApiError::Cancelled))
    }
}

/// No viable stream, resolution or subtitle set under the current settings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Could not find matching audio locale")]
    NoMatchingAudio,

    #[error("Could not find matching hardsub locale")]
    NoMatchingHardsub,

    #[error("Desired resolution not available ({desired}p)")]
    ResolutionUnavailable { desired: u32 },

    #[error("Desired resolution or smaller not available ({desired}p)")]
    NoResolutionAtOrBelow { desired: u32 },

    #[error("Missing subtitle locale(s): {}", LocaleList(.0))]
    MissingSubtitles(Vec<Locale>),

    #[error("The stream playlist lists no resolutions")]
    EmptyPlaylist,
}

struct LocaleList<'a>(&'a [Locale]);

impl fmt::Display for LocaleList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, locale) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{locale}")?;
        }
        Ok(())
    }
}

/// A hard failure reported by ffmpeg as `[module@offset] message: data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessFatalError {
    pub module: String,
    pub offset: String,
    pub message: String,
    pub data: String,
    /// The line as ffmpeg printed it.
    pub line: String,
}

impl fmt::Display for ProcessFatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Module: {}\nOffset: {}\nMessage: {}\nData: {}",
            self.module, self.offset, self.message, self.data
        )
    }
}

/// Why a transcode did not finish.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessFailure {
    #[error("ffmpeg error:\n{0}")]
    Fatal(ProcessFatalError),

    /// Non-zero exit code, or `None` when killed by a signal.
    #[error("ffmpeg exited abnormally (code {code:?})")]
    Exit { code: Option<i32> },

    #[error("failed to run ffmpeg: {0}")]
    Spawn(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_subtitles_lists_names() {
        let err = SelectionError::MissingSubtitles(vec![Locale::FrenchFr, Locale::GermanDe]);
        assert_eq!(err.to_string(), "Missing subtitle locale(s): French, German");
    }

    #[test]
    fn fatal_error_display_has_all_parts() {
        let err = ProcessFatalError {
            module: "https".to_string(),
            offset: "0x55d0".to_string(),
            message: "HTTP error 403 Forbidden".to_string(),
            data: String::new(),
            line: "[https @ 0x55d0] HTTP error 403 Forbidden".to_string(),
        };
        let text = err.to_string();
        assert!(text.starts_with("Module: https\nOffset: 0x55d0"));
        assert!(text.contains("Message: HTTP error 403 Forbidden"));
    }

    #[test]
    fn cancellation_is_recognised_through_api_errors() {
        assert!(Error::Api(ApiError::Cancelled).is_cancelled());
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::Other("x".into()).is_cancelled());
    }
}
