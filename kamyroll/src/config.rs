//! User preferences and tool configuration.
//!
//! Everything here is plain data: the core never reads or writes settings
//! files itself. Front-ends load an [`AppConfig`], hand the pieces to the
//! engine and persist [`Settings::to_persisted`] when they save.

use kamyroll_api::{ApiClientConfig, Locale, transport::DEFAULT_USER_AGENT};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::utils::filename::validate_format;
use crate::{Error, Result};

/// Vertical resolutions a user can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Resolution {
    R1080,
    R720,
    R540,
    R480,
    R432,
    R360,
    R240,
    R234,
    R80,
}

impl Resolution {
    pub const ALL: [Resolution; 9] = [
        Self::R1080,
        Self::R720,
        Self::R540,
        Self::R480,
        Self::R432,
        Self::R360,
        Self::R240,
        Self::R234,
        Self::R80,
    ];

    pub fn height(self) -> u32 {
        match self {
            Self::R1080 => 1080,
            Self::R720 => 720,
            Self::R540 => 540,
            Self::R480 => 480,
            Self::R432 => 432,
            Self::R360 => 360,
            Self::R240 => 240,
            Self::R234 => 234,
            Self::R80 => 80,
        }
    }

    pub fn from_height(height: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.height() == height)
    }
}

impl TryFrom<u32> for Resolution {
    type Error = String;

    fn try_from(height: u32) -> std::result::Result<Self, Self::Error> {
        Self::from_height(height).ok_or_else(|| format!("unsupported resolution {height}"))
    }
}

impl From<Resolution> for u32 {
    fn from(resolution: Resolution) -> Self {
        resolution.height()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}p", self.height())
    }
}

/// Download preferences, read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub audio_locale: Locale,
    /// `Locale::None` asks for a video without burned-in subtitles.
    pub hardsub_locale: Locale,
    pub subtitle_locales: Vec<Locale>,
    pub video_height: Resolution,
    pub episode_format: String,
    /// Sub-directory (relative to the video) that receives separate subtitle files.
    pub subtitle_prefix: String,
    pub movie_format: String,
    pub download_path: PathBuf,
    pub write_metadata: bool,
    pub separate_subtitles: bool,
    pub compress_streams: bool,
    pub use_own_credentials: bool,
    pub strict_matching: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            audio_locale: Locale::JapaneseJp,
            hardsub_locale: Locale::None,
            subtitle_locales: Vec::new(),
            video_height: Resolution::R1080,
            episode_format: "{series}/{series}.S{season}.E{episode}".to_string(),
            subtitle_prefix: "subtitles".to_string(),
            movie_format: "{title}".to_string(),
            download_path: PathBuf::from("downloads"),
            write_metadata: false,
            separate_subtitles: false,
            compress_streams: false,
            use_own_credentials: false,
            strict_matching: false,
        }
    }
}

impl Settings {
    /// Reject settings the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        validate_format(&self.episode_format, true)?;
        validate_format(&self.movie_format, false)?;
        if self.subtitle_prefix.contains(['/', '\\']) || Path::new(&self.subtitle_prefix).is_absolute() {
            return Err(Error::config(format!(
                "subtitle prefix must be a single directory name, got {:?}",
                self.subtitle_prefix
            )));
        }
        if self.audio_locale == Locale::None {
            return Err(Error::config("an audio locale is required"));
        }
        Ok(())
    }

    /// Copy suitable for saving: the download path becomes absolute, POSIX style.
    pub fn to_persisted(&self) -> Result<Self> {
        let absolute = std::path::absolute(&self.download_path)
            .map_err(|e| Error::io_path("resolving", &self.download_path, e))?;
        let posix = absolute.to_string_lossy().replace('\\', "/");
        Ok(Self {
            download_path: PathBuf::from(posix),
            ..self.clone()
        })
    }
}

/// How ffmpeg is launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegConfig {
    pub binary_path: String,
    pub user_agent: String,
    /// Inserted after the fixed resilience flags, before the planned arguments.
    pub extra_args: Vec<String>,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            extra_args: Vec::new(),
        }
    }
}

/// Everything a front-end persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub settings: Settings,
    pub ffmpeg: FfmpegConfig,
    pub api: ApiClientConfig,
}
