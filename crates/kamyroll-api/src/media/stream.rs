use super::Locale;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport/container variant of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    AdaptiveHls,
    MobileMp4,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdaptiveHls => "adaptive_hls",
            Self::MobileMp4 => "mobile_mp4",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AdaptiveHls => f.write_str("Adaptive, HLS"),
            Self::MobileMp4 => f.write_str("Mobile, mp4, HLS"),
        }
    }
}

/// One playable variant of a media unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    #[serde(rename = "type")]
    pub kind: StreamKind,
    pub audio_locale: Locale,
    /// `Locale::None` means the video carries no burned-in subtitles.
    pub hardsub_locale: Locale,
    /// Playlist URL.
    pub url: String,
}

/// One subtitle track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtitle {
    pub locale: Locale,
    pub url: String,
    pub format: String,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - audio: {} - hardsub: {}",
            self.kind, self.audio_locale, self.hardsub_locale
        )
    }
}
