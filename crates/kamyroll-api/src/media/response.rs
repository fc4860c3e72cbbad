use super::{Images, Locale, Metadata, Stream, Subtitle};
use crate::service::Channel;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    Episode,
    Movie,
}

impl ResponseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Episode => "episode",
            Self::Movie => "movie",
        }
    }
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully resolved media unit as returned by `/v1/streams`.
///
/// Built only through [`crate::decode::stream_response`], which guarantees
/// that `kind` agrees with the variant of `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamResponse {
    pub kind: ResponseKind,
    pub channel: Channel,
    pub metadata: Metadata,
    pub images: Images,
    pub streams: Vec<Stream>,
    pub subtitles: Vec<Subtitle>,
}

impl StreamResponse {
    /// Streams carrying the given audio locale, in response order.
    pub fn streams_with_audio(&self, audio: Locale) -> impl Iterator<Item = &Stream> {
        self.streams
            .iter()
            .filter(move |stream| stream.audio_locale == audio)
    }

    /// Subtitles with the given locale, in response order.
    pub fn subtitles_with_locale(&self, locale: Locale) -> impl Iterator<Item = &Subtitle> {
        self.subtitles
            .iter()
            .filter(move |subtitle| subtitle.locale == locale)
    }
}
