//! Selection of the concrete stream, resolution and subtitle set for a download.
//!
//! The selector reconciles [`Settings`] against what a [`StreamResponse`]
//! offers. Every preference that cannot be met either falls back to a lesser
//! alternative or, under strict matching, fails with a [`SelectionError`]
//! that front-ends can answer by asking for other settings.

use kamyroll_api::{HttpTransport, Locale, StreamResponse, Subtitle};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};

use super::playlist::{ResolutionMap, resolve_playlist};
use crate::config::Settings;
use crate::error::SelectionError;
use crate::{Error, Result};

/// How subtitles end up burned into the video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardsubInfo {
    /// The stream already carries the hardsub; nothing to filter in.
    pub is_native: bool,
    pub locale: Locale,
    /// Soft subtitle to burn in. Empty when `is_native`.
    pub url: String,
}

impl HardsubInfo {
    fn native(locale: Locale) -> Self {
        Self {
            is_native: true,
            locale,
            url: String::new(),
        }
    }
}

/// The resolved download plan for one media unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSelection {
    /// Master playlist URL. Empty for subtitle-only selections.
    pub url: String,
    pub audio_locale: Locale,
    /// Video program id, optionally followed by a separate audio program id.
    pub program_ids: Vec<usize>,
    pub hardsub: HardsubInfo,
    pub subtitles: Vec<Subtitle>,
}

impl DownloadSelection {
    pub fn is_subtitle_only(&self) -> bool {
        self.program_ids.is_empty()
    }
}

/// Pick at most one subtitle per requested locale, first match wins.
///
/// Missing locales fail the selection under strict matching and are dropped
/// with a warning otherwise.
pub fn select_subtitles(
    response: &StreamResponse,
    settings: &Settings,
) -> std::result::Result<Vec<Subtitle>, SelectionError> {
    let mut desired: BTreeSet<Locale> = settings.subtitle_locales.iter().copied().collect();

    let selected: Vec<Subtitle> = response
        .subtitles
        .iter()
        .filter(|subtitle| desired.remove(&subtitle.locale))
        .cloned()
        .collect();

    if !desired.is_empty() {
        let error = SelectionError::MissingSubtitles(desired.into_iter().collect());
        if settings.strict_matching {
            return Err(error);
        }
        warn!("{error}");
    }

    Ok(selected)
}

/// Selection for a subtitle-only download: no video, no hardsub.
pub fn subtitle_only_selection(subtitles: Vec<Subtitle>) -> DownloadSelection {
    DownloadSelection {
        url: String::new(),
        audio_locale: Locale::None,
        program_ids: Vec::new(),
        hardsub: HardsubInfo::native(Locale::None),
        subtitles,
    }
}

/// Pick the program ids for the desired height.
///
/// An exact match is used as is. Otherwise, unless `strict`, the highest
/// available height below the desired one is used.
pub fn pick_resolution(
    resolutions: &ResolutionMap,
    desired: u32,
    strict: bool,
) -> std::result::Result<(u32, Vec<usize>), SelectionError> {
    if resolutions.is_empty() {
        return Err(SelectionError::EmptyPlaylist);
    }
    if let Some(program_ids) = resolutions.get(&desired) {
        return Ok((desired, program_ids.clone()));
    }
    if strict {
        return Err(SelectionError::ResolutionUnavailable { desired });
    }

    resolutions
        .range(..desired)
        .next_back()
        .map(|(height, program_ids)| (*height, program_ids.clone()))
        .ok_or(SelectionError::NoResolutionAtOrBelow { desired })
}

/// Download a master playlist and resolve its resolutions.
pub async fn fetch_resolutions(transport: &dyn HttpTransport, url: &str) -> Result<ResolutionMap> {
    let body = transport.get(url, &[]).await?;
    let text = String::from_utf8_lossy(&body);
    Ok(resolve_playlist(&text))
}

/// Resolve the full [`DownloadSelection`] for `response` under `settings`.
pub async fn select_stream(
    response: &StreamResponse,
    settings: &Settings,
    transport: &dyn HttpTransport,
) -> Result<DownloadSelection> {
    let audio_matching: Vec<_> = response.streams_with_audio(settings.audio_locale).collect();
    if audio_matching.is_empty() {
        return Err(SelectionError::NoMatchingAudio.into());
    }

    let native: Vec<_> = audio_matching
        .iter()
        .copied()
        .filter(|stream| stream.hardsub_locale == settings.hardsub_locale)
        .collect();

    let (source, hardsub) = match native.first() {
        Some(stream) => (*stream, HardsubInfo::native(settings.hardsub_locale)),
        None => {
            // Burn a soft subtitle into a stream without hardsubs.
            let clean = audio_matching
                .iter()
                .copied()
                .find(|stream| stream.hardsub_locale == Locale::None);
            let subtitle = response.subtitles_with_locale(settings.hardsub_locale).next();
            match (clean, subtitle) {
                (Some(stream), Some(subtitle)) => (
                    stream,
                    HardsubInfo {
                        is_native: false,
                        locale: settings.hardsub_locale,
                        url: subtitle.url.clone(),
                    },
                ),
                _ => return Err(SelectionError::NoMatchingHardsub.into()),
            }
        }
    };
    debug!(stream = %source, native = hardsub.is_native, "Selected stream");

    let resolutions = fetch_resolutions(transport, &source.url).await?;
    let desired = settings.video_height.height();
    let (height, program_ids) = pick_resolution(&resolutions, desired, settings.strict_matching)?;
    if height != desired {
        info!(desired, height, "Desired resolution not available, using a lower one");
    }

    let subtitles = select_subtitles(response, settings)?;

    Ok(DownloadSelection {
        url: source.url.clone(),
        audio_locale: settings.audio_locale,
        program_ids,
        hardsub,
        subtitles,
    })
}

/// Audio locales offered by the response, in order of first appearance.
pub fn available_audio_locales(response: &StreamResponse) -> Vec<Locale> {
    let mut seen = HashSet::new();
    response
        .streams
        .iter()
        .map(|stream| stream.audio_locale)
        .filter(|locale| seen.insert(*locale))
        .collect()
}

/// Hardsub locales reachable with `audio`, natively or by burning in a subtitle.
pub fn available_hardsub_locales(response: &StreamResponse, audio: Locale) -> Vec<Locale> {
    let mut locales: Vec<Locale> = Vec::new();
    let mut push = |locale: Locale| {
        if locale != Locale::Undefined && !locales.contains(&locale) {
            locales.push(locale);
        }
    };

    let mut has_clean_stream = false;
    for stream in response.streams_with_audio(audio) {
        has_clean_stream |= stream.hardsub_locale == Locale::None;
        push(stream.hardsub_locale);
    }
    if has_clean_stream {
        for subtitle in &response.subtitles {
            push(subtitle.locale);
        }
    }

    locales
}

/// Heights available for the `audio`/`hardsub` combination, highest first.
///
/// Looks at every suitable stream, falling back to the streams without
/// hardsubs when the locale has to be burned in.
pub async fn available_resolutions(
    response: &StreamResponse,
    audio: Locale,
    hardsub: Locale,
    transport: &dyn HttpTransport,
) -> Result<Vec<u32>> {
    let mut urls: BTreeSet<&str> = response
        .streams_with_audio(audio)
        .filter(|stream| stream.hardsub_locale == hardsub)
        .map(|stream| stream.url.as_str())
        .collect();
    if urls.is_empty() {
        urls = response
            .streams_with_audio(audio)
            .filter(|stream| stream.hardsub_locale == Locale::None)
            .map(|stream| stream.url.as_str())
            .collect();
    }

    let mut heights = BTreeSet::new();
    for url in urls {
        match fetch_resolutions(transport, url).await {
            Ok(resolutions) => heights.extend(resolutions.into_keys()),
            Err(Error::Api(error)) => warn!(url, %error, "Failed to fetch playlist"),
            Err(error) => return Err(error),
        }
    }

    Ok(heights.into_iter().rev().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Resolution;
    use async_trait::async_trait;
    use bytes::Bytes;
    use kamyroll_api::{
        Channel, CommonMetadata, Images, Metadata, MovieMetadata, ResponseKind, Stream,
        StreamKind,
    };
    use std::collections::HashMap;
    use std::time::Duration;

    const PLAYLIST_720_480: &str = "#EXTM3U\n\
        #EXT-X-STREAM-INF:BANDWIDTH=2000000,RESOLUTION=1280x720\n\
        720.m3u8\n\
        #EXT-X-STREAM-INF:BANDWIDTH=1000000,RESOLUTION=848x480\n\
        480.m3u8\n";

    struct FakeTransport(HashMap<String, &'static str>);

    #[async_trait]
    impl HttpTransport for FakeTransport {
        async fn get(&self, url: &str, _params: &[(String, String)]) -> kamyroll_api::Result<Bytes> {
            Ok(Bytes::from_static(
                self.0.get(url).copied().unwrap_or_default().as_bytes(),
            ))
        }
    }

    fn stream(audio: Locale, hardsub: Locale, url: &str) -> Stream {
        Stream {
            kind: StreamKind::AdaptiveHls,
            audio_locale: audio,
            hardsub_locale: hardsub,
            url: url.to_string(),
        }
    }

    fn subtitle(locale: Locale, url: &str) -> Subtitle {
        Subtitle {
            locale,
            url: url.to_string(),
            format: "ass".to_string(),
        }
    }

    fn response(streams: Vec<Stream>, subtitles: Vec<Subtitle>) -> StreamResponse {
        StreamResponse {
            kind: ResponseKind::Movie,
            channel: Channel::Crunchyroll,
            metadata: Metadata::Movie(MovieMetadata {
                common: CommonMetadata {
                    title: "Film".to_string(),
                    duration: Duration::from_secs(60),
                    description: String::new(),
                    year: 2020,
                },
            }),
            images: Images::new(),
            streams,
            subtitles,
        }
    }

    fn transport() -> FakeTransport {
        FakeTransport(HashMap::from([
            ("clean".to_string(), PLAYLIST_720_480),
            ("hard-en".to_string(), PLAYLIST_720_480),
        ]))
    }

    #[test]
    fn subtitles_take_first_match_per_locale() {
        let response = response(
            vec![],
            vec![
                subtitle(Locale::EnglishUs, "en-1"),
                subtitle(Locale::FrenchFr, "fr"),
                subtitle(Locale::EnglishUs, "en-2"),
            ],
        );
        let settings = Settings {
            subtitle_locales: vec![Locale::EnglishUs, Locale::FrenchFr, Locale::EnglishUs],
            ..Settings::default()
        };
        let selected = select_subtitles(&response, &settings).unwrap();
        let urls: Vec<_> = selected.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, ["en-1", "fr"]);
    }

    #[test]
    fn missing_subtitles_fail_only_when_strict() {
        let response = response(vec![], vec![subtitle(Locale::EnglishUs, "en")]);
        let mut settings = Settings {
            subtitle_locales: vec![Locale::EnglishUs, Locale::GermanDe],
            ..Settings::default()
        };
        assert_eq!(select_subtitles(&response, &settings).unwrap().len(), 1);

        settings.strict_matching = true;
        assert_eq!(
            select_subtitles(&response, &settings),
            Err(SelectionError::MissingSubtitles(vec![Locale::GermanDe]))
        );
    }

    #[test]
    fn no_requested_subtitles_is_never_an_error() {
        let response = response(vec![], vec![subtitle(Locale::EnglishUs, "en")]);
        let settings = Settings {
            strict_matching: true,
            ..Settings::default()
        };
        assert!(select_subtitles(&response, &settings).unwrap().is_empty());
    }

    #[test]
    fn resolution_fallback() {
        let resolutions = ResolutionMap::from([(720, vec![0]), (480, vec![1])]);
        assert_eq!(pick_resolution(&resolutions, 1080, false), Ok((720, vec![0])));
        assert_eq!(pick_resolution(&resolutions, 480, true), Ok((480, vec![1])));
        assert_eq!(
            pick_resolution(&resolutions, 1080, true),
            Err(SelectionError::ResolutionUnavailable { desired: 1080 })
        );
        assert_eq!(
            pick_resolution(&resolutions, 360, false),
            Err(SelectionError::NoResolutionAtOrBelow { desired: 360 })
        );
        assert_eq!(
            pick_resolution(&ResolutionMap::new(), 360, false),
            Err(SelectionError::EmptyPlaylist)
        );
    }

    #[tokio::test]
    async fn native_hardsub_is_preferred() {
        let response = response(
            vec![
                stream(Locale::JapaneseJp, Locale::None, "clean"),
                stream(Locale::JapaneseJp, Locale::EnglishUs, "hard-en"),
            ],
            vec![subtitle(Locale::EnglishUs, "en.ass")],
        );
        let settings = Settings {
            hardsub_locale: Locale::EnglishUs,
            ..Settings::default()
        };

        let selection = select_stream(&response, &settings, &transport()).await.unwrap();
        assert_eq!(selection.url, "hard-en");
        assert_eq!(selection.hardsub, HardsubInfo::native(Locale::EnglishUs));
        assert_eq!(selection.program_ids, vec![0]);
    }

    #[tokio::test]
    async fn soft_subtitle_is_burned_in_when_no_native_hardsub() {
        let response = response(
            vec![stream(Locale::JapaneseJp, Locale::None, "clean")],
            vec![subtitle(Locale::FrenchFr, "fr.ass")],
        );
        let settings = Settings {
            hardsub_locale: Locale::FrenchFr,
            video_height: Resolution::R480,
            ..Settings::default()
        };

        let selection = select_stream(&response, &settings, &transport()).await.unwrap();
        assert_eq!(selection.url, "clean");
        assert!(!selection.hardsub.is_native);
        assert_eq!(selection.hardsub.url, "fr.ass");
        assert_eq!(selection.program_ids, vec![1]);
    }

    #[tokio::test]
    async fn classified_failures() {
        let response = response(
            vec![stream(Locale::JapaneseJp, Locale::EnglishUs, "hard-en")],
            vec![],
        );

        let settings = Settings {
            audio_locale: Locale::GermanDe,
            ..Settings::default()
        };
        let err = select_stream(&response, &settings, &transport()).await.unwrap_err();
        assert_eq!(err.as_selection(), Some(&SelectionError::NoMatchingAudio));

        let settings = Settings::default();
        let err = select_stream(&response, &settings, &transport()).await.unwrap_err();
        assert_eq!(err.as_selection(), Some(&SelectionError::NoMatchingHardsub));
    }

    #[tokio::test]
    async fn clean_stream_without_hardsub_subtitle() {
        let response = response(
            vec![stream(Locale::JapaneseJp, Locale::None, "clean")],
            vec![subtitle(Locale::FrenchFr, "fr.ass")],
        );
        let settings = Settings {
            hardsub_locale: Locale::GermanDe,
            ..Settings::default()
        };
        let err = select_stream(&response, &settings, &transport()).await.unwrap_err();
        assert_eq!(err.as_selection(), Some(&SelectionError::NoMatchingHardsub));
    }

    #[tokio::test]
    async fn selection_is_idempotent() {
        let response = response(
            vec![stream(Locale::JapaneseJp, Locale::None, "clean")],
            vec![subtitle(Locale::EnglishUs, "en.ass")],
        );
        let settings = Settings {
            subtitle_locales: vec![Locale::EnglishUs],
            ..Settings::default()
        };
        let transport = transport();
        let first = select_stream(&response, &settings, &transport).await.unwrap();
        let second = select_stream(&response, &settings, &transport).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.program_ids, vec![0]);
    }

    #[test]
    fn subtitle_only_selection_has_no_programs() {
        let selection = subtitle_only_selection(vec![subtitle(Locale::EnglishUs, "en")]);
        assert!(selection.is_subtitle_only());
        assert!(selection.url.is_empty());
        assert!(selection.hardsub.is_native);
        assert_eq!(selection.hardsub.locale, Locale::None);
    }

    #[tokio::test]
    async fn reprompt_helpers() {
        let response = response(
            vec![
                stream(Locale::JapaneseJp, Locale::None, "clean"),
                stream(Locale::JapaneseJp, Locale::EnglishUs, "hard-en"),
                stream(Locale::EnglishUs, Locale::None, "dub"),
            ],
            vec![
                subtitle(Locale::FrenchFr, "fr"),
                subtitle(Locale::Undefined, "und"),
            ],
        );

        assert_eq!(
            available_audio_locales(&response),
            vec![Locale::JapaneseJp, Locale::EnglishUs]
        );
        assert_eq!(
            available_hardsub_locales(&response, Locale::JapaneseJp),
            vec![Locale::None, Locale::EnglishUs, Locale::FrenchFr]
        );

        let heights = available_resolutions(&response, Locale::JapaneseJp, Locale::FrenchFr, &transport())
            .await
            .unwrap();
        assert_eq!(heights, vec![720, 480]);
    }
}
