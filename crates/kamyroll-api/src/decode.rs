//! Explicit decoders from API JSON into the typed model.
//!
//! Every required key is checked; a missing key, a value of the wrong type,
//! an unknown locale or an unparsable date becomes [`ApiError::Decode`]
//! instead of a silently defaulted field.

use crate::error::{ApiError, Result};
use crate::media::{
    CommonMetadata, EpisodeMetadata, Image, ImageSet, Images, Locale, Metadata, MovieMetadata,
    ResponseKind, Stream, StreamKind, StreamResponse, Subtitle,
};
use crate::service::{Channel, Service, ServiceConfig};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::time::Duration;

type Object = Map<String, Value>;

fn object<'a>(value: &'a Value, entity: &'static str) -> Result<&'a Object> {
    value
        .as_object()
        .ok_or_else(|| ApiError::decode(entity, "expected an object"))
}

fn field<'a>(object: &'a Object, key: &str, entity: &'static str) -> Result<&'a Value> {
    match object.get(key) {
        Some(Value::Null) | None => Err(ApiError::decode(
            entity,
            format!("the required key {key} is missing"),
        )),
        Some(value) => Ok(value),
    }
}

fn string(object: &Object, key: &str, entity: &'static str) -> Result<String> {
    field(object, key, entity)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ApiError::decode(entity, format!("{key} must be a string")))
}

fn integer(object: &Object, key: &str, entity: &'static str) -> Result<i64> {
    field(object, key, entity)?
        .as_i64()
        .ok_or_else(|| ApiError::decode(entity, format!("{key} must be an integer")))
}

fn unsigned(object: &Object, key: &str, entity: &'static str) -> Result<u32> {
    let value = integer(object, key, entity)?;
    u32::try_from(value)
        .map_err(|_| ApiError::decode(entity, format!("{key} out of range: {value}")))
}

fn boolean(object: &Object, key: &str, entity: &'static str) -> Result<bool> {
    field(object, key, entity)?
        .as_bool()
        .ok_or_else(|| ApiError::decode(entity, format!("{key} must be a boolean")))
}

fn array<'a>(object: &'a Object, key: &str, entity: &'static str) -> Result<&'a Vec<Value>> {
    field(object, key, entity)?
        .as_array()
        .ok_or_else(|| ApiError::decode(entity, format!("{key} must be a list")))
}

/// Decode a closed string enum through its serde representation.
fn tag<T: DeserializeOwned>(object: &Object, key: &str, entity: &'static str) -> Result<T> {
    let value = field(object, key, entity)?;
    T::deserialize(value).map_err(|_| ApiError::decode(entity, format!("unknown {key} {value}")))
}

pub fn locale(value: &Value) -> Result<Locale> {
    Locale::deserialize(value).map_err(|_| ApiError::decode("locale", format!("unknown locale {value}")))
}

pub fn stream(value: &Value) -> Result<Stream> {
    const ENTITY: &str = "stream";
    let object = object(value, ENTITY)?;
    Ok(Stream {
        kind: tag::<StreamKind>(object, "type", ENTITY)?,
        audio_locale: tag(object, "audio_locale", ENTITY)?,
        // An absent hardsub locale means a clean video.
        hardsub_locale: match object.get("hardsub_locale") {
            None | Some(Value::Null) => Locale::None,
            Some(value) => locale(value)?,
        },
        url: string(object, "url", ENTITY)?,
    })
}

pub fn subtitle(value: &Value) -> Result<Subtitle> {
    const ENTITY: &str = "subtitle";
    let object = object(value, ENTITY)?;
    Ok(Subtitle {
        locale: tag(object, "locale", ENTITY)?,
        url: string(object, "url", ENTITY)?,
        format: string(object, "format", ENTITY)?,
    })
}

pub fn image(value: &Value) -> Result<Image> {
    const ENTITY: &str = "image";
    let object = object(value, ENTITY)?;
    Ok(Image {
        width: unsigned(object, "width", ENTITY)?,
        height: unsigned(object, "height", ENTITY)?,
        source: string(object, "source", ENTITY)?,
    })
}

/// An image slot is either a list of renditions or a bare URL.
pub fn image_set(value: &Value) -> Result<ImageSet> {
    match value {
        Value::String(source) => Ok(ImageSet::from_source(source.clone())),
        Value::Array(entries) => Ok(ImageSet::new(
            entries.iter().map(image).collect::<Result<Vec<_>>>()?,
        )),
        other => Err(ApiError::decode("image set", format!("unexpected value {other}"))),
    }
}

pub fn images(value: &Value) -> Result<Images> {
    object(value, "images")?
        .iter()
        .map(|(slot, value)| Ok((slot.clone(), image_set(value)?)))
        .collect()
}

/// Parse an API timestamp.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]` / `YYYY-MM-DDTHH:MM:SS[.fff]`
/// without offset (taken as UTC) and integer Unix timestamps.
pub fn datetime(value: &Value) -> Result<DateTime<Utc>> {
    const ENTITY: &str = "date";
    match value {
        Value::Number(number) => number
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .ok_or_else(|| ApiError::decode(ENTITY, format!("invalid timestamp {number}"))),
        Value::String(text) => {
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                return Ok(parsed.with_timezone(&Utc));
            }
            ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                .map(|naive| naive.and_utc())
                .ok_or_else(|| ApiError::decode(ENTITY, format!("unknown date format {text:?}")))
        }
        other => Err(ApiError::decode(ENTITY, format!("expected a string or integer, got {other}"))),
    }
}

fn common_metadata(object: &Object, entity: &'static str) -> Result<CommonMetadata> {
    let duration_ms = integer(object, "duration", entity)?;
    let duration_ms = u64::try_from(duration_ms)
        .map_err(|_| ApiError::decode(entity, format!("negative duration {duration_ms}")))?;
    let year = integer(object, "year", entity)?;
    Ok(CommonMetadata {
        title: string(object, "title", entity)?,
        duration: Duration::from_millis(duration_ms),
        description: string(object, "description", entity)?,
        year: i32::try_from(year)
            .map_err(|_| ApiError::decode(entity, format!("year out of range: {year}")))?,
    })
}

pub fn episode_metadata(parent: &Value, episode: &Value) -> Result<EpisodeMetadata> {
    const ENTITY: &str = "episode metadata";
    let parent = object(parent, "parent metadata")?;
    let episode = object(episode, ENTITY)?;
    Ok(EpisodeMetadata {
        common: common_metadata(episode, ENTITY)?,
        series: string(parent, "title", "parent metadata")?,
        season: unsigned(episode, "season", ENTITY)?,
        season_name: string(episode, "season_name", ENTITY)?,
        episode: unsigned(episode, "episode", ENTITY)?,
        episode_disp: string(episode, "episode_disp", ENTITY)?,
        date: datetime(field(episode, "date", ENTITY)?)?,
    })
}

pub fn movie_metadata(value: &Value) -> Result<MovieMetadata> {
    const ENTITY: &str = "movie metadata";
    Ok(MovieMetadata {
        common: common_metadata(object(value, ENTITY)?, ENTITY)?,
    })
}

pub fn stream_response(value: &Value) -> Result<StreamResponse> {
    const ENTITY: &str = "stream response";
    let object = object(value, ENTITY)?;
    let kind: ResponseKind = tag(object, "type", ENTITY)?;
    let channel: Channel = tag(object, "channel_id", ENTITY)?;

    let metadata = match kind {
        ResponseKind::Episode => Metadata::Episode(episode_metadata(
            field(object, "parent_metadata", ENTITY)?,
            field(object, "episode_metadata", ENTITY)?,
        )?),
        ResponseKind::Movie => {
            Metadata::Movie(movie_metadata(field(object, "movie_metadata", ENTITY)?)?)
        }
    };

    let images = match object.get("images") {
        None | Some(Value::Null) => Images::new(),
        Some(value) => images(value)?,
    };

    Ok(StreamResponse {
        kind,
        channel,
        metadata,
        images,
        streams: array(object, "streams", ENTITY)?
            .iter()
            .map(stream)
            .collect::<Result<_>>()?,
        subtitles: array(object, "subtitles", ENTITY)?
            .iter()
            .map(subtitle)
            .collect::<Result<_>>()?,
    })
}

pub fn service(value: &Value) -> Result<Service> {
    const ENTITY: &str = "service";
    let object = object(value, ENTITY)?;
    let pattern = string(object, "regex", ENTITY)?;
    Ok(Service {
        id: string(object, "id", ENTITY)?,
        name: string(object, "name", ENTITY)?,
        regex: Regex::new(&pattern)
            .map_err(|e| ApiError::decode(ENTITY, format!("bad regex {pattern:?}: {e}")))?,
        active: boolean(object, "active", ENTITY)?,
        bypass: boolean(object, "bypass", ENTITY)?,
    })
}

pub fn service_config(value: &Value) -> Result<ServiceConfig> {
    const ENTITY: &str = "config";
    let object = object(value, ENTITY)?;
    let resolutions = match object.get("resolution") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(values)) => values
            .iter()
            .map(|value| {
                value
                    .as_u64()
                    .and_then(|height| u32::try_from(height).ok())
                    .ok_or_else(|| ApiError::decode(ENTITY, format!("bad resolution {value}")))
            })
            .collect::<Result<_>>()?,
        Some(other) => {
            return Err(ApiError::decode(ENTITY, format!("resolution must be a list, got {other}")));
        }
    };
    let updated = match object.get("updated") {
        None | Some(Value::Null) => None,
        Some(value) => Some(datetime(value)?),
    };
    Ok(ServiceConfig {
        services: array(object, "services", ENTITY)?
            .iter()
            .map(service)
            .collect::<Result<_>>()?,
        resolutions,
        updated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn episode_json() -> Value {
        json!({
            "type": "episode",
            "channel_id": "crunchyroll",
            "parent_metadata": { "title": "Show", "description": "A show" },
            "episode_metadata": {
                "title": "Pilot",
                "description": "First one",
                "duration": 1_420_000,
                "year": 2021,
                "season": 1,
                "season_name": "Show",
                "episode": 1,
                "episode_disp": "1",
                "date": "2021-10-01T12:30:00Z"
            },
            "images": {
                "poster_tall": [
                    { "width": 60, "height": 90, "source": "https://img/s.jpg" },
                    { "width": 1200, "height": 1800, "source": "https://img/l.jpg" }
                ],
                "thumbnail": "https://img/t.jpg"
            },
            "streams": [
                { "type": "adaptive_hls", "audio_locale": "ja-JP", "hardsub_locale": "", "url": "https://s/0.m3u8" },
                { "type": "adaptive_hls", "audio_locale": "ja-JP", "hardsub_locale": "en-US", "url": "https://s/1.m3u8" }
            ],
            "subtitles": [
                { "locale": "en-US", "url": "https://sub/en.ass", "format": "ass" }
            ]
        })
    }

    #[test]
    fn decodes_episode_response() {
        let response = stream_response(&episode_json()).unwrap();
        assert_eq!(response.kind, ResponseKind::Episode);
        assert_eq!(response.channel, Channel::Crunchyroll);
        assert_eq!(response.streams.len(), 2);
        assert_eq!(response.streams[0].hardsub_locale, Locale::None);
        assert_eq!(response.streams[1].hardsub_locale, Locale::EnglishUs);
        assert_eq!(response.subtitles[0].locale, Locale::EnglishUs);
        assert_eq!(response.images["poster_tall"].max().unwrap().width, 1200);
        assert_eq!(response.images["thumbnail"].len(), 1);

        let Metadata::Episode(episode) = &response.metadata else {
            panic!("expected episode metadata");
        };
        assert_eq!(episode.series, "Show");
        assert_eq!(episode.common.duration, Duration::from_secs(1420));
    }

    #[test]
    fn decodes_movie_response() {
        let value = json!({
            "type": "movie",
            "channel_id": "funimation",
            "movie_metadata": { "title": "Film", "description": "", "duration": 60_000, "year": 2019 },
            "streams": [],
            "subtitles": []
        });
        let response = stream_response(&value).unwrap();
        assert!(matches!(response.metadata, Metadata::Movie(_)));
        assert!(response.images.is_empty());
    }

    #[test]
    fn missing_key_is_a_decode_error() {
        let mut value = episode_json();
        value["episode_metadata"]
            .as_object_mut()
            .unwrap()
            .remove("season");
        let err = stream_response(&value).unwrap_err();
        assert!(matches!(err, ApiError::Decode { .. }), "{err}");
        assert!(err.to_string().contains("season"));
    }

    #[test]
    fn unknown_locale_is_a_decode_error() {
        let mut value = episode_json();
        value["streams"][0]["audio_locale"] = json!("xx-XX");
        assert!(matches!(
            stream_response(&value),
            Err(ApiError::Decode { .. })
        ));
    }

    #[test]
    fn wrong_kind_is_a_decode_error() {
        let mut value = episode_json();
        value["type"] = json!("series");
        assert!(stream_response(&value).is_err());
    }

    #[test]
    fn date_formats() {
        let expected = Utc.with_ymd_and_hms(2021, 10, 1, 12, 30, 0).unwrap();
        assert_eq!(datetime(&json!("2021-10-01T12:30:00Z")).unwrap(), expected);
        assert_eq!(datetime(&json!("2021-10-01T14:30:00+02:00")).unwrap(), expected);
        assert_eq!(datetime(&json!("2021-10-01 12:30:00")).unwrap(), expected);
        assert_eq!(datetime(&json!("2021-10-01T12:30:00.000")).unwrap(), expected);
        assert_eq!(datetime(&json!(expected.timestamp())).unwrap(), expected);
        assert!(datetime(&json!("yesterday")).is_err());
    }

    #[test]
    fn decodes_service_config() {
        let value = json!({
            "services": [
                { "id": "adn", "name": "ADN", "regex": r"https://animedigitalnetwork\.fr/video/[^/]+/(?P<id>\d+)", "active": true, "bypass": false }
            ],
            "resolution": [1080, 720],
            "updated": "2022-01-01 00:00:00"
        });
        let config = service_config(&value).unwrap();
        assert_eq!(config.services[0].id, "adn");
        assert_eq!(config.resolutions, vec![1080, 720]);
        let matched = config
            .parse_url("https://animedigitalnetwork.fr/video/show/12345")
            .unwrap();
        assert_eq!(matched.params["id"], "12345");
    }
}
