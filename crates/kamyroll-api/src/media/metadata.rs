use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fields shared by every kind of media unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonMetadata {
    pub title: String,
    pub duration: Duration,
    pub description: String,
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeMetadata {
    #[serde(flatten)]
    pub common: CommonMetadata,
    pub series: String,
    pub season: u32,
    pub season_name: String,
    pub episode: u32,
    /// Display form of the episode number, e.g. `"12.5"` or `"SP"`.
    pub episode_disp: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieMetadata {
    #[serde(flatten)]
    pub common: CommonMetadata,
}

/// Metadata of a resolved media unit, tagged by its kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Metadata {
    Episode(EpisodeMetadata),
    Movie(MovieMetadata),
}

/// Date layout used for metadata tags and filename interpolation.
pub const METADATA_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl Metadata {
    pub fn common(&self) -> &CommonMetadata {
        match self {
            Self::Episode(episode) => &episode.common,
            Self::Movie(movie) => &movie.common,
        }
    }

    pub fn title(&self) -> &str {
        &self.common().title
    }

    pub fn duration(&self) -> Duration {
        self.common().duration
    }

    pub fn is_episode(&self) -> bool {
        matches!(self, Self::Episode(_))
    }

    /// Named fields available to filename templates, as unescaped strings.
    pub fn template_fields(&self) -> Vec<(&'static str, String)> {
        let common = self.common();
        let mut fields = vec![
            ("title", common.title.clone()),
            ("duration", format_duration(common.duration)),
            ("description", common.description.clone()),
            ("year", common.year.to_string()),
        ];

        if let Self::Episode(episode) = self {
            fields.extend([
                ("series", episode.series.clone()),
                ("season", episode.season.to_string()),
                ("season_name", episode.season_name.clone()),
                ("episode", episode.episode.to_string()),
                ("episode_disp", episode.episode_disp.clone()),
                ("date", episode.date.format(METADATA_DATE_FORMAT).to_string()),
            ]);
        }

        fields
    }
}

/// Format a duration as `H:MM:SS`, with microseconds when present.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total / 60) % 60, total % 60);
    let micros = duration.subsec_micros();
    if micros == 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{hours}:{minutes:02}:{seconds:02}.{micros:06}")
    }
}
