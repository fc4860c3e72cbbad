//! ffmpeg argument construction for a resolved [`DownloadSelection`].
//!
//! The order of the emitted arguments is significant: inputs first (media,
//! then one per subtitle, then the cover art when muxed as an input), then
//! codec, metadata and mapping options, then the combined output, and finally
//! the per-subtitle outputs.

use kamyroll_api::{HttpTransport, Images, METADATA_DATE_FORMAT, Metadata, iso639_2};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::selector::DownloadSelection;
use crate::Result;
use crate::config::Settings;
use crate::utils::filename::format_name;
use crate::utils::fs;

/// Image slot embedded as cover art.
pub const POSTER_SLOT: &str = "poster_tall";

/// Everything needed to run one transcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentPlan {
    pub arguments: Vec<String>,
    /// Combined output file (also the base name of separate subtitle files).
    pub output_path: PathBuf,
    /// Temporary files referenced by `arguments`. Not removed by the engine.
    pub temp_files: Vec<PathBuf>,
}

/// Output file for `metadata`: the rendered template under the download path.
///
/// Separate subtitle files go with an `.mp4` container, embedded ones with `.mkv`.
pub fn output_path(settings: &Settings, metadata: &Metadata) -> Result<PathBuf> {
    let template = match metadata {
        Metadata::Episode(_) => &settings.episode_format,
        Metadata::Movie(_) => &settings.movie_format,
    };
    let name = format_name(template, metadata)?;
    let extension = if settings.separate_subtitles { "mp4" } else { "mkv" };
    Ok(settings.download_path.join(format!("{name}.{extension}")))
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn escape(value: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if special.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// `subtitles=<url>` with the url escaped for both the option value and the
/// filtergraph level.
pub fn subtitle_filter(url: &str) -> String {
    let option_value = escape(url, &['\\', '\'', ':']);
    let graph_value = escape(&option_value, &['\\', '\'', '[', ']', ',', ';']);
    format!("subtitles={graph_value}")
}

fn input_args(selection: &DownloadSelection, subtitles_only: bool) -> Vec<String> {
    let mut args = Vec::new();
    if !subtitles_only {
        args.extend(["-i".to_string(), selection.url.clone()]);
    }
    for subtitle in &selection.subtitles {
        args.extend(["-i".to_string(), subtitle.url.clone()]);
    }
    args
}

/// Cover art arguments, split into the input part and the deferred mapping part.
fn image_args(file: &Path, position: usize, is_mp4: bool) -> (Vec<String>, Vec<String>) {
    let file = path_arg(file);
    if is_mp4 {
        (
            vec!["-i".to_string(), file],
            vec![
                "-map".to_string(),
                position.to_string(),
                "-disposition:v:1".to_string(),
                "attached_pic".to_string(),
            ],
        )
    } else {
        (
            Vec::new(),
            vec![
                "-attach".to_string(),
                file,
                "-metadata:s:t".to_string(),
                "mimetype=image/jpeg".to_string(),
            ],
        )
    }
}

fn metadata_args(selection: &DownloadSelection, metadata: &Metadata) -> Vec<String> {
    let mut args = vec![
        "-metadata:s:a:0".to_string(),
        format!("language={}", iso639_2(selection.audio_locale)),
    ];

    let hardsub_language = iso639_2(selection.hardsub.locale);
    if !hardsub_language.is_empty() {
        args.extend([
            "-metadata:s:v:0".to_string(),
            format!("language={hardsub_language}"),
        ]);
    }

    for (index, subtitle) in selection.subtitles.iter().enumerate() {
        args.extend([
            format!("-metadata:s:s:{index}"),
            format!("language={}", iso639_2(subtitle.locale)),
        ]);
    }

    let common = metadata.common();
    let mut tags = vec![
        format!("title={}", common.title),
        format!("year={}", common.year),
        format!("description={}", common.description),
    ];
    if let Metadata::Episode(episode) = metadata {
        tags.extend([
            format!("show={}", episode.series),
            format!("season_number={}", episode.season),
            format!("episode_sort={}", episode.episode),
            format!("episode_id={}", episode.episode_disp),
            format!("date={}", episode.date.format(METADATA_DATE_FORMAT)),
        ]);
    }
    for tag in tags {
        args.extend(["-metadata".to_string(), tag]);
    }

    args
}

fn video_mapping_args(selection: &DownloadSelection) -> Vec<String> {
    let mut args = Vec::new();
    for program_id in &selection.program_ids {
        args.extend(["-map".to_string(), format!("0:p:{program_id}:v?")]);
        args.extend(["-map".to_string(), format!("0:p:{program_id}:a?")]);
    }
    if !selection.hardsub.is_native {
        args.extend(["-vf".to_string(), subtitle_filter(&selection.hardsub.url)]);
    }
    args
}

fn subtitle_mapping_args(selection: &DownloadSelection) -> Vec<String> {
    // Input 0 is the media itself.
    (1..=selection.subtitles.len())
        .flat_map(|index| ["-map".to_string(), index.to_string()])
        .collect()
}

fn separate_subtitle_args(
    selection: &DownloadSelection,
    base_path: &Path,
    subtitles_only: bool,
) -> Vec<String> {
    let start = if subtitles_only { 0 } else { 1 };
    let mut args = Vec::new();
    for (index, subtitle) in selection.subtitles.iter().enumerate() {
        let extension = format!("{}.ass", iso639_2(subtitle.locale));
        args.extend([
            "-map".to_string(),
            (start + index).to_string(),
            path_arg(&base_path.with_extension(extension)),
        ]);
    }
    args
}

async fn fetch_poster(images: &Images, transport: &dyn HttpTransport) -> Result<Option<PathBuf>> {
    let Some(poster) = images.get(POSTER_SLOT).and_then(|set| set.max()) else {
        return Ok(None);
    };
    let data = transport.get(&poster.source, &[]).await?;
    let file = fs::write_kept_tempfile(".jpeg", &data).await?;
    debug!(file = %file.display(), source = %poster.source, "Created tempfile");
    Ok(Some(file))
}

/// Build the ffmpeg arguments for one download.
///
/// Creates the parent directories of every output before returning.
pub async fn build_arguments(
    settings: &Settings,
    selection: &DownloadSelection,
    metadata: &Metadata,
    images: &Images,
    subtitles_only: bool,
    transport: &dyn HttpTransport,
) -> Result<ArgumentPlan> {
    let output_path = output_path(settings, metadata)?;
    fs::ensure_parent_dir(&output_path).await?;

    let mut arguments = input_args(selection, subtitles_only);
    let mut temp_files = Vec::new();

    if !subtitles_only {
        let mut image_mapping = Vec::new();
        if settings.write_metadata {
            if let Some(file) = fetch_poster(images, transport).await? {
                let position = arguments.len() / 2;
                let (inputs, mapping) = image_args(&file, position, settings.separate_subtitles);
                arguments.extend(inputs);
                image_mapping = mapping;
                temp_files.push(file);
            }
        }

        if !settings.compress_streams {
            arguments.extend(["-c:a", "copy", "-c:v", "copy"].map(String::from));
        }
        if settings.write_metadata {
            arguments.extend(metadata_args(selection, metadata));
        }

        arguments.extend(video_mapping_args(selection));
        if !settings.separate_subtitles {
            arguments.extend(subtitle_mapping_args(selection));
        }
        arguments.extend(image_mapping);

        arguments.push(path_arg(&output_path));
    }

    if settings.separate_subtitles || subtitles_only {
        let file_name = output_path.file_name().unwrap_or_default();
        let subtitle_base = output_path
            .parent()
            .unwrap_or(Path::new(""))
            .join(&settings.subtitle_prefix)
            .join(file_name);
        fs::ensure_parent_dir(&subtitle_base).await?;
        arguments.extend(separate_subtitle_args(selection, &subtitle_base, subtitles_only));
    }

    debug!(?arguments, "Constructed ffmpeg arguments");
    Ok(ArgumentPlan {
        arguments,
        output_path,
        temp_files,
    })
}
