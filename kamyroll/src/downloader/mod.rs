//! Download pipeline for Kamyroll media.
//!
//! The downloader is responsible for:
//! - Resolving master playlists into resolution to program id maps
//! - Reconciling user settings with the streams an API response offers
//! - Building the ffmpeg argument list for a selection
//! - Running ffmpeg and parsing its progress output
//! - Processing a batch of URLs one at a time

pub mod arguments;
pub mod engine;
pub mod playlist;
pub mod queue;
pub mod selector;

pub use arguments::{ArgumentPlan, POSTER_SLOT, build_arguments, output_path, subtitle_filter};
pub use engine::{
    FfmpegRunner, ProcessEvent, Progress, ProgressRecord, TranscodeJob, TranscodeSink, Transcoder,
};
pub use playlist::{ResolutionMap, resolve_playlist};
pub use queue::{
    DownloadQueue, QueueDelegate, QueueEvent, QueueSummary, SettingsOverride, item_label,
    progress_label,
};
pub use selector::{
    DownloadSelection, HardsubInfo, available_audio_locales, available_hardsub_locales,
    available_resolutions, fetch_resolutions, pick_resolution, select_stream, select_subtitles,
    subtitle_only_selection,
};
