use clap::{Args as ClapArgs, Parser, Subcommand};
use kamyroll::Resolution;
use kamyroll_api::{Locale, locale_from_code};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "kamyroll")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (defaults to the user configuration directory)
    #[arg(short, long, global = true, env = "KAMYROLL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory receiving the per-run log files
    #[arg(long, global = true, env = "KAMYROLL_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Show debug output on the console
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only show errors on the console
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download videos
    Download {
        #[command(flatten)]
        batch: Batch,
    },

    /// Download subtitle files only
    Subtitles {
        #[command(flatten)]
        batch: Batch,
    },

    /// List the services the backend supports
    Services,

    /// Show, reset or edit the saved settings
    Config {
        /// Print the current settings
        #[arg(long)]
        show: bool,

        /// Restore the default settings
        #[arg(long, conflicts_with_all = ["show", "episode_format", "movie_format"])]
        reset: bool,

        /// Filename template for episodes
        #[arg(long)]
        episode_format: Option<String>,

        /// Filename template for movies
        #[arg(long)]
        movie_format: Option<String>,

        /// Default download directory
        #[arg(long)]
        download_path: Option<PathBuf>,
    },
}

/// Inputs and per-run overrides shared by the download commands.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct Batch {
    /// Media URLs
    #[arg(required_unless_present = "input")]
    pub urls: Vec<String>,

    /// File with one URL per line
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Audio locale (e.g. ja-JP)
    #[arg(long, value_parser = parse_locale)]
    pub audio: Option<Locale>,

    /// Burned-in subtitle locale, `none` for a clean video
    #[arg(long, value_parser = parse_locale)]
    pub hardsub: Option<Locale>,

    /// Subtitle locales to include
    #[arg(long, value_delimiter = ',', value_parser = parse_locale)]
    pub subtitles: Option<Vec<Locale>>,

    /// Video height
    #[arg(long, value_parser = parse_resolution)]
    pub resolution: Option<Resolution>,

    /// Download directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Fail instead of falling back to other variants
    #[arg(long)]
    pub strict: bool,

    /// Ask for service credentials instead of using the bypass
    #[arg(long)]
    pub login: bool,

    /// Write subtitles next to the video instead of embedding them
    #[arg(long)]
    pub separate_subtitles: bool,

    /// Embed metadata and cover art
    #[arg(long)]
    pub metadata: bool,
}

pub fn parse_locale(value: &str) -> Result<Locale, String> {
    if value.eq_ignore_ascii_case("none") {
        return Ok(Locale::None);
    }
    locale_from_code(value).ok_or_else(|| format!("unknown locale {value:?}"))
}

pub fn parse_resolution(value: &str) -> Result<Resolution, String> {
    let height: u32 = value
        .trim_end_matches(['p', 'P'])
        .parse()
        .map_err(|_| format!("invalid resolution {value:?}"))?;
    Resolution::try_from(height)
}
