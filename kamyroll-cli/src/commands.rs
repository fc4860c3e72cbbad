use anyhow::{Context, Result, bail};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use kamyroll::downloader::{DownloadQueue, FfmpegRunner};
use kamyroll::{AppConfig, Settings};
use kamyroll_api::{ApiClient, ConfigHandle, HttpTransport, ReqwestTransport};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::Batch;
use crate::config;
use crate::delegate::TerminalDelegate;
use crate::output::{print_services, print_summary};

/// Settings for this run: the saved ones with the command line on top.
pub fn apply_overrides(mut settings: Settings, batch: &Batch) -> Settings {
    if let Some(audio) = batch.audio {
        settings.audio_locale = audio;
    }
    if let Some(hardsub) = batch.hardsub {
        settings.hardsub_locale = hardsub;
    }
    if let Some(subtitles) = &batch.subtitles {
        settings.subtitle_locales = subtitles.clone();
    }
    if let Some(resolution) = batch.resolution {
        settings.video_height = resolution;
    }
    if let Some(output) = &batch.output {
        settings.download_path = output.clone();
    }
    settings.strict_matching |= batch.strict;
    settings.use_own_credentials |= batch.login;
    settings.separate_subtitles |= batch.separate_subtitles;
    settings.write_metadata |= batch.metadata;
    settings
}

/// URLs from the command line followed by those of the input file.
///
/// Blank lines and `#` comments in the file are ignored.
pub fn collect_urls(batch: &Batch) -> Result<Vec<String>> {
    let mut urls = batch.urls.clone();
    if let Some(input) = &batch.input {
        let text = std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read URL list {}", input.display()))?;
        urls.extend(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string),
        );
    }
    Ok(urls)
}

fn spinner(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(Duration::from_millis(120));
    if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb
}

fn api_client(app: &AppConfig, token: &CancellationToken) -> Result<(ApiClient, Arc<dyn HttpTransport>)> {
    let transport: Arc<dyn HttpTransport> = Arc::new(
        ReqwestTransport::new(app.api.timeout()).context("Failed to create the HTTP client")?,
    );
    let client = ApiClient::new(transport.clone(), app.api.clone(), token.clone());
    Ok((client, transport))
}

async fn load_services(client: &ApiClient) -> Result<ConfigHandle> {
    let pb = spinner("Loading service configuration...");
    let mut services = ConfigHandle::new();
    let result = services.refresh(client).await.map(|_| ());
    pb.finish_and_clear();
    result.context("Failed to load the service configuration")?;
    Ok(services)
}

/// Cancel `token` on Ctrl-C.
fn halt_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, halting the download");
            token.cancel();
        }
    });
}

pub async fn download(app: AppConfig, batch: Batch, subtitles_only: bool) -> Result<()> {
    let urls = collect_urls(&batch)?;
    if urls.is_empty() {
        bail!("No URLs to download");
    }
    let settings = apply_overrides(app.settings.clone(), &batch);
    settings.validate()?;

    let token = CancellationToken::new();
    halt_on_interrupt(token.clone());

    let (client, transport) = api_client(&app, &token)?;
    let services = load_services(&client).await?;

    let runner = FfmpegRunner::new(app.ffmpeg.clone());
    match runner.detect_version().await {
        Some(version) => info!(%version, "Found ffmpeg"),
        None => {
            warn!(binary = %app.ffmpeg.binary_path, "ffmpeg did not answer -version");
            eprintln!(
                "{} could not run {}, downloads will fail",
                "Warning:".yellow().bold(),
                app.ffmpeg.binary_path
            );
        }
    }

    let mut queue = DownloadQueue::new(client, services, Arc::new(runner), settings, token.clone())
        .subtitles_only(subtitles_only);
    let mut delegate = TerminalDelegate::new(transport, subtitles_only, token);
    let summary = queue.run(&urls, &mut delegate).await?;

    print_summary(&summary, &urls);
    if !summary.failed.is_empty() {
        bail!("{} of {} items failed", summary.failed.len(), summary.total);
    }
    Ok(())
}

pub async fn services(app: AppConfig) -> Result<()> {
    let token = CancellationToken::new();
    let (client, _) = api_client(&app, &token)?;
    let services = load_services(&client).await?;
    if let Some(config) = services.get() {
        print_services(config);
    }
    Ok(())
}

pub fn configure(
    path: Option<&Path>,
    mut app: AppConfig,
    show: bool,
    reset: bool,
    episode_format: Option<String>,
    movie_format: Option<String>,
    download_path: Option<PathBuf>,
) -> Result<()> {
    if reset {
        let path = config::reset(path)?;
        println!("{} {}", "✓ Configuration reset to defaults:".green(), path.display());
        return Ok(());
    }

    let edited = episode_format.is_some() || movie_format.is_some() || download_path.is_some();
    if let Some(format) = episode_format {
        app.settings.episode_format = format;
    }
    if let Some(format) = movie_format {
        app.settings.movie_format = format;
    }
    if let Some(download_path) = download_path {
        app.settings.download_path = download_path;
    }
    if edited {
        let path = config::save(path, &app)?;
        println!("{} {}", "✓ Settings saved to".green(), path.display());
    }

    if show {
        println!("{}", config::show(&app)?);
    } else if !edited {
        println!("Use --show to display the current settings or --reset to restore the defaults");
    }
    Ok(())
}
