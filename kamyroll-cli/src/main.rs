mod cli;
mod commands;
mod config;
mod delegate;
mod output;

use anyhow::Result;
use clap::Parser;
use colored::*;
use kamyroll::AppConfig;
use kamyroll::logging::{LOG_RETENTION_DAYS, cleanup_old_logs, init_logging};
use std::process;
use tracing::{debug, error, warn};

use crate::cli::{Args, Commands};

/// Console directive for the `-v`/`-q` flags. Without either, only warnings
/// reach the terminal so the progress bars stay readable.
fn console_filter(verbose: bool, quiet: bool) -> &'static str {
    if quiet {
        "error"
    } else if verbose {
        "kamyroll=debug,kamyroll_api=debug,kamyroll_cli=debug"
    } else {
        "warn"
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Application error: {e:#}");
        eprintln!("{} {e:#}", "Error:".red().bold());
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let log_dir = args.log_dir.clone().unwrap_or_else(config::default_log_dir);
    let _guard = init_logging(&log_dir, Some(console_filter(args.verbose, args.quiet)))?;
    match cleanup_old_logs(&log_dir, LOG_RETENTION_DAYS).await {
        Ok(count) => debug!(count, "Checked old log files"),
        Err(e) => warn!(error = %e, "Failed to clean up old log files"),
    }

    // A broken settings file must not prevent resetting it.
    let app = match &args.command {
        Commands::Config { reset: true, .. } => AppConfig::default(),
        _ => config::load(args.config.as_deref())?,
    };

    match args.command {
        Commands::Download { batch } => commands::download(app, batch, false).await,
        Commands::Subtitles { batch } => commands::download(app, batch, true).await,
        Commands::Services => commands::services(app).await,
        Commands::Config {
            show,
            reset,
            episode_format,
            movie_format,
            download_path,
        } => commands::configure(
            args.config.as_deref(),
            app,
            show,
            reset,
            episode_format,
            movie_format,
            download_path,
        ),
    }
}
