//! Logging bootstrap: console output plus one log file per run.
//!
//! This module provides:
//! - An `EnvFilter` seeded from `RUST_LOG` or [`DEFAULT_LOG_FILTER`]
//! - Local timezone timestamps for console and file output
//! - Log file retention cleanup (deletes logs older than 7 days)

use chrono::{Local, NaiveDateTime, Utc};
use std::path::Path;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::utils::fs;

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "kamyroll=debug,kamyroll_api=debug,kamyroll_cli=info";

/// Log retention period in days.
pub const LOG_RETENTION_DAYS: i64 = 7;

const LOG_FILE_PREFIX: &str = "kamyroll_";
const LOG_FILE_SUFFIX: &str = ".log";
const LOG_FILE_DATE_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Timestamps in the local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Name of the log file for a run started at `started`.
pub fn log_file_name(started: NaiveDateTime) -> String {
    format!(
        "{LOG_FILE_PREFIX}{}{LOG_FILE_SUFFIX}",
        started.format(LOG_FILE_DATE_FORMAT)
    )
}

fn parse_log_file_name(name: &str) -> Option<NaiveDateTime> {
    let stamp = name
        .strip_prefix(LOG_FILE_PREFIX)?
        .strip_suffix(LOG_FILE_SUFFIX)?;
    NaiveDateTime::parse_from_str(stamp, LOG_FILE_DATE_FORMAT).ok()
}

/// Initialize the global subscriber.
///
/// The log file always receives `RUST_LOG` or [`DEFAULT_LOG_FILTER`]. The
/// console gets `console_filter` when given (the CLI maps `-v`/`-q` onto it)
/// and the file directive otherwise. Keep the returned guard alive for the
/// whole run or buffered file output is lost.
pub fn init_logging(log_dir: &Path, console_filter: Option<&str>) -> crate::Result<WorkerGuard> {
    fs::ensure_dir_all_sync_with_op("creating log directory", log_dir)?;

    let file_name = log_file_name(Local::now().naive_local());
    let file_appender = tracing_appender::rolling::never(log_dir, &file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let invalid = |e: tracing_subscriber::filter::ParseError| {
        crate::Error::config(format!("Invalid log filter: {e}"))
    };
    let file_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))
        .map_err(invalid)?;
    let console_filter = match console_filter {
        Some(directive) => EnvFilter::try_new(directive).map_err(invalid)?,
        None => EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))
            .map_err(invalid)?,
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .with_timer(LocalTimer)
                .with_filter(console_filter),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer)
                .with_filter(file_filter),
        )
        .try_init()
        .map_err(|e| crate::Error::Other(format!("Failed to set global default subscriber: {e}")))?;

    debug!(file = %log_dir.join(&file_name).display(), "Logging initialized");
    Ok(guard)
}

/// Delete `kamyroll_*.log` files older than `retention_days`.
///
/// Returns how many files were removed. Files whose names do not carry a
/// timestamp are left alone.
pub async fn cleanup_old_logs(log_dir: &Path, retention_days: i64) -> std::io::Result<usize> {
    let cutoff = Utc::now().naive_utc() - chrono::Duration::days(retention_days);

    let mut entries = tokio::fs::read_dir(log_dir).await?;
    let mut deleted_count = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() {
            continue;
        }

        let Some(started) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_log_file_name)
        else {
            continue;
        };

        if started < cutoff {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to delete old log file");
            } else {
                deleted_count += 1;
                debug!(path = %path.display(), "Deleted old log file");
            }
        }
    }

    if deleted_count > 0 {
        info!(count = deleted_count, "Cleaned up old log files");
    }

    Ok(deleted_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_default_filter() {
        assert!(DEFAULT_LOG_FILTER.contains("kamyroll=debug"));
        assert!(DEFAULT_LOG_FILTER.contains("kamyroll_api=debug"));
    }

    #[test]
    fn file_name_round_trip() {
        let started = NaiveDate::from_ymd_opt(2022, 1, 30)
            .unwrap()
            .and_hms_opt(13, 5, 9)
            .unwrap();
        let name = log_file_name(started);
        assert_eq!(name, "kamyroll_2022-01-30_13-05-09.log");
        assert_eq!(parse_log_file_name(&name), Some(started));
        assert_eq!(parse_log_file_name("other.log"), None);
    }

    #[tokio::test]
    async fn cleanup_removes_only_expired_logs() {
        let dir = tempfile::TempDir::new().unwrap();
        let old = log_file_name(
            NaiveDate::from_ymd_opt(2000, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        );
        let fresh = log_file_name(Local::now().naive_local());
        for name in [old.as_str(), fresh.as_str(), "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let removed = cleanup_old_logs(dir.path(), LOG_RETENTION_DAYS).await.unwrap();
        assert_eq!(removed, 1);
        assert!(!dir.path().join(&old).exists());
        assert!(dir.path().join(&fresh).exists());
        assert!(dir.path().join("notes.txt").exists());
    }
}
