//! Settings persistence for the terminal front-end.
//!
//! The whole [`AppConfig`] lives in one TOML file, by default
//! `<config dir>/kamyroll/settings.toml`. A missing file is created with the
//! defaults on first load.

use anyhow::{Context, Result};
use kamyroll::AppConfig;
use kamyroll::utils::filename::validate_format;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const APP_DIR: &str = "kamyroll";
const SETTINGS_FILE: &str = "settings.toml";

/// Default location of the settings file.
pub fn default_path() -> Result<PathBuf> {
    let dir = dirs::config_dir().context("Could not determine the user configuration directory")?;
    Ok(dir.join(APP_DIR).join(SETTINGS_FILE))
}

/// Default directory for log files.
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("logs")
}

fn resolve(path: Option<&Path>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path.to_path_buf()),
        None => default_path(),
    }
}

/// Load the configuration, writing the defaults when no file exists yet.
pub fn load(path: Option<&Path>) -> Result<AppConfig> {
    let path = resolve(path)?;
    if !path.exists() {
        info!(path = %path.display(), "Creating default settings");
        let config = AppConfig::default();
        save_to(&path, &config)?;
        return Ok(config);
    }

    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;
    let config: AppConfig = toml::from_str(&text)
        .with_context(|| format!("Invalid settings file {}", path.display()))?;
    debug!(path = %path.display(), "Loaded settings");
    Ok(config)
}

/// Validate and write `config`.
///
/// Templates are checked before anything touches the disk; the download
/// path is stored absolute.
pub fn save(path: Option<&Path>, config: &AppConfig) -> Result<PathBuf> {
    let path = resolve(path)?;
    save_to(&path, config)?;
    Ok(path)
}

fn save_to(path: &Path, config: &AppConfig) -> Result<()> {
    validate_format(&config.settings.episode_format, true)
        .context("Invalid episode filename format")?;
    validate_format(&config.settings.movie_format, false)
        .context("Invalid movie filename format")?;

    let persisted = AppConfig {
        settings: config.settings.to_persisted()?,
        ..config.clone()
    };
    let text = toml::to_string_pretty(&persisted).context("Failed to serialize settings")?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, text)
        .with_context(|| format!("Failed to write settings to {}", path.display()))?;
    debug!(path = %path.display(), "Saved settings");
    Ok(())
}

/// Overwrite the settings file with the defaults.
pub fn reset(path: Option<&Path>) -> Result<PathBuf> {
    save(path, &AppConfig::default())
}

/// TOML rendering for `config --show`.
pub fn show(config: &AppConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize settings")
}
