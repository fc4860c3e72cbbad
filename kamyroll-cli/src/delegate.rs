//! Interactive side of a download batch: prompts and progress bars.

use async_trait::async_trait;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Confirm, InquireError, MultiSelect, Password, PasswordDisplayMode, Select, Text};
use kamyroll::downloader::{
    ProcessEvent, Progress, ProgressRecord, QueueDelegate, QueueEvent, SettingsOverride,
    available_audio_locales, available_hardsub_locales, available_resolutions,
};
use kamyroll::{Resolution, SelectionError, Settings};
use kamyroll_api::{Channel, Credentials, HttpTransport, Locale, StreamResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

const TICK_STRINGS: &[&str] = &["▹▹▹▹▹", "▸▹▹▹▹", "▹▸▹▹▹", "▹▹▸▹▹", "▹▹▹▸▹", "▹▹▹▹▸", "▪▪▪▪▪"];

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.blue} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICK_STRINGS)
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.blue} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}s ({eta}) {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ")
    .tick_strings(TICK_STRINGS)
}

/// `12.3 MiB at 2.5x`, or whatever part of it the record carries.
fn record_message(record: &ProgressRecord) -> String {
    let size = record
        .size_bytes
        .map(|bytes| format!("{:.1} MiB", bytes as f64 / (1024.0 * 1024.0)));
    let speed = record.speed.map(|speed| format!("{speed:.1}x"));
    match (size, speed) {
        (Some(size), Some(speed)) => format!("{size} at {speed}"),
        (Some(part), None) | (None, Some(part)) => part,
        (None, None) => String::new(),
    }
}

/// Terminal implementation of [`QueueDelegate`].
pub struct TerminalDelegate {
    transport: Arc<dyn HttpTransport>,
    subtitles_only: bool,
    token: CancellationToken,
    bar: Option<ProgressBar>,
    determinate: bool,
}

impl TerminalDelegate {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        subtitles_only: bool,
        token: CancellationToken,
    ) -> Self {
        Self {
            transport,
            subtitles_only,
            token,
            bar: None,
            determinate: false,
        }
    }

    /// Run a blocking prompt off the runtime, hiding the progress bar meanwhile.
    ///
    /// Ctrl-C inside a prompt halts the batch; Esc only skips the question.
    async fn prompt<T, F>(&self, ask: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce() -> inquire::error::InquireResult<T> + Send + 'static,
    {
        let bar = self.bar.clone();
        let result = tokio::task::spawn_blocking(move || match bar {
            Some(bar) => bar.suspend(ask),
            None => ask(),
        })
        .await;

        match result {
            Ok(Ok(value)) => Some(value),
            Ok(Err(InquireError::OperationCanceled)) => None,
            Ok(Err(InquireError::OperationInterrupted)) => {
                self.token.cancel();
                None
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Prompt failed");
                None
            }
            Err(e) => {
                warn!(error = %e, "Prompt task failed");
                None
            }
        }
    }

    fn println(&self, line: impl AsRef<str>) {
        match &self.bar {
            Some(bar) => bar.println(line),
            None => eprintln!("{}", line.as_ref()),
        }
    }

    async fn select_locale(&self, message: &'static str, options: Vec<Locale>, current: Locale) -> Option<Locale> {
        if options.is_empty() {
            return None;
        }
        let cursor = options.iter().position(|locale| *locale == current).unwrap_or(0);
        self.prompt(move || {
            Select::new(message, options)
                .with_starting_cursor(cursor)
                .prompt()
        })
        .await
    }

    async fn select_resolution(&self, heights: Vec<u32>, current: Resolution) -> Option<Resolution> {
        let options: Vec<Resolution> = heights
            .into_iter()
            .filter_map(Resolution::from_height)
            .collect();
        if options.is_empty() {
            return None;
        }
        let cursor = options.iter().position(|r| *r == current).unwrap_or(0);
        self.prompt(move || {
            Select::new("Resolution:", options)
                .with_starting_cursor(cursor)
                .prompt()
        })
        .await
    }

    async fn select_subtitles(&self, response: &StreamResponse, current: &[Locale]) -> Option<Vec<Locale>> {
        let mut options: Vec<Locale> = Vec::new();
        for subtitle in &response.subtitles {
            if !options.contains(&subtitle.locale) {
                options.push(subtitle.locale);
            }
        }
        if options.is_empty() {
            return Some(Vec::new());
        }
        let defaults: Vec<usize> = options
            .iter()
            .enumerate()
            .filter(|(_, locale)| current.contains(locale))
            .map(|(index, _)| index)
            .collect();
        self.prompt(move || {
            MultiSelect::new("Subtitle locales:", options)
                .with_default(&defaults)
                .prompt()
        })
        .await
    }

    fn show_progress(&mut self, progress: Progress, record: &ProgressRecord) {
        let Some(bar) = &self.bar else {
            return;
        };
        match progress.maximum {
            Some(maximum) => {
                if !self.determinate {
                    bar.set_style(bar_style());
                    self.determinate = true;
                }
                bar.set_length(maximum);
                bar.set_position(progress.value);
            }
            None if self.determinate => {
                bar.set_style(spinner_style());
                self.determinate = false;
            }
            None => {}
        }
        let message = record_message(record);
        if !message.is_empty() {
            bar.set_message(message);
        }
    }
}

#[async_trait]
impl QueueDelegate for TerminalDelegate {
    async fn credentials(&mut self, channel_id: &str) -> Option<Credentials> {
        let service = Channel::from_id(channel_id)
            .map(|channel| channel.to_string())
            .unwrap_or_else(|| channel_id.to_string());

        let username = self
            .prompt(move || {
                Text::new(&format!("{service} username:"))
                    .with_help_message("Leave empty to use the premium bypass")
                    .prompt()
            })
            .await?;
        if username.trim().is_empty() {
            return None;
        }

        let password = self
            .prompt(|| {
                Password::new("Password:")
                    .with_display_mode(PasswordDisplayMode::Masked)
                    .without_confirmation()
                    .prompt()
            })
            .await?;

        Some(Credentials {
            username: username.trim().to_string(),
            password,
        })
    }

    async fn resolve_selection_error(
        &mut self,
        error: &SelectionError,
        response: &StreamResponse,
        settings: &Settings,
    ) -> Option<SettingsOverride> {
        self.println(format!("{} {error}", "Selection failed:".red().bold()));
        self.println("Choose other settings for this item, or press Esc to skip it.".yellow().to_string());

        let mut settings = settings.clone();
        if !self.subtitles_only {
            settings.audio_locale = self
                .select_locale(
                    "Audio locale:",
                    available_audio_locales(response),
                    settings.audio_locale,
                )
                .await?;
            settings.hardsub_locale = self
                .select_locale(
                    "Hardsub locale:",
                    available_hardsub_locales(response, settings.audio_locale),
                    settings.hardsub_locale,
                )
                .await?;

            let heights = match available_resolutions(
                response,
                settings.audio_locale,
                settings.hardsub_locale,
                self.transport.as_ref(),
            )
            .await
            {
                Ok(heights) => heights,
                Err(e) => {
                    warn!(error = %e, "Could not list resolutions");
                    return None;
                }
            };
            settings.video_height = self.select_resolution(heights, settings.video_height).await?;
        }
        settings.subtitle_locales = self
            .select_subtitles(response, &settings.subtitle_locales)
            .await?;

        let apply_to_all = self
            .prompt(|| {
                Confirm::new("Use these settings for the remaining items?")
                    .with_default(false)
                    .prompt()
            })
            .await?;

        Some(SettingsOverride {
            settings,
            apply_to_all,
        })
    }

    async fn confirm(&mut self, question: &str) -> bool {
        let question = question.to_string();
        self.prompt(move || Confirm::new(&question).with_default(false).prompt())
            .await
            .unwrap_or(false)
    }

    fn on_event(&mut self, event: QueueEvent) {
        match event {
            QueueEvent::ItemStarted { label, .. } => {
                if let Some(bar) = self.bar.take() {
                    bar.finish_and_clear();
                }
                println!("\n{}", label.green().bold());
                let bar = ProgressBar::new_spinner();
                bar.set_style(spinner_style());
                bar.enable_steady_tick(Duration::from_millis(120));
                bar.set_message("Resolving...");
                self.bar = Some(bar);
                self.determinate = false;
            }
            QueueEvent::ItemResolved { label, .. } => {
                self.println(label.cyan().to_string());
                if let Some(bar) = &self.bar {
                    bar.set_message("Starting...");
                }
            }
            QueueEvent::Transcoder(ProcessEvent::Progress { progress, record }) => {
                self.show_progress(progress, &record);
            }
            QueueEvent::Transcoder(ProcessEvent::Message(message)) => {
                self.println(message.yellow().to_string());
            }
            QueueEvent::Transcoder(ProcessEvent::Fatal(error)) => {
                self.println(error.line.red().to_string());
            }
            QueueEvent::Transcoder(ProcessEvent::Line(_) | ProcessEvent::Question(_)) => {}
            QueueEvent::ItemFinished { output, .. } => {
                if let Some(bar) = self.bar.take() {
                    bar.finish_with_message(format!("Saved {}", output.display()));
                }
            }
            QueueEvent::ItemFailed { message, .. } => {
                let first = message.lines().next().unwrap_or_default().to_string();
                match self.bar.take() {
                    Some(bar) => bar.abandon_with_message(first.red().to_string()),
                    None => eprintln!("{}", first.red()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_messages() {
        let record = ProgressRecord {
            size_bytes: Some(3 * 1024 * 1024),
            speed: Some(2.5),
            ..ProgressRecord::default()
        };
        assert_eq!(record_message(&record), "3.0 MiB at 2.5x");

        let record = ProgressRecord {
            speed: Some(1.0),
            ..ProgressRecord::default()
        };
        assert_eq!(record_message(&record), "1.0x");
        assert_eq!(record_message(&ProgressRecord::default()), "");
    }
}
