//! Serial download queue.
//!
//! Items are processed one at a time: resolve the URL, query the API, select
//! streams, build the arguments and run the transcoder. A failing item is
//! reported and skipped; only a halt stops the batch. The halt token is
//! checked every time the queue resumes after waiting on the network, the
//! user or the transcoder.

use async_trait::async_trait;
use kamyroll_api::{
    ApiClient, ConfigHandle, Credentials, MediaRequest, Metadata, StreamResponse,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::arguments::build_arguments;
use super::engine::{ProcessEvent, TranscodeJob, TranscodeSink, Transcoder};
use super::selector::{DownloadSelection, select_stream, select_subtitles, subtitle_only_selection};
use crate::config::Settings;
use crate::error::SelectionError;
use crate::{Error, Result};

/// Replacement settings chosen after a selection failure.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsOverride {
    pub settings: Settings,
    /// Keep using these settings for the remaining items.
    pub apply_to_all: bool,
}

/// What the queue reports while it works.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    /// `Downloading item 2 of 5:`
    ItemStarted {
        index: usize,
        total: usize,
        label: String,
    },
    /// The API returned the item; `label` names it.
    ItemResolved { index: usize, label: String },
    Transcoder(ProcessEvent),
    ItemFinished { index: usize, output: PathBuf },
    ItemFailed { index: usize, message: String },
}

/// Front-end hooks of a [`DownloadQueue`].
#[async_trait]
pub trait QueueDelegate: Send {
    /// Login for `channel_id`. `None` stops asking for the rest of the batch.
    async fn credentials(&mut self, channel_id: &str) -> Option<Credentials>;

    /// Offer other settings after `error`. `None` skips the item.
    async fn resolve_selection_error(
        &mut self,
        error: &SelectionError,
        response: &StreamResponse,
        settings: &Settings,
    ) -> Option<SettingsOverride>;

    /// Answer a yes/no question asked by the transcoder.
    async fn confirm(&mut self, question: &str) -> bool;

    fn on_event(&mut self, event: QueueEvent);
}

/// Outcome of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSummary {
    pub total: usize,
    /// Zero-based indices of downloaded items.
    pub succeeded: Vec<usize>,
    pub failed: Vec<(usize, String)>,
    /// The batch was stopped before its end.
    pub halted: bool,
}

impl QueueSummary {
    pub fn message(&self) -> &'static str {
        if self.succeeded.is_empty() {
            "No items were downloaded."
        } else {
            "The download is finished."
        }
    }
}

/// `Downloading {type} {index} of {total}:`
pub fn progress_label(subtitles_only: bool, index: usize, total: usize) -> String {
    let kind = if subtitles_only { "subtitle" } else { "item" };
    format!("Downloading {kind} {index} of {total}:")
}

/// Human readable name of a media unit.
pub fn item_label(metadata: &Metadata) -> String {
    match metadata {
        Metadata::Episode(episode) => format!(
            "{} Season {} Episode {}",
            episode.series, episode.season, episode.episode_disp
        ),
        Metadata::Movie(movie) => movie.common.title.clone(),
    }
}

struct DelegateSink<'a> {
    delegate: &'a mut dyn QueueDelegate,
}

#[async_trait]
impl TranscodeSink for DelegateSink<'_> {
    fn on_event(&mut self, event: &ProcessEvent) {
        self.delegate.on_event(QueueEvent::Transcoder(event.clone()));
    }

    async fn confirm(&mut self, question: &str) -> bool {
        self.delegate.confirm(question).await
    }
}

enum ItemOutcome {
    Finished(PathBuf),
    Skipped(String),
    Halted,
}

/// Downloads a list of URLs one after the other.
pub struct DownloadQueue {
    client: ApiClient,
    services: ConfigHandle,
    transcoder: Arc<dyn Transcoder>,
    settings: Settings,
    subtitles_only: bool,
    token: CancellationToken,
    ask_login: bool,
    credentials: HashMap<String, Option<Credentials>>,
}

impl DownloadQueue {
    pub fn new(
        client: ApiClient,
        services: ConfigHandle,
        transcoder: Arc<dyn Transcoder>,
        settings: Settings,
        token: CancellationToken,
    ) -> Self {
        Self {
            client,
            services,
            transcoder,
            ask_login: settings.use_own_credentials,
            settings,
            subtitles_only: false,
            token,
            credentials: HashMap::new(),
        }
    }

    /// Download subtitle files only.
    pub fn subtitles_only(mut self, subtitles_only: bool) -> Self {
        self.subtitles_only = subtitles_only;
        self
    }

    /// Settings in effect, including overrides applied to all items.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn halt(&self) {
        self.token.cancel();
    }

    fn halted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Process every URL in order.
    pub async fn run(
        &mut self,
        urls: &[String],
        delegate: &mut dyn QueueDelegate,
    ) -> Result<QueueSummary> {
        self.settings.validate()?;

        let mut summary = QueueSummary {
            total: urls.len(),
            ..QueueSummary::default()
        };

        for (index, url) in urls.iter().enumerate() {
            if self.halted() {
                summary.halted = true;
                break;
            }
            delegate.on_event(QueueEvent::ItemStarted {
                index,
                total: urls.len(),
                label: progress_label(self.subtitles_only, index + 1, urls.len()),
            });

            match self.process_item(index, url, delegate).await {
                ItemOutcome::Finished(output) => {
                    info!(index, output = %output.display(), "Item finished");
                    summary.succeeded.push(index);
                    delegate.on_event(QueueEvent::ItemFinished { index, output });
                }
                ItemOutcome::Skipped(message) => {
                    warn!(index, url = %url, message = %message, "Item skipped");
                    delegate.on_event(QueueEvent::ItemFailed {
                        index,
                        message: message.clone(),
                    });
                    summary.failed.push((index, message));
                }
                ItemOutcome::Halted => {
                    info!(index, "Download halted");
                    summary.halted = true;
                    break;
                }
            }
        }

        info!(
            total = summary.total,
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            halted = summary.halted,
            "{}",
            summary.message()
        );
        Ok(summary)
    }

    async fn login_for(
        &mut self,
        channel_id: &str,
        delegate: &mut dyn QueueDelegate,
    ) -> Option<Credentials> {
        if !self.ask_login {
            return None;
        }
        if let Some(cached) = self.credentials.get(channel_id) {
            return cached.clone();
        }
        let credentials = delegate.credentials(channel_id).await;
        if credentials.is_none() {
            self.ask_login = false;
        }
        self.credentials
            .insert(channel_id.to_string(), credentials.clone());
        credentials
    }

    async fn selection(
        &self,
        response: &StreamResponse,
        settings: &Settings,
    ) -> Result<DownloadSelection> {
        if self.subtitles_only {
            let subtitles = select_subtitles(response, settings)?;
            Ok(subtitle_only_selection(subtitles))
        } else {
            select_stream(response, settings, self.client.transport().as_ref()).await
        }
    }

    async fn process_item(
        &mut self,
        index: usize,
        url: &str,
        delegate: &mut dyn QueueDelegate,
    ) -> ItemOutcome {
        let matched = match self.services.parse_url(url) {
            Ok(matched) => matched,
            Err(e) => return ItemOutcome::Skipped(e.to_string()),
        };

        let credentials = self.login_for(&matched.channel_id, delegate).await;
        if self.halted() {
            return ItemOutcome::Halted;
        }

        let supports_bypass = self
            .services
            .get()
            .is_some_and(|config| config.supports_bypass(&matched.channel_id));
        let request = MediaRequest {
            channel_id: &matched.channel_id,
            params: &matched.params,
            credentials: credentials.as_ref(),
            supports_bypass,
        };
        let response = match self.client.get_media(request).await {
            Ok(response) => response,
            Err(_) if self.halted() => return ItemOutcome::Halted,
            Err(e) => return ItemOutcome::Skipped(Error::from(e).to_string()),
        };
        if self.halted() {
            return ItemOutcome::Halted;
        }

        delegate.on_event(QueueEvent::ItemResolved {
            index,
            label: format!("Downloading {}:", item_label(&response.metadata)),
        });

        let mut settings = self.settings.clone();
        let selection = match self.selection(&response, &settings).await {
            Ok(selection) => selection,
            Err(Error::Selection(error)) => {
                info!(%error, "Selection failed, asking for other settings");
                let choice = delegate
                    .resolve_selection_error(&error, &response, &settings)
                    .await;
                if self.halted() {
                    return ItemOutcome::Halted;
                }
                let Some(choice) = choice else {
                    return ItemOutcome::Skipped(error.to_string());
                };
                if choice.apply_to_all {
                    self.settings = choice.settings.clone();
                }
                settings = choice.settings;
                match self.selection(&response, &settings).await {
                    Ok(selection) => selection,
                    Err(e) => return self.skip_after("selection", e),
                }
            }
            Err(e) => return self.skip_after("selection", e),
        };
        if self.halted() {
            return ItemOutcome::Halted;
        }

        let plan = match build_arguments(
            &settings,
            &selection,
            &response.metadata,
            &response.images,
            self.subtitles_only,
            self.client.transport().as_ref(),
        )
        .await
        {
            Ok(plan) => plan,
            Err(e) => return self.skip_after("argument construction", e),
        };
        if self.halted() {
            return ItemOutcome::Halted;
        }

        let job = TranscodeJob {
            arguments: plan.arguments,
            duration: response.metadata.duration(),
        };
        let mut sink = DelegateSink { delegate };
        match self.transcoder.transcode(&job, &mut sink, &self.token).await {
            Ok(_) => ItemOutcome::Finished(plan.output_path),
            Err(e) if e.is_cancelled() || self.halted() => ItemOutcome::Halted,
            Err(e) => {
                error!(error = %e, "The download failed");
                ItemOutcome::Skipped(format!("The download failed.\n{e}"))
            }
        }
    }

    fn skip_after(&self, stage: &str, error: Error) -> ItemOutcome {
        if error.is_cancelled() || self.halted() {
            return ItemOutcome::Halted;
        }
        error!(stage, error = %error, "Error during download preparation");
        ItemOutcome::Skipped(error.to_string())
    }
}
