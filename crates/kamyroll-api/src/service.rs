use crate::client::ApiClient;
use crate::error::{ApiError, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

/// Streaming services known to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Crunchyroll,
    Funimation,
    Adn,
}

impl Channel {
    pub fn id(&self) -> &'static str {
        match self {
            Self::Crunchyroll => "crunchyroll",
            Self::Funimation => "funimation",
            Self::Adn => "adn",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "crunchyroll" => Some(Self::Crunchyroll),
            "funimation" => Some(Self::Funimation),
            "adn" => Some(Self::Adn),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Crunchyroll => "Crunchyroll",
            Self::Funimation => "Funimation",
            Self::Adn => "Anime Digital Network",
        })
    }
}

/// One service entry of the backend configuration.
#[derive(Debug, Clone)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub regex: Regex,
    pub active: bool,
    /// Whether the backend can fetch premium content for this service without user credentials.
    pub bypass: bool,
}

/// Result of matching a URL against the configured services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlMatch {
    pub channel_id: String,
    /// Named capture groups, used as query parameters for `/v1/streams`.
    pub params: BTreeMap<String, String>,
}

/// Decoded `/v2/config` response.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub services: Vec<Service>,
    pub resolutions: Vec<u32>,
    pub updated: Option<DateTime<Utc>>,
}

impl ServiceConfig {
    /// Find the first active service whose pattern matches `url`.
    pub fn parse_url(&self, url: &str) -> Option<UrlMatch> {
        self.services
            .iter()
            .filter(|service| service.active)
            .find_map(|service| {
                let captures = service.regex.captures(url)?;
                // Anchored at the start, like a `re.match`.
                if captures.get(0)?.start() != 0 {
                    return None;
                }
                let params = service
                    .regex
                    .capture_names()
                    .flatten()
                    .filter_map(|name| {
                        captures
                            .name(name)
                            .map(|value| (name.to_string(), value.as_str().to_string()))
                    })
                    .collect();
                Some(UrlMatch {
                    channel_id: service.id.clone(),
                    params,
                })
            })
    }

    pub fn service(&self, channel_id: &str) -> Option<&Service> {
        self.services.iter().find(|service| service.id == channel_id)
    }

    /// Whether the backend may bypass premium restrictions for `channel_id`.
    pub fn supports_bypass(&self, channel_id: &str) -> bool {
        self.service(channel_id).is_some_and(|service| service.bypass)
    }
}

/// Explicitly owned holder of the latest service configuration.
#[derive(Debug, Default)]
pub struct ConfigHandle {
    current: Option<ServiceConfig>,
}

impl ConfigHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ServiceConfig) -> Self {
        Self {
            current: Some(config),
        }
    }

    pub fn get(&self) -> Option<&ServiceConfig> {
        self.current.as_ref()
    }

    /// Fetch `/v2/config` and replace the held configuration.
    pub async fn refresh(&mut self, client: &ApiClient) -> Result<&ServiceConfig> {
        let config = client.fetch_config().await?;
        info!(
            services = config.services.len(),
            updated = ?config.updated,
            "Loaded service configuration"
        );
        Ok(self.current.insert(config))
    }

    pub fn parse_url(&self, url: &str) -> Result<UrlMatch> {
        let config = self.current.as_ref().ok_or(ApiError::MissingConfig)?;
        let matched = config
            .parse_url(url)
            .ok_or_else(|| ApiError::InvalidUrl(url.to_string()))?;
        debug!(url, channel = %matched.channel_id, params = ?matched.params, "Matched service");
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ServiceConfig {
        ServiceConfig {
            services: vec![
                Service {
                    id: "crunchyroll".to_string(),
                    name: "Crunchyroll".to_string(),
                    regex: Regex::new(
                        r"(?:https?://)?(?:www\.)?beta\.crunchyroll\.com/(?:[a-z-]+/)?watch/(?P<id>[A-Z0-9]+)",
                    )
                    .unwrap(),
                    active: true,
                    bypass: true,
                },
                Service {
                    id: "funimation".to_string(),
                    name: "Funimation".to_string(),
                    regex: Regex::new(r"https?://www\.funimation\.com/v/(?P<slug>[a-z-]+)/(?P<episode>[a-z0-9-]+)").unwrap(),
                    active: false,
                    bypass: false,
                },
            ],
            resolutions: vec![1080, 720],
            updated: None,
        }
    }

    #[test]
    fn matches_active_service_with_named_groups() {
        let matched = config()
            .parse_url("https://beta.crunchyroll.com/watch/G4VUQ1ZKW/some-title")
            .unwrap();
        assert_eq!(matched.channel_id, "crunchyroll");
        assert_eq!(matched.params.get("id").map(String::as_str), Some("G4VUQ1ZKW"));
    }

    #[test]
    fn inactive_services_are_skipped() {
        assert!(
            config()
                .parse_url("https://www.funimation.com/v/show/episode-1")
                .is_none()
        );
    }

    #[test]
    fn match_must_start_at_beginning() {
        assert!(
            config()
                .parse_url("see https://beta.crunchyroll.com/watch/G4VUQ1ZKW")
                .is_none()
        );
    }

    #[test]
    fn handle_without_config_fails() {
        let handle = ConfigHandle::new();
        assert!(matches!(
            handle.parse_url("https://beta.crunchyroll.com/watch/X"),
            Err(ApiError::MissingConfig)
        ));
        let handle = ConfigHandle::with_config(config());
        assert!(handle.get().unwrap().supports_bypass("crunchyroll"));
        assert!(!handle.get().unwrap().supports_bypass("funimation"));
    }

    #[test]
    fn channel_names() {
        assert_eq!(Channel::Adn.to_string(), "Anime Digital Network");
        assert_eq!(Channel::from_id("funimation"), Some(Channel::Funimation));
        assert_eq!(Channel::from_id("netflix"), None);
    }
}
