use crate::decode;
use crate::error::{ApiError, PREMIUM_ONLY, Result, TRANSIENT_INIT_CODES};
use crate::media::StreamResponse;
use crate::retry::{RetryAction, RetryPolicy, retry_with_delay};
use crate::service::ServiceConfig;
use crate::transport::HttpTransport;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://kamyroll-server.herokuapp.com";
pub const STREAMS_ENDPOINT: &str = "/v1/streams";
pub const CONFIG_ENDPOINT: &str = "/v2/config";

/// Connection settings for [`ApiClient`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiClientConfig {
    pub base_url: String,
    /// Request timeout in seconds, `0` disables it.
    pub timeout_secs: u64,
    /// Attempts per `/v1/streams` call.
    pub retries: u32,
    pub transient_delay_ms: u64,
    pub default_delay_ms: u64,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            retries: 3,
            transient_delay_ms: 2000,
            default_delay_ms: 1000,
        }
    }
}

impl ApiClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retries,
            transient_delay: Duration::from_millis(self.transient_delay_ms),
            default_delay: Duration::from_millis(self.default_delay_ms),
        }
        .with_attempts(self.retries)
    }
}

/// Login for a streaming service.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Both fields present; anything else means "use the bypass".
    pub fn is_usable(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

/// One `/v1/streams` request.
#[derive(Debug, Clone)]
pub struct MediaRequest<'a> {
    pub channel_id: &'a str,
    /// Named captures of the matched service URL.
    pub params: &'a BTreeMap<String, String>,
    pub credentials: Option<&'a Credentials>,
    /// Whether the service can fall back to the bypass when a login lacks premium.
    pub supports_bypass: bool,
}

/// Client for the Kamyroll backend.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    config: ApiClientConfig,
    token: CancellationToken,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        config: ApiClientConfig,
        token: CancellationToken,
    ) -> Self {
        Self {
            transport,
            config,
            token,
        }
    }

    pub fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }

    pub fn config(&self) -> &ApiClientConfig {
        &self.config
    }

    /// Fetch a raw resource (playlist, image) through the shared transport.
    pub async fn fetch(&self, url: &str) -> Result<Bytes> {
        self.transport.get(url, &[]).await
    }

    /// Call a backend endpoint and return its JSON body.
    ///
    /// A backend error object becomes [`ApiError::Api`] with its code and
    /// message (defaulting to `unknown` / `Unknown Error`).
    pub async fn call_api(&self, path: &str, params: &[(String, String)]) -> Result<Value> {
        let shown: Vec<&str> = params
            .iter()
            .filter(|(key, _)| key != "password")
            .map(|(key, _)| key.as_str())
            .collect();
        info!(endpoint = path, params = ?shown, "Calling API");

        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let body = self.transport.get(&url, params).await?;
        if body.is_empty() {
            return Err(ApiError::Unavailable);
        }

        let json: Value = serde_json::from_slice(&body).inspect_err(|e| {
            error!(error = %e, "Error decoding returned json");
        })?;

        if json.get("error").is_some() {
            let code = json
                .get("code")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            let message = json
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown Error")
                .to_string();
            error!(code = %code, message = %message, "API call returned an error");
            return Err(ApiError::Api { code, message });
        }

        Ok(json)
    }

    pub async fn fetch_config(&self) -> Result<ServiceConfig> {
        let json = self.call_api(CONFIG_ENDPOINT, &[]).await?;
        decode::service_config(&json)
    }

    /// Resolve a media unit, driving the bounded retry loop.
    ///
    /// Logged-in requests that hit `premium_only` on a service with bypass
    /// support are repeated in bypass mode with a fresh set of attempts;
    /// otherwise `premium_only` and `unknown_id` end the loop at once.
    pub async fn get_media(&self, request: MediaRequest<'_>) -> Result<StreamResponse> {
        let login = request.credentials.filter(|credentials| credentials.is_usable());
        let use_bypass = AtomicBool::new(login.is_none());
        let policy = self.config.retry_policy();

        let mut base: Vec<(String, String)> = request
            .params
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        base.push(("channel_id".to_string(), request.channel_id.to_string()));
        if request.channel_id == "adn" {
            base.push(("country".to_string(), "fr".to_string()));
        }

        let request_streams = |attempt: u32| {
            let bypass = use_bypass.load(Ordering::Relaxed);
            let mut params = base.clone();
            match login {
                Some(credentials) if !bypass => {
                    params.push(("email".to_string(), credentials.username.clone()));
                    params.push(("password".to_string(), credentials.password.clone()));
                }
                _ => params.push(("bypass".to_string(), "true".to_string())),
            }
            let use_bypass = &use_bypass;
            let policy = &policy;
            let (channel_id, supports_bypass) = (request.channel_id, request.supports_bypass);

            async move {
                debug!(attempt, bypass, channel = channel_id, "Requesting streams");
                let json = match self.call_api(STREAMS_ENDPOINT, &params).await {
                    Ok(json) => json,
                    Err(ApiError::Api { code, message }) => {
                        return classify_error(
                            code,
                            message,
                            !bypass,
                            supports_bypass,
                            use_bypass,
                            policy,
                        );
                    }
                    Err(e) => return RetryAction::Fail(e),
                };

                match decode::stream_response(&json) {
                    Ok(response) => RetryAction::Success(response),
                    Err(e) => {
                        error!(error = %e, "Unknown error while parsing response");
                        RetryAction::Fail(e)
                    }
                }
            }
        };

        let result = match retry_with_delay(&policy, &self.token, &request_streams).await {
            // Only the login-to-bypass downgrade surfaces a raw `premium_only`.
            Err(ApiError::Api { code, .. }) if code == PREMIUM_ONLY => {
                warn!("Account lacks premium access, retrying with the bypass");
                retry_with_delay(&policy, &self.token, &request_streams).await
            }
            result => result,
        };
        result.inspect_err(|e| {
            if !matches!(e, ApiError::Cancelled) {
                error!(error = %e, "API call failed");
            }
        })
    }
}

fn classify_error(
    code: String,
    message: String,
    logged_in: bool,
    supports_bypass: bool,
    use_bypass: &AtomicBool,
    policy: &RetryPolicy,
) -> RetryAction<StreamResponse> {
    if ApiError::is_retryable_code(&code) {
        let delay = if TRANSIENT_INIT_CODES.contains(&code.as_str()) {
            policy.transient_delay
        } else {
            policy.default_delay
        };
        return RetryAction::Retry {
            error: ApiError::Api { code, message },
            delay,
        };
    }

    match code.as_str() {
        PREMIUM_ONLY if logged_in && supports_bypass => {
            use_bypass.store(true, Ordering::Relaxed);
            RetryAction::Fail(ApiError::Api { code, message })
        }
        PREMIUM_ONLY if logged_in => RetryAction::Fail(ApiError::PremiumOnly(format!(
            "{message}\nConsider using the premium bypass"
        ))),
        // Only reachable when the backend account itself runs out of premium.
        PREMIUM_ONLY => RetryAction::Fail(ApiError::PremiumOnly(
            "Unexpected bypass error, try again later".to_string(),
        )),
        _ => RetryAction::Fail(ApiError::UnknownId),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replays canned bodies and records every request.
    struct ScriptedTransport {
        bodies: Mutex<Vec<Bytes>>,
        requests: Mutex<Vec<(String, Vec<(String, String)>)>>,
    }

    impl ScriptedTransport {
        fn new(bodies: Vec<Value>) -> Arc<Self> {
            Arc::new(Self {
                bodies: Mutex::new(
                    bodies
                        .into_iter()
                        .rev()
                        .map(|body| Bytes::from(body.to_string()))
                        .collect(),
                ),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn param(&self, index: usize, key: &str) -> Option<String> {
            self.requests.lock().unwrap()[index]
                .1
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        }

        fn count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn get(&self, url: &str, params: &[(String, String)]) -> Result<Bytes> {
            self.requests
                .lock()
                .unwrap()
                .push((url.to_string(), params.to_vec()));
            Ok(self.bodies.lock().unwrap().pop().unwrap_or_default())
        }
    }

    fn movie() -> Value {
        json!({
            "type": "movie",
            "channel_id": "crunchyroll",
            "movie_metadata": { "title": "Film", "description": "", "duration": 1000, "year": 2020 },
            "streams": [],
            "subtitles": []
        })
    }

    fn failure(code: &str) -> Value {
        json!({ "error": true, "code": code, "message": format!("{code} message") })
    }

    fn client(transport: Arc<ScriptedTransport>) -> ApiClient {
        ApiClient::new(transport, ApiClientConfig::default(), CancellationToken::new())
    }

    fn params() -> BTreeMap<String, String> {
        BTreeMap::from([("id".to_string(), "GR1".to_string())])
    }

    #[tokio::test]
    async fn bypass_request_params() {
        let transport = ScriptedTransport::new(vec![movie()]);
        let params = params();
        let response = client(transport.clone())
            .get_media(MediaRequest {
                channel_id: "adn",
                params: &params,
                credentials: None,
                supports_bypass: false,
            })
            .await
            .unwrap();
        assert_eq!(response.metadata.title(), "Film");
        assert_eq!(transport.param(0, "channel_id").as_deref(), Some("adn"));
        assert_eq!(transport.param(0, "country").as_deref(), Some("fr"));
        assert_eq!(transport.param(0, "bypass").as_deref(), Some("true"));
        assert_eq!(transport.param(0, "id").as_deref(), Some("GR1"));
        assert!(transport.requests.lock().unwrap()[0].0.ends_with("/v1/streams"));
    }

    #[tokio::test]
    async fn login_request_params() {
        let transport = ScriptedTransport::new(vec![movie()]);
        let params = params();
        let credentials = Credentials {
            username: "me@example.com".to_string(),
            password: "secret".to_string(),
        };
        client(transport.clone())
            .get_media(MediaRequest {
                channel_id: "crunchyroll",
                params: &params,
                credentials: Some(&credentials),
                supports_bypass: true,
            })
            .await
            .unwrap();
        assert_eq!(transport.param(0, "email").as_deref(), Some("me@example.com"));
        assert_eq!(transport.param(0, "bypass"), None);
        assert_eq!(transport.param(0, "country"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried() {
        let transport = ScriptedTransport::new(vec![
            failure("bad_player_connection"),
            failure("something"),
            movie(),
        ]);
        let params = params();
        let result = client(transport.clone())
            .get_media(MediaRequest {
                channel_id: "crunchyroll",
                params: &params,
                credentials: None,
                supports_bypass: true,
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(transport.count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_surfaces_last_message() {
        let transport = ScriptedTransport::new(vec![
            failure("bad_initialize"),
            failure("bad_initialize"),
            failure("server_busy"),
        ]);
        let params = params();
        let err = client(transport.clone())
            .get_media(MediaRequest {
                channel_id: "crunchyroll",
                params: &params,
                credentials: None,
                supports_bypass: true,
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "server_busy message");
        assert_eq!(transport.count(), 3);
    }

    #[tokio::test]
    async fn premium_only_is_fatal_without_bypass_support() {
        let transport = ScriptedTransport::new(vec![failure("premium_only")]);
        let params = params();
        let credentials = Credentials {
            username: "me".to_string(),
            password: "pw".to_string(),
        };
        let err = client(transport.clone())
            .get_media(MediaRequest {
                channel_id: "funimation",
                params: &params,
                credentials: Some(&credentials),
                supports_bypass: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(&err, ApiError::PremiumOnly(msg) if msg.contains("premium bypass")));
        assert_eq!(transport.count(), 1);
    }

    #[tokio::test]
    async fn premium_only_downgrades_login_to_bypass() {
        let transport = ScriptedTransport::new(vec![failure("premium_only"), movie()]);
        let params = params();
        let credentials = Credentials {
            username: "me".to_string(),
            password: "pw".to_string(),
        };
        client(transport.clone())
            .get_media(MediaRequest {
                channel_id: "crunchyroll",
                params: &params,
                credentials: Some(&credentials),
                supports_bypass: true,
            })
            .await
            .unwrap();
        assert_eq!(transport.param(0, "email").as_deref(), Some("me"));
        assert_eq!(transport.param(1, "email"), None);
        assert_eq!(transport.param(1, "bypass").as_deref(), Some("true"));
    }

    #[tokio::test]
    async fn bypass_downgrade_survives_a_single_attempt() {
        let transport = ScriptedTransport::new(vec![failure("premium_only"), movie()]);
        let params = params();
        let credentials = Credentials {
            username: "me".to_string(),
            password: "pw".to_string(),
        };
        let config = ApiClientConfig {
            retries: 1,
            ..ApiClientConfig::default()
        };
        let response = ApiClient::new(transport.clone(), config, CancellationToken::new())
            .get_media(MediaRequest {
                channel_id: "crunchyroll",
                params: &params,
                credentials: Some(&credentials),
                supports_bypass: true,
            })
            .await
            .unwrap();
        assert_eq!(response.metadata.title(), "Film");
        assert_eq!(transport.count(), 2);
        assert_eq!(transport.param(1, "bypass").as_deref(), Some("true"));
    }

    #[tokio::test]
    async fn premium_only_in_bypass_mode_after_downgrade() {
        let transport =
            ScriptedTransport::new(vec![failure("premium_only"), failure("premium_only")]);
        let params = params();
        let credentials = Credentials {
            username: "me".to_string(),
            password: "pw".to_string(),
        };
        let err = client(transport.clone())
            .get_media(MediaRequest {
                channel_id: "crunchyroll",
                params: &params,
                credentials: Some(&credentials),
                supports_bypass: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(&err, ApiError::PremiumOnly(msg) if msg.contains("try again later")));
        assert_eq!(transport.count(), 2);
    }

    #[tokio::test]
    async fn unknown_id_is_fatal() {
        let transport = ScriptedTransport::new(vec![failure("unknown_id"), movie()]);
        let params = params();
        let err = client(transport.clone())
            .get_media(MediaRequest {
                channel_id: "crunchyroll",
                params: &params,
                credentials: None,
                supports_bypass: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::UnknownId));
        assert_eq!(transport.count(), 1);
    }

    #[tokio::test]
    async fn empty_body_means_unavailable() {
        let transport = ScriptedTransport::new(vec![]);
        let err = client(transport)
            .call_api(CONFIG_ENDPOINT, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unavailable));
    }

    #[tokio::test]
    async fn schema_violation_is_not_retried() {
        let transport = ScriptedTransport::new(vec![json!({ "type": "movie" }), movie()]);
        let params = params();
        let err = client(transport.clone())
            .get_media(MediaRequest {
                channel_id: "crunchyroll",
                params: &params,
                credentials: None,
                supports_bypass: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Decode { .. }));
        assert_eq!(transport.count(), 1);
    }
}
