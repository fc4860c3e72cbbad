use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, trace};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/94.0.4606.81 Safari/537.36 Edg/94.0.992.50";

/// Raw HTTP access used by the API client and the playlist/image fetchers.
///
/// Implementations return the response body, whatever the status code; an
/// empty body is how "API not reachable" shows up to callers.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str, params: &[(String, String)]) -> Result<Bytes>;
}

fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// [`HttpTransport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        install_rustls_provider();
        let mut builder = Client::builder().user_agent(DEFAULT_USER_AGENT);
        if timeout > Duration::ZERO {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, params: &[(String, String)]) -> Result<Bytes> {
        trace!(url, "GET");
        let response = self.client.get(url).query(params).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        debug!(url, %status, len = body.len(), "Received response");
        Ok(body)
    }
}
