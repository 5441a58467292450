//! Live HTTP calls.
//!
//! The gateway and the sync coordinator only see the [`Transport`] trait, so
//! tests can swap in scripted transports without sockets.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::types::{ApiResponse, OutboundRequest};
use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::RwLock;
use tracing::debug;

/// Performs one live request and returns the parsed envelope.
///
/// Implementations must return `Err` for unreachable servers, non-2xx
/// statuses and bodies that are not a JSON envelope.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &OutboundRequest) -> EngineResult<ApiResponse>;

    /// Returns true if the health endpoint answers with a 2xx.
    async fn probe(&self, path: &str) -> bool {
        self.send(&OutboundRequest::get(path)).await.is_ok()
    }

    /// Installs (or clears) the session credentials sent with every call.
    async fn set_credentials(&self, _session_token: Option<String>) {}
}

/// `reqwest`-backed transport for same-origin JSON endpoints.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    session_token: RwLock<Option<String>>,
}

impl HttpTransport {
    pub fn new(config: &EngineConfig) -> EngineResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| EngineError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            session_token: RwLock::new(None),
        })
    }

    fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &OutboundRequest) -> EngineResult<ApiResponse> {
        let url = self.url_for(&request.url);
        let mut builder = self.client.request(request.method.to_reqwest(), &url);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = self.session_token.read().await.as_ref() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            debug!("{} {url} returned {status}", request.method);
            return Err(EngineError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        serde_json::from_slice::<ApiResponse>(&bytes)
            .map_err(|e| EngineError::InvalidResponse(format!("{} {url}: {e}", request.method)))
    }

    async fn probe(&self, path: &str) -> bool {
        match self.client.get(self.url_for(path)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("connectivity probe failed: {e}");
                false
            }
        }
    }

    async fn set_credentials(&self, session_token: Option<String>) {
        *self.session_token.write().await = session_token;
    }
}
