//! HTTP transport used by the fetcher
//!
//! The fetcher only needs "GET this URL with these query parameters within
//! this timeout". [`HttpClient`] is that seam; [`ReqwestClient`] is the
//! production implementation and tests substitute their own.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::error::ConfigError;

/// Browser-like User-Agent; the platform serves reduced pages to unknown agents
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Body of a successful (2xx) response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseBody {
    pub text: String,
}

impl ResponseBody {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Transport-level failure of a single request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("HTTP status {code}")]
    Status { code: u16 },
}

impl TransportError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Timeout | TransportError::Connection(_) => true,
            TransportError::Status { code } => *code >= 500 || *code == 429,
        }
    }
}

/// Capability to issue GET requests against the remote platform
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(
        &self,
        url: &str,
        params: &[(&str, String)],
        timeout: Duration,
    ) -> Result<ResponseBody, TransportError>;
}

/// [`HttpClient`] backed by a shared `reqwest` connection pool
#[derive(Clone)]
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    pub fn new(user_agent: &str, proxy: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Client::builder().user_agent(user_agent);

        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| ConfigError::Invalid(format!("proxy '{}': {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| ConfigError::Invalid(format!("HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Wrap an already configured client (authenticated session, custom TLS, ...)
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn transport_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Connection(err.to_string())
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(
        &self,
        url: &str,
        params: &[(&str, String)],
        timeout: Duration,
    ) -> Result<ResponseBody, TransportError> {
        debug!(url = %url, ?params, "GET");

        let response = self
            .client
            .get(url)
            .query(params)
            .timeout(timeout)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                code: status.as_u16(),
            });
        }

        let text = response.text().await.map_err(transport_error)?;
        Ok(ResponseBody { text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TransportError::Timeout.is_transient());
        assert!(TransportError::Connection("reset".to_string()).is_transient());
        assert!(TransportError::Status { code: 503 }.is_transient());
        assert!(TransportError::Status { code: 429 }.is_transient());
        assert!(!TransportError::Status { code: 404 }.is_transient());
        assert!(!TransportError::Status { code: 403 }.is_transient());
    }

    #[test]
    fn test_invalid_proxy_is_config_error() {
        let result = ReqwestClient::new(DEFAULT_USER_AGENT, Some("http://[::1"));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
