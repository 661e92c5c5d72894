//! Fetcher: pulls entity records from the remote platform
//!
//! One logical request per entity kind. Each request is validated, sent
//! through the injected [`HttpClient`] under a bounded timeout, retried on
//! transient failures, and normalized into an [`EntityRecord`].
//!
//! # Example
//!
//! ```no_run
//! use reelvault_ingest::fetcher::{Fetcher, FetcherConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let fetcher = Fetcher::from_config(FetcherConfig::default())?;
//!     let trending = fetcher.fetch_trending(1, 20).await?;
//!     println!("{} trending videos", trending.items.len());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod parser;

use chrono::Utc;
use reelvault_common::types::{EntityKind, EntityRecord, Hashtag, TrendingBatch, User, Video, VideoSummary};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::{ConfigError, FetchError};
pub use client::{HttpClient, ReqwestClient, ResponseBody, TransportError, DEFAULT_USER_AGENT};

/// Fetcher configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FetcherConfig {
    /// Root URL of the platform, e.g. "https://www.douyin.com"
    pub base_url: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Total attempts per request, including the first
    pub max_retries: u32,

    /// Base delay before the first retry; doubles on each further retry
    pub retry_backoff_ms: u64,

    pub user_agent: String,

    pub proxy: Option<String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.douyin.com".to_string(),
            timeout_secs: 10,
            max_retries: 3,
            retry_backoff_ms: 500,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: None,
        }
    }
}

impl FetcherConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| ConfigError::Invalid(format!("fetcher.base_url '{}': {}", self.base_url, e)))?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::Invalid(format!(
                "fetcher.base_url '{}' cannot be used as a base URL",
                self.base_url
            )));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "fetcher.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "fetcher.max_retries must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}

/// One logical request against the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchRequest {
    Video { id: String },
    User { id: String },
    Trending { page: u32, count: u32 },
    Hashtag { tag: String, page: u32, count: u32 },
    Search { keyword: String, page: u32, count: u32 },
}

impl FetchRequest {
    /// Entity kind the request yields (search hits are videos)
    pub fn kind(&self) -> EntityKind {
        match self {
            FetchRequest::Video { .. } | FetchRequest::Search { .. } => EntityKind::Video,
            FetchRequest::User { .. } => EntityKind::User,
            FetchRequest::Trending { .. } => EntityKind::Trending,
            FetchRequest::Hashtag { .. } => EntityKind::Hashtag,
        }
    }

    pub fn validate(&self) -> Result<(), FetchError> {
        match self {
            FetchRequest::Video { id } => require_text("video id", id),
            FetchRequest::User { id } => require_text("user id", id),
            FetchRequest::Trending { page, count } => require_paging(*page, *count),
            FetchRequest::Hashtag { tag, page, count } => {
                require_text("hashtag", tag)?;
                require_paging(*page, *count)
            },
            FetchRequest::Search {
                keyword,
                page,
                count,
            } => {
                require_text("search keyword", keyword)?;
                require_paging(*page, *count)
            },
        }
    }
}

fn require_text(name: &str, value: &str) -> Result<(), FetchError> {
    if value.trim().is_empty() {
        return Err(FetchError::InvalidParameter(format!("{} must not be empty", name)));
    }
    Ok(())
}

fn require_paging(page: u32, count: u32) -> Result<(), FetchError> {
    if page == 0 {
        return Err(FetchError::InvalidParameter("page starts at 1".to_string()));
    }
    if count == 0 {
        return Err(FetchError::InvalidParameter("count must be at least 1".to_string()));
    }
    Ok(())
}

/// Successful outcome of a [`FetchRequest`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Record(EntityRecord),
    Summaries(Vec<VideoSummary>),
}

/// Fetches and normalizes platform entities
pub struct Fetcher<C = ReqwestClient> {
    client: C,
    config: FetcherConfig,
}

impl Fetcher<ReqwestClient> {
    /// Build a fetcher with the production HTTP client
    pub fn from_config(config: FetcherConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = ReqwestClient::new(&config.user_agent, config.proxy.as_deref())?;
        Ok(Self { client, config })
    }
}

impl<C: HttpClient> Fetcher<C> {
    /// Build a fetcher around an injected client
    pub fn with_client(client: C, config: FetcherConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Execute any request
    pub async fn fetch(&self, request: &FetchRequest) -> Result<Fetched, FetchError> {
        match request {
            FetchRequest::Video { id } => self
                .fetch_video(id)
                .await
                .map(|v| Fetched::Record(EntityRecord::Video(v))),
            FetchRequest::User { id } => self
                .fetch_user(id)
                .await
                .map(|u| Fetched::Record(EntityRecord::User(u))),
            FetchRequest::Trending { page, count } => self
                .fetch_trending(*page, *count)
                .await
                .map(|t| Fetched::Record(EntityRecord::Trending(t))),
            FetchRequest::Hashtag { tag, page, count } => self
                .fetch_hashtag(tag, *page, *count)
                .await
                .map(|h| Fetched::Record(EntityRecord::Hashtag(h))),
            FetchRequest::Search {
                keyword,
                page,
                count,
            } => self
                .search_videos(keyword, *page, *count)
                .await
                .map(Fetched::Summaries),
        }
    }

    #[instrument(skip(self))]
    pub async fn fetch_video(&self, id: &str) -> Result<Video, FetchError> {
        require_text("video id", id)?;
        let url = self.endpoint(&["video", id])?;
        let body = self.get_with_retry(&url, &[]).await?;
        parser::parse_video_page(id, &body.text, Utc::now())
    }

    #[instrument(skip(self))]
    pub async fn fetch_user(&self, id: &str) -> Result<User, FetchError> {
        require_text("user id", id)?;
        let url = self.endpoint(&["user", id])?;
        let body = self.get_with_retry(&url, &[]).await?;
        parser::parse_user_page(id, &body.text, Utc::now())
    }

    #[instrument(skip(self))]
    pub async fn fetch_trending(&self, page: u32, count: u32) -> Result<TrendingBatch, FetchError> {
        require_paging(page, count)?;
        let url = self.endpoint(&["trending"])?;
        let body = self.get_with_retry(&url, &paging(page, count)).await?;
        let fetched_at = Utc::now();
        let listing = parser::parse_listing(&body.text)?;

        info!(page, items = listing.items.len(), "Fetched trending page");
        Ok(TrendingBatch {
            items: listing.items,
            page,
            fetched_at,
        })
    }

    #[instrument(skip(self))]
    pub async fn fetch_hashtag(&self, tag: &str, page: u32, count: u32) -> Result<Hashtag, FetchError> {
        require_text("hashtag", tag)?;
        require_paging(page, count)?;
        let url = self.endpoint(&["tag", tag])?;
        let body = self.get_with_retry(&url, &paging(page, count)).await?;
        let fetched_at = Utc::now();
        let listing = parser::parse_listing(&body.text)?;

        Ok(Hashtag {
            tag: tag.to_string(),
            challenge_id: listing.challenge_id,
            challenge_name: listing.challenge_name,
            videos: listing.items,
            fetched_at,
        })
    }

    #[instrument(skip(self))]
    pub async fn search_videos(
        &self,
        keyword: &str,
        page: u32,
        count: u32,
    ) -> Result<Vec<VideoSummary>, FetchError> {
        require_text("search keyword", keyword)?;
        require_paging(page, count)?;
        let url = self.endpoint(&["search", "item"])?;
        let mut params = vec![("keyword", keyword.to_string())];
        params.extend(paging(page, count));
        let body = self.get_with_retry(&url, &params).await?;
        Ok(parser::parse_listing(&body.text)?.items)
    }

    /// `{base_url}/{segments...}/` with each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<String, FetchError> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| FetchError::InvalidParameter(format!("base URL: {}", e)))?;
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                FetchError::InvalidParameter(format!(
                    "base URL '{}' cannot carry a path",
                    self.config.base_url
                ))
            })?;
            path.pop_if_empty();
            path.extend(segments);
            path.push("");
        }
        Ok(url.to_string())
    }

    /// Send a GET, retrying transient failures up to `max_retries` attempts
    async fn get_with_retry(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<ResponseBody, FetchError> {
        let max_attempts = self.config.max_retries.max(1);
        let timeout = self.config.timeout();
        let mut last_error = TransportError::Timeout;

        for attempt in 1..=max_attempts {
            let result = match tokio::time::timeout(timeout, self.client.get(url, params, timeout)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout),
            };

            match result {
                Ok(body) => {
                    debug!(url = %url, attempt, bytes = body.text.len(), "Request succeeded");
                    return Ok(body);
                },
                Err(TransportError::Status { code: 404 | 410 }) => {
                    return Err(FetchError::NotFound(url.to_string()));
                },
                Err(err) if !err.is_transient() => {
                    return Err(FetchError::Unreachable {
                        attempts: attempt,
                        reason: err.to_string(),
                    });
                },
                Err(err) => {
                    warn!(url = %url, attempt, max_attempts, error = %err, "Request attempt failed");
                    last_error = err;

                    if attempt < max_attempts {
                        let delay = self.config.backoff(attempt);
                        if !delay.is_zero() {
                            debug!(delay_ms = delay.as_millis() as u64, "Backing off before retry");
                            tokio::time::sleep(delay).await;
                        }
                    }
                },
            }
        }

        Err(match last_error {
            TransportError::Timeout => FetchError::Timeout {
                attempts: max_attempts,
            },
            other => FetchError::Unreachable {
                attempts: max_attempts,
                reason: other.to_string(),
            },
        })
    }
}

fn paging(page: u32, count: u32) -> Vec<(&'static str, String)> {
    vec![("page", page.to_string()), ("count", count.to_string())]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted responses and records every request
    struct ScriptedClient {
        responses: Mutex<VecDeque<Result<ResponseBody, TransportError>>>,
        calls: Mutex<Vec<(String, Vec<(String, String)>)>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<ResponseBody, TransportError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedClient {
        async fn get(
            &self,
            url: &str,
            params: &[(&str, String)],
            _timeout: Duration,
        ) -> Result<ResponseBody, TransportError> {
            self.calls.lock().unwrap().push((
                url.to_string(),
                params.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            ));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(TransportError::Connection("script exhausted".to_string())))
        }
    }

    /// Never answers; only the fetcher's own timeout ends the call
    struct HangingClient;

    #[async_trait]
    impl HttpClient for HangingClient {
        async fn get(
            &self,
            _url: &str,
            _params: &[(&str, String)],
            _timeout: Duration,
        ) -> Result<ResponseBody, TransportError> {
            std::future::pending().await
        }
    }

    fn test_config() -> FetcherConfig {
        FetcherConfig {
            base_url: "https://platform.test".to_string(),
            retry_backoff_ms: 0,
            ..Default::default()
        }
    }

    const TRENDING_BODY: &str = r#"{"items": [{"id": "t1", "title": "one"}, {"id": "t2"}]}"#;

    #[tokio::test]
    async fn test_retry_then_success_uses_exactly_three_attempts() {
        let client = ScriptedClient::new(vec![
            Err(TransportError::Connection("reset".to_string())),
            Err(TransportError::Status { code: 502 }),
            Ok(ResponseBody::new(TRENDING_BODY)),
        ]);
        let fetcher = Fetcher::with_client(client, test_config());

        let batch = fetcher.fetch_trending(1, 20).await.unwrap();
        assert_eq!(batch.items.len(), 2);
        assert_eq!(batch.page, 1);
        assert_eq!(fetcher.client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_unreachable() {
        let client = ScriptedClient::new(vec![
            Err(TransportError::Status { code: 500 }),
            Err(TransportError::Status { code: 503 }),
            Err(TransportError::Status { code: 503 }),
            Ok(ResponseBody::new(TRENDING_BODY)),
        ]);
        let fetcher = Fetcher::with_client(client, test_config());

        let err = fetcher.fetch_trending(1, 20).await.unwrap_err();
        assert!(matches!(err, FetchError::Unreachable { attempts: 3, .. }));
        assert_eq!(fetcher.client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_timeouts_report_timeout() {
        let client = ScriptedClient::new(vec![
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
        ]);
        let config = FetcherConfig {
            max_retries: 2,
            ..test_config()
        };
        let fetcher = Fetcher::with_client(client, config);

        let err = fetcher.fetch_user("u1").await.unwrap_err();
        assert_eq!(err, FetchError::Timeout { attempts: 2 });
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let client = ScriptedClient::new(vec![Err(TransportError::Status { code: 404 })]);
        let fetcher = Fetcher::with_client(client, test_config());

        let err = fetcher.fetch_video("gone").await.unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
        assert_eq!(fetcher.client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_client_errors_fail_immediately() {
        let client = ScriptedClient::new(vec![Err(TransportError::Status { code: 403 })]);
        let fetcher = Fetcher::with_client(client, test_config());

        let err = fetcher.fetch_user("private").await.unwrap_err();
        assert!(matches!(err, FetchError::Unreachable { attempts: 1, .. }));
        assert_eq!(fetcher.client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_body_is_not_retried() {
        let client = ScriptedClient::new(vec![Ok(ResponseBody::new("<<<not json"))]);
        let fetcher = Fetcher::with_client(client, test_config());

        let err = fetcher.fetch_hashtag("dance", 1, 10).await.unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
        assert_eq!(fetcher.client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_parameters_never_reach_the_network() {
        let fetcher = Fetcher::with_client(ScriptedClient::new(vec![]), test_config());

        for request in [
            FetchRequest::Video { id: "  ".to_string() },
            FetchRequest::User { id: String::new() },
            FetchRequest::Trending { page: 0, count: 20 },
            FetchRequest::Hashtag {
                tag: "dance".to_string(),
                page: 1,
                count: 0,
            },
            FetchRequest::Search {
                keyword: String::new(),
                page: 1,
                count: 10,
            },
        ] {
            assert!(request.validate().is_err());
            let err = fetcher.fetch(&request).await.unwrap_err();
            assert!(matches!(err, FetchError::InvalidParameter(_)), "{:?}", request);
        }
        assert_eq!(fetcher.client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_requests_hit_expected_urls() {
        let client = ScriptedClient::new(vec![
            Ok(ResponseBody::new(r#"{"challenge_name": "Hot", "items": []}"#)),
            Ok(ResponseBody::new(r#"{"items": [{"id": "s1"}]}"#)),
        ]);
        let fetcher = Fetcher::with_client(client, test_config());

        let hashtag = fetcher.fetch_hashtag("热搜2024", 2, 5).await.unwrap();
        assert_eq!(hashtag.tag, "热搜2024");
        assert_eq!(hashtag.challenge_name, "Hot");

        let hits = fetcher.search_videos("cats", 1, 50).await.unwrap();
        assert_eq!(hits[0].id, "s1");

        let calls = fetcher.client.calls.lock().unwrap();
        assert_eq!(
            calls[0].0,
            "https://platform.test/tag/%E7%83%AD%E6%90%9C2024/"
        );
        assert_eq!(
            calls[0].1,
            vec![("page".to_string(), "2".to_string()), ("count".to_string(), "5".to_string())]
        );
        assert_eq!(calls[1].0, "https://platform.test/search/item/");
        assert_eq!(calls[1].1[0], ("keyword".to_string(), "cats".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_client_is_bounded_by_timeout() {
        let config = FetcherConfig {
            timeout_secs: 10,
            max_retries: 2,
            ..test_config()
        };
        let fetcher = Fetcher::with_client(HangingClient, config);

        let err = fetcher.fetch_video("slow").await.unwrap_err();
        assert_eq!(err, FetchError::Timeout { attempts: 2 });
    }

    #[test]
    fn test_backoff_doubles() {
        let config = FetcherConfig {
            retry_backoff_ms: 500,
            ..test_config()
        };
        assert_eq!(config.backoff(1), Duration::from_millis(500));
        assert_eq!(config.backoff(2), Duration::from_millis(1000));
        assert_eq!(config.backoff(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_config_validation() {
        assert!(FetcherConfig::default().validate().is_ok());
        let bad_url = FetcherConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(bad_url.validate().is_err());
        let zero_retries = FetcherConfig {
            max_retries: 0,
            ..Default::default()
        };
        assert!(zero_retries.validate().is_err());
    }
}
