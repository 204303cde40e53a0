use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use url::Url;

use super::category::Category;
use super::error::FeedError;
use super::response::{ApiErrorBody, NewsResponse};
use crate::config::Config;
use crate::storage::Article;

pub const DEFAULT_BASE_URL: &str = "https://newsapi.org/v2/";
pub const DEFAULT_COUNTRY: &str = "us";
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// The API rejects anything larger
const MAX_PAGE_SIZE: u32 = 100;

const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024; // 5MB

const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// One page of remote results, in the order the API returned them.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub articles: Vec<Article>,
    /// Total matches reported by the API, if any
    pub total_results: Option<u32>,
}

/// Source of paginated headlines.
///
/// Implemented by [`NewsClient`]; the sync engine depends only on this
/// trait so tests can substitute a scripted source.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch page `page` (1-based) of headlines, optionally filtered by
    /// category and free-text query. Returns at most [`page_size`] articles.
    ///
    /// [`page_size`]: FeedSource::page_size
    async fn fetch_page(
        &self,
        page: u32,
        category: Option<Category>,
        query: Option<&str>,
    ) -> Result<Page, FeedError>;

    /// Articles per page.
    fn page_size(&self) -> u32;
}

/// HTTP client for the news API's `top-headlines` endpoint.
///
/// SEC: the API key travels only in the `X-Api-Key` header and is never
/// logged; `Debug` redacts it.
#[derive(Clone)]
pub struct NewsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    country: String,
    page_size: u32,
    timeout: Duration,
}

impl std::fmt::Debug for NewsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewsClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("country", &self.country)
            .field("page_size", &self.page_size)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl NewsClient {
    pub fn new(http: reqwest::Client, api_key: Option<SecretString>) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            country: DEFAULT_COUNTRY.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Client configured from `config`; `NEWS_API_KEY` wins over the file's key.
    pub fn from_config(http: reqwest::Client, config: &Config) -> Self {
        Self::new(http, config.resolve_api_key())
            .with_base_url(&config.base_url)
            .with_country(&config.country)
            .with_page_size(config.page_size)
            .with_timeout(Duration::from_secs(config.request_timeout_secs))
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn with_country(mut self, country: &str) -> Self {
        self.country = country.to_string();
        self
    }

    /// Clamped to `1..=100`.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the `top-headlines` request URL.
    ///
    /// `query` is trimmed; an empty query is omitted. Parameters are
    /// percent-encoded by [`Url`].
    pub(crate) fn build_url(
        &self,
        page: u32,
        category: Option<Category>,
        query: Option<&str>,
    ) -> Result<Url, FeedError> {
        if page == 0 {
            return Err(FeedError::BadRequest("page must be >= 1".to_string()));
        }

        let mut base = Url::parse(&self.base_url)
            .map_err(|e| FeedError::BadRequest(format!("invalid base URL: {e}")))?;

        // Only send the API key over HTTPS; plain HTTP is allowed for local test servers
        if base.scheme() != "https" {
            let is_localhost = matches!(base.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
            if base.scheme() != "http" || !is_localhost {
                tracing::error!(base_url = %self.base_url, "Rejecting non-HTTPS base URL");
                return Err(FeedError::InsecureBaseUrl);
            }
        }

        // Url::join replaces the last segment unless the path ends in '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let mut url = base
            .join("top-headlines")
            .map_err(|e| FeedError::BadRequest(e.to_string()))?;

        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("country", &self.country)
                .append_pair("pageSize", &self.page_size.to_string())
                .append_pair("page", &page.to_string());
            if let Some(category) = category {
                pairs.append_pair("category", category.as_str());
            }
            if let Some(query) = query.map(str::trim).filter(|q| !q.is_empty()) {
                pairs.append_pair("q", query);
            }
        }

        Ok(url)
    }
}

#[async_trait]
impl FeedSource for NewsClient {
    async fn fetch_page(
        &self,
        page: u32,
        category: Option<Category>,
        query: Option<&str>,
    ) -> Result<Page, FeedError> {
        let url = self.build_url(page, category, query)?;
        tracing::debug!(url = %url, "Fetching headlines");

        let mut request = self.http.get(url);
        match &self.api_key {
            Some(key) => request = request.header("X-Api-Key", key.expose_secret()),
            None => tracing::debug!("No API key configured, sending unauthenticated request"),
        }

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| FeedError::Timeout(self.timeout.as_secs()))?
            .map_err(FeedError::Network)?;

        let status = response.status();
        let body = read_limited_body(response, MAX_RESPONSE_SIZE).await?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ApiErrorBody>(&body)
                .ok()
                .and_then(|b| b.describe())
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("unexpected status")
                        .to_string()
                });
            tracing::warn!(status = status.as_u16(), message = %message, "Headline request rejected");
            return Err(FeedError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let decoded: NewsResponse =
            serde_json::from_slice(&body).map_err(|e| FeedError::Decode(e.to_string()))?;

        if decoded.status != "ok" {
            return Err(FeedError::Rejected {
                status: status.as_u16(),
                message: format!("API status '{}'", decoded.status),
            });
        }

        let mut articles: Vec<Article> = decoded.articles.into_iter().map(Article::from).collect();
        let limit = self.page_size as usize;
        if articles.len() > limit {
            tracing::debug!(
                returned = articles.len(),
                page_size = limit,
                "API returned more than a page, truncating"
            );
            articles.truncate(limit);
        }

        tracing::info!(
            page = page,
            category = ?category,
            count = articles.len(),
            total = ?decoded.total_results,
            "Received headlines"
        );

        Ok(Page {
            articles,
            total_results: decoded.total_results,
        })
    }

    fn page_size(&self) -> u32 {
        self.page_size
    }
}

/// Stream the body into memory, failing once it exceeds `limit` bytes.
async fn read_limited_body(response: reqwest::Response, limit: usize) -> Result<Vec<u8>, FeedError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FeedError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FeedError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FeedError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
