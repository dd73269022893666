//! Fetch capability and its HTTP implementation

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client as ReqwestClient;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};
use url::Url;

use crate::crawler::CrawlerConfig;
use crate::crawler::error::CrawlError;

/// A successfully fetched page
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    /// Requested URL
    pub url: String,

    /// Host of the URL
    pub domain: String,

    /// HTTP status code
    pub status_code: u16,

    /// Response headers
    pub headers: BTreeMap<String, String>,

    /// Response body decoded as text
    pub body: String,

    /// SHA-256 of the body, hex encoded
    pub content_hash: String,

    /// When the response arrived
    pub fetched_at: DateTime<Utc>,
}

impl FetchedPage {
    /// Build a page from a response, deriving the domain and content hash
    pub fn new(
        url: &str,
        status_code: u16,
        headers: BTreeMap<String, String>,
        body: String,
    ) -> Result<Self, CrawlError> {
        Ok(Self {
            url: url.to_string(),
            domain: domain_of(url)?,
            status_code,
            headers,
            content_hash: content_hash(&body),
            body,
            fetched_at: Utc::now(),
        })
    }
}

/// Retrieves raw pages
///
/// Implementations must be bounded in time and report failure instead of
/// hanging. Any error makes the crawler skip the URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, CrawlError>;
}

/// Fetcher backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: ReqwestClient,
}

impl HttpFetcher {
    /// Create a fetcher using the configured user agent and timeout
    pub fn new(config: &CrawlerConfig) -> Result<Self, CrawlError> {
        let client = ReqwestClient::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(skip(self), level = "debug")]
    async fn fetch(&self, url: &str) -> Result<FetchedPage, CrawlError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in response.headers() {
            let Ok(value) = value.to_str() else {
                continue;
            };
            headers
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }

        let body = response.text().await?;
        debug!("Fetched {} bytes from {}", body.len(), url);

        FetchedPage::new(url, status.as_u16(), headers, body)
    }
}

/// Host part of a URL
pub fn domain_of(url: &str) -> Result<String, CrawlError> {
    let parsed = Url::parse(url)?;
    parsed
        .host_str()
        .map(str::to_string)
        .ok_or_else(|| CrawlError::MissingHost(url.to_string()))
}

/// SHA-256 of `body`, hex encoded
pub fn content_hash(body: &str) -> String {
    hex::encode(Sha256::digest(body.as_bytes()))
}
