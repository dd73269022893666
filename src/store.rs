//! # Crawl Storage Module
//!
//! Durable state for the crawl pipeline, backed by LibSQL:
//!
//! - `raw_crawls`: one audit row per fetched URL (upserted on URL conflict)
//! - `url_frames`: the extraction snapshot of each URL
//! - `domain_frames`: the per-domain aggregate
//!
//! Writes for a single page go through a [`PageTransaction`] so that a failure
//! part way through a page leaves no trace of it. The orchestrator only sees
//! the [`PageStore`] and [`PageTransaction`] traits; [`Database`] is the LibSQL
//! implementation.
//!
//! The read-only projections consumed by reporting (`stats`, `query_contacts`)
//! also live on [`Database`].

mod database;
pub mod error;
mod schema;

pub use database::{Database, DbTransaction};
pub use error::DbError;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::{ContactSet, DomainAggregate};
use crate::extract::{CandidateEntity, PageMetadata};

/// Raw fetch result kept for auditing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCrawl {
    /// URL of the page, unique key
    pub url: String,

    /// Host the URL belongs to
    pub domain: String,

    /// Page body as fetched
    pub raw_html: String,

    /// Response headers
    pub headers: BTreeMap<String, String>,

    /// HTTP status code
    pub status_code: u16,

    /// SHA-256 of the body, hex encoded
    pub content_hash: String,

    /// When the page was fetched
    pub crawled_at: DateTime<Utc>,
}

/// Extraction snapshot for one URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlFrame {
    pub url: String,
    pub domain: String,
    pub metadata: PageMetadata,
    pub entities: Vec<CandidateEntity>,
    pub contacts: ContactSet,
    pub confidence_score: f64,
    pub last_updated: DateTime<Utc>,
}

/// Counts over the crawl tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStats {
    /// Number of URL frames stored
    pub urls_crawled: i64,

    /// Number of domain aggregates stored
    pub domains_processed: i64,
}

/// Contact summary of one domain, as served to readers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainContacts {
    pub domain: String,

    /// Stored company name, or the domain when none is known
    pub company_name: String,

    /// At most three emails and three phones
    pub contacts: ContactSet,

    pub confidence: f64,

    pub url_count: i64,
}

/// Storage that can open a per-page transaction
#[async_trait]
pub trait PageStore: Send + Sync {
    type Tx: PageTransaction;

    /// Begin the transaction that scopes one page's writes
    async fn begin(&self) -> Result<Self::Tx, DbError>;
}

/// Writes for a single page
///
/// Nothing is visible to other readers until [`commit`](Self::commit)
/// succeeds. Dropping or rolling back discards every write made through it.
#[async_trait]
pub trait PageTransaction: Send {
    /// Save the raw fetch result, replacing any row for the same URL
    async fn save_raw(&mut self, raw: &RawCrawl) -> Result<(), DbError>;

    /// Save the extraction snapshot, replacing any row for the same URL
    async fn save_url_frame(&mut self, frame: &UrlFrame) -> Result<(), DbError>;

    /// Load the aggregate for `domain`
    async fn load_domain(&mut self, domain: &str) -> Result<Option<DomainAggregate>, DbError>;

    /// Insert or update the aggregate for its domain
    async fn save_domain(&mut self, aggregate: &DomainAggregate) -> Result<(), DbError>;

    async fn commit(self) -> Result<(), DbError>;

    async fn rollback(self) -> Result<(), DbError>;
}
