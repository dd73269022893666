//! # Company Website Crawler Module
//!
//! Runs the crawl pipeline over a list of seed URLs. Each URL is fetched,
//! its signals are extracted, and the results are written to crawl storage and
//! folded into the per-domain aggregate. Named entities are then forwarded to
//! the entity graph.
//!
//! ## Key Components
//!
//! - `CrawlerConfig`: User agent, timeout, fetch concurrency and limits
//! - `Fetcher` / `HttpFetcher`: Bounded-time retrieval of a single page
//! - `CrawlOrchestrator`: The per-URL pipeline and its failure isolation
//!
//! ## Failure handling
//!
//! A URL that cannot be fetched is skipped with a warning. A URL whose writes
//! fail is rolled back and reported. Neither stops the run.

mod config;
mod error;
mod fetch;
mod orchestrator;

pub use config::{CrawlerConfig, CrawlerConfigBuilder};
pub use error::CrawlError;
pub use fetch::{FetchedPage, Fetcher, HttpFetcher, content_hash, domain_of};
pub use orchestrator::{CrawlFailure, CrawlOrchestrator, CrawlReport, FailureStage, PageOutcome};
