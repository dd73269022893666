//! # Knowbot - Contact and Entity Harvesting for Company Websites
//!
//! This crate crawls a fixed list of web pages, pulls shallow contact and entity
//! signals out of each page, and folds them into two durable views: a per-domain
//! aggregate record and a deduplicated, evidence-counted entity graph.
//!
//! ## Features
//!
//! - Pluggable fetch capability with a `reqwest` implementation
//! - Heuristic extraction of titles, emails, phone numbers and candidate entities
//! - Deterministic, capped merging of contacts across repeated crawls of a domain
//! - Evidence-counting entity upserts that stay atomic at the storage layer
//! - Per-URL transactional isolation: one bad page never aborts a batch
//! - LibSQL persistence with read-only query projections
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use knowbot::crawler::{CrawlOrchestrator, CrawlerConfig, HttpFetcher};
//! use knowbot::graph::LibsqlGraph;
//! use knowbot::store::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CrawlerConfig::default();
//!     let fetcher = HttpFetcher::new(&config)?;
//!     let db = Database::new_from_path("knowbot.db").await?;
//!     let graph = LibsqlGraph::new_from_path("knowbot-graph.db").await?;
//!
//!     let orchestrator = CrawlOrchestrator::new(fetcher, db, Arc::new(graph), config);
//!     let report = orchestrator
//!         .run(&["https://www.example.com".to_string()])
//!         .await;
//!
//!     println!("Crawled {} websites", report.succeeded);
//!     Ok(())
//! }
//! ```

mod error;

pub mod aggregate;
pub mod crawler;
pub mod extract;
pub mod graph;
pub mod store;

pub use error::Error;

/// Re-export of commonly used types
pub mod prelude {
    pub use crate::aggregate::{ContactSet, DomainAggregate, DomainAggregator};
    pub use crate::error::Error;
    pub use crate::extract::{Extractor, SignalBundle};
}
