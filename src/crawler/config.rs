//! # Crawler Configuration Module
//!
//! Configuration for a crawl run: how pages are fetched, how many fetches may
//! be in flight, and the limits handed to extraction and aggregation. Uses a
//! builder for fluent configuration.
//!
//! ## Defaults
//!
//! - User agent `KnowledgeBot/1.0`, 10 second request timeout
//! - One fetch at a time
//! - At most 5 entity graph upserts per page
//! - Extraction and aggregation limits from their own defaults

use std::time::Duration;

use crate::aggregate::AggregatorConfig;
use crate::extract::ExtractorConfig;

/// Configuration for the crawler
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// User agent to use for requests
    pub user_agent: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Number of fetches allowed in flight at once
    pub concurrency: usize,

    /// Maximum candidate entities sent to the graph per page
    pub entity_upsert_limit: usize,

    /// Limits used by the extractor
    pub extractor: ExtractorConfig,

    /// Limits used by the domain aggregator
    pub aggregator: AggregatorConfig,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: "KnowledgeBot/1.0".to_string(),
            timeout_secs: 10,
            concurrency: 1,
            entity_upsert_limit: 5,
            extractor: ExtractorConfig::default(),
            aggregator: AggregatorConfig::default(),
        }
    }
}

/// Builder for CrawlerConfig
#[derive(Debug, Default)]
pub struct CrawlerConfigBuilder {
    config: CrawlerConfig,
}

impl CrawlerConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: CrawlerConfig::default(),
        }
    }

    /// Set the user agent to use for requests
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set the per-request timeout in seconds
    pub fn timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.config.timeout_secs = timeout_secs;
        self
    }

    /// Set how many fetches may run at once
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    /// Set the number of entities upserted into the graph per page
    pub fn entity_upsert_limit(mut self, entity_upsert_limit: usize) -> Self {
        self.config.entity_upsert_limit = entity_upsert_limit;
        self
    }

    /// Set the extraction limits
    pub fn extractor(mut self, extractor: ExtractorConfig) -> Self {
        self.config.extractor = extractor;
        self
    }

    /// Set the aggregation limits
    pub fn aggregator(mut self, aggregator: AggregatorConfig) -> Self {
        self.config.aggregator = aggregator;
        self
    }

    /// Build the configuration
    pub fn build(self) -> CrawlerConfig {
        self.config
    }
}

impl CrawlerConfig {
    /// Create a new builder
    pub fn builder() -> CrawlerConfigBuilder {
        CrawlerConfigBuilder::new()
    }

    /// Get the request timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
