//! # Domain Aggregation Module
//!
//! Folds one page's [`SignalBundle`] into the durable per-domain record.
//!
//! The merge is pure: it takes the previously stored aggregate (if any) and
//! returns the updated one. Loading and saving belong to the caller, which
//! performs exactly one write per merge inside the page's transaction.
//!
//! ## Invariants
//!
//! - `aggregated_contacts` only ever holds values observed on some page of the
//!   domain, deduplicated, and at most `contact_cap` per kind
//! - `url_count` grows by exactly one per successful merge
//! - Capping keeps the earliest observed values (insertion order)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use crate::extract::ContactSet;
use crate::extract::SignalBundle;

/// Aggregated view of everything crawled for one domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainAggregate {
    /// Domain name, unique key
    pub domain: String,

    /// Company name, when known
    pub company_name: Option<String>,

    /// Deduplicated, capped union of every page's contacts
    pub aggregated_contacts: ContactSet,

    /// Number of pages successfully merged
    pub url_count: i64,

    /// Confidence in the aggregate, within [0, 1]
    pub confidence_score: f64,

    /// Time of the most recent successful merge
    pub last_crawled: DateTime<Utc>,
}

/// Configuration for domain merging
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Maximum emails and phones kept per domain
    pub contact_cap: usize,

    /// Confidence assigned on every merge
    pub confidence_score: f64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            contact_cap: 10,
            confidence_score: 0.8,
        }
    }
}

/// Merges page signals into domain aggregates
#[derive(Debug, Clone, Default)]
pub struct DomainAggregator {
    config: AggregatorConfig,
}

impl DomainAggregator {
    /// Create an aggregator with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an aggregator with custom configuration
    pub fn with_config(config: AggregatorConfig) -> Self {
        Self { config }
    }

    /// Active configuration
    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Merge `bundle` into `existing`, producing the record to store
    ///
    /// # Arguments
    ///
    /// * `existing` - The stored aggregate for `domain`, if there is one
    /// * `domain` - Domain the page belongs to
    /// * `bundle` - Signals extracted from the page
    /// * `crawled_at` - Time of this merge
    pub fn merge(
        &self,
        existing: Option<DomainAggregate>,
        domain: &str,
        bundle: &SignalBundle,
        crawled_at: DateTime<Utc>,
    ) -> DomainAggregate {
        let confidence_score = self.config.confidence_score.clamp(0.0, 1.0);

        match existing {
            Some(aggregate) => {
                debug!(
                    domain,
                    url_count = aggregate.url_count + 1,
                    "Updating domain aggregate"
                );
                DomainAggregate {
                    aggregated_contacts: aggregate
                        .aggregated_contacts
                        .union_capped(&bundle.contacts, self.config.contact_cap),
                    url_count: aggregate.url_count + 1,
                    confidence_score,
                    last_crawled: crawled_at,
                    ..aggregate
                }
            }
            None => {
                debug!(domain, "Creating domain aggregate");
                DomainAggregate {
                    domain: domain.to_string(),
                    company_name: None,
                    aggregated_contacts: bundle.contacts.capped(self.config.contact_cap),
                    url_count: 1,
                    confidence_score,
                    last_crawled: crawled_at,
                }
            }
        }
    }
}
