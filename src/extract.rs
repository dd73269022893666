//! # Signal Extraction Module
//!
//! Turns one fetched page into a [`SignalBundle`]: page metadata, a short list of
//! candidate entities and the contact values found in the visible text.
//!
//! Extraction is pure and infallible. Malformed or empty markup degrades to empty
//! fields instead of an error, so the crawl loop never has to handle an
//! extraction failure.
//!
//! ## Pipeline
//!
//! 1. Parse the page and drop non-content elements (`script`, `style`, `noscript`)
//! 2. Read the `<title>` into the metadata
//! 3. Scan the remaining text for emails and phone numbers
//! 4. Ask the configured [`EntityStrategy`] for candidate entities

mod contacts;
mod content;
mod entities;

pub use contacts::{ContactSet, scan_emails, scan_phones};
pub use content::{PageText, parse_page};
pub use entities::{EntityStrategy, TitleCaseStrategy, is_title_case};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Metadata pulled from a page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    /// Text of the `<title>` element, empty when absent
    pub title: String,

    /// Always empty; no description lookup is performed
    pub description: String,
}

/// Label attached to a candidate entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityLabel {
    /// Organisation-like proper noun
    #[serde(rename = "ORG")]
    Org,
}

impl EntityLabel {
    /// Stable string form used as the graph `type` key
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityLabel::Org => "ORG",
        }
    }
}

impl std::fmt::Display for EntityLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A token that looks like a named entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateEntity {
    /// Surface text as it appeared on the page
    pub text: String,

    /// Assigned label
    pub label: EntityLabel,
}

impl CandidateEntity {
    pub fn org(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            label: EntityLabel::Org,
        }
    }
}

/// Everything extracted from a single page
///
/// Lives only for the duration of one page's processing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalBundle {
    pub metadata: PageMetadata,

    /// Candidate entities in scan order, duplicates preserved
    #[serde(rename = "entities")]
    pub candidate_entities: Vec<CandidateEntity>,

    pub contacts: ContactSet,
}

/// Limits applied during extraction
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Raw pattern matches kept per contact kind before deduplication
    pub contact_limit: usize,

    /// Maximum number of candidate entities per page
    pub entity_limit: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            contact_limit: 5,
            entity_limit: 10,
        }
    }
}

/// Page extractor with a pluggable entity strategy
#[derive(Debug)]
pub struct Extractor {
    config: ExtractorConfig,
    strategy: Box<dyn EntityStrategy>,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor {
    /// Create an extractor with default limits and the title-case heuristic
    pub fn new() -> Self {
        Self::with_config(ExtractorConfig::default())
    }

    /// Create an extractor with custom limits
    pub fn with_config(config: ExtractorConfig) -> Self {
        Self {
            config,
            strategy: Box::new(TitleCaseStrategy::default()),
        }
    }

    /// Replace the entity strategy
    pub fn with_strategy(mut self, strategy: impl EntityStrategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    /// Extract signals from raw page markup
    pub fn extract(&self, html: &str) -> SignalBundle {
        let page = parse_page(html);

        let contacts = ContactSet {
            emails: scan_emails(&page.text, self.config.contact_limit),
            phones: scan_phones(&page.text, self.config.contact_limit),
        };

        let candidate_entities = self
            .strategy
            .candidates(&page.text, self.config.entity_limit);

        debug!(
            emails = contacts.emails.len(),
            phones = contacts.phones.len(),
            entities = candidate_entities.len(),
            "Extracted page signals"
        );

        SignalBundle {
            metadata: PageMetadata {
                title: page.title,
                description: String::new(),
            },
            candidate_entities,
            contacts,
        }
    }
}
