//! Error types for the knowbot crate

use thiserror::Error;

/// Error type for knowbot operations
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Web crawling error
    #[error("Crawl error: {0}")]
    Crawl(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),
}
