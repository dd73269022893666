//! # Crawl Schema
//!
//! Creates the crawl tables if they do not exist yet. JSON-shaped columns
//! (headers, metadata, entities, contacts) are stored as TEXT. Timestamps are
//! unix milliseconds.

use crate::store::error::DbError;
use libsql::{Connection, params};

/// Initialize the crawl schema
pub async fn initialize_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS raw_crawls (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL UNIQUE,
            domain TEXT NOT NULL,
            raw_html TEXT NOT NULL,
            headers TEXT NOT NULL,
            status_code INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            crawled_at INTEGER NOT NULL
        )",
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create raw_crawls table: {}", e)))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS url_frames (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL UNIQUE,
            domain TEXT NOT NULL,
            metadata TEXT NOT NULL,
            entities TEXT NOT NULL,
            contacts TEXT NOT NULL,
            confidence_score REAL NOT NULL DEFAULT 0.0,
            last_updated INTEGER NOT NULL
        )",
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create url_frames table: {}", e)))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS domain_frames (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            domain TEXT NOT NULL UNIQUE,
            company_name TEXT,
            aggregated_contacts TEXT NOT NULL,
            confidence_score REAL NOT NULL DEFAULT 0.0,
            url_count INTEGER NOT NULL DEFAULT 0,
            last_crawled INTEGER
        )",
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create domain_frames table: {}", e)))?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_raw_crawls_domain ON raw_crawls(domain)",
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create index on raw_crawls: {}", e)))?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_url_frames_domain ON url_frames(domain)",
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create index on url_frames: {}", e)))?;

    Ok(())
}
