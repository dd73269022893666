//! Database operations for the crawl store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Row, params};
use tracing::{debug, instrument};

use crate::aggregate::{ContactSet, DomainAggregate};
use crate::store::error::DbError;
use crate::store::schema;
use crate::store::{CrawlStats, DomainContacts, PageStore, PageTransaction, RawCrawl, UrlFrame};

/// Contacts of each kind shown per domain by `query_contacts`
const CONTACT_PREVIEW: usize = 3;

/// Database manager for crawl data
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Create a new database manager
    #[instrument(skip(conn))]
    pub async fn new(conn: Connection) -> Result<Self, DbError> {
        schema::initialize_schema(&conn).await?;

        Ok(Self { conn })
    }

    /// Create a new database manager from a path
    pub async fn new_from_path(path: &str) -> Result<Self, DbError> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DbError::Connection(format!("Failed to open database: {}", e)))?;

        let conn = db
            .connect()
            .map_err(|e| DbError::Connection(format!("Failed to connect to database: {}", e)))?;

        Self::new(conn).await
    }

    /// Execute a custom query with parameters
    #[cfg(test)]
    pub async fn execute_query<P>(&self, sql: &str, params: P) -> Result<libsql::Rows, DbError>
    where
        P: libsql::params::IntoParams,
    {
        self.conn
            .query(sql, params)
            .await
            .map_err(|e| DbError::Query(format!("Failed to execute query: {}", e)))
    }

    /// Load the aggregate for a domain outside of any page transaction
    pub async fn load_domain(&self, domain: &str) -> Result<Option<DomainAggregate>, DbError> {
        load_domain(&self.conn, domain).await
    }

    /// Get the stored extraction snapshot for a URL
    pub async fn get_url_frame(&self, url: &str) -> Result<Option<UrlFrame>, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT url, domain, metadata, entities, contacts, confidence_score, last_updated
                 FROM url_frames
                 WHERE url = ?",
                params![url],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to get url frame: {}", e)))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_url_frame(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DbError::Data(format!("Failed to get url frame: {}", e))),
        }
    }

    /// Get the stored raw fetch result for a URL
    pub async fn get_raw_crawl(&self, url: &str) -> Result<Option<RawCrawl>, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT url, domain, raw_html, headers, status_code, content_hash, crawled_at
                 FROM raw_crawls
                 WHERE url = ?",
                params![url],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to get raw crawl: {}", e)))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_raw_crawl(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DbError::Data(format!("Failed to get raw crawl: {}", e))),
        }
    }

    /// Count crawled URLs and processed domains
    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<CrawlStats, DbError> {
        Ok(CrawlStats {
            urls_crawled: self.count("url_frames").await?,
            domains_processed: self.count("domain_frames").await?,
        })
    }

    /// Contact summaries for up to `max_results` domains with non-empty contacts
    ///
    /// Domains are visited in insertion order. Each summary carries at most
    /// three emails and three phones.
    #[instrument(skip(self))]
    pub async fn query_contacts(&self, max_results: usize) -> Result<Vec<DomainContacts>, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT domain, company_name, aggregated_contacts, confidence_score, url_count, last_crawled
                 FROM domain_frames
                 ORDER BY id",
                params![],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to query domains: {}", e)))?;

        let mut results = Vec::new();
        while results.len() < max_results {
            let row = match rows.next().await {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(e) => return Err(DbError::Data(format!("Failed to read domain: {}", e))),
            };

            let aggregate = row_to_domain(&row)?;
            if aggregate.aggregated_contacts.is_empty() {
                continue;
            }

            results.push(DomainContacts {
                company_name: aggregate
                    .company_name
                    .clone()
                    .unwrap_or_else(|| aggregate.domain.clone()),
                contacts: aggregate.aggregated_contacts.capped(CONTACT_PREVIEW),
                confidence: aggregate.confidence_score,
                url_count: aggregate.url_count,
                domain: aggregate.domain,
            });
        }

        debug!("Found {} domains with contacts", results.len());
        Ok(results)
    }

    async fn count(&self, table: &str) -> Result<i64, DbError> {
        let mut rows = self
            .conn
            .query(&format!("SELECT COUNT(*) FROM {}", table), params![])
            .await
            .map_err(|e| DbError::Query(format!("Failed to count {}: {}", table, e)))?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(0),
            Err(e) => return Err(DbError::Data(format!("Failed to count {}: {}", table, e))),
        };

        row.get(0)
            .map_err(|e| DbError::Data(format!("Failed to get count of {}: {}", table, e)))
    }
}

/// A LibSQL transaction scoping one page's writes
pub struct DbTransaction {
    tx: libsql::Transaction,
}

#[async_trait]
impl PageStore for Database {
    type Tx = DbTransaction;

    async fn begin(&self) -> Result<DbTransaction, DbError> {
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| DbError::Transaction(format!("Failed to start transaction: {}", e)))?;

        Ok(DbTransaction { tx })
    }
}

#[async_trait]
impl PageTransaction for DbTransaction {
    async fn save_raw(&mut self, raw: &RawCrawl) -> Result<(), DbError> {
        let headers = serde_json::to_string(&raw.headers)?;

        self.tx
            .execute(
                "INSERT INTO raw_crawls (url, domain, raw_html, headers, status_code, content_hash, crawled_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(url) DO UPDATE SET
                 domain = excluded.domain,
                 raw_html = excluded.raw_html,
                 headers = excluded.headers,
                 status_code = excluded.status_code,
                 content_hash = excluded.content_hash,
                 crawled_at = excluded.crawled_at",
                params![
                    raw.url.as_str(),
                    raw.domain.as_str(),
                    raw.raw_html.as_str(),
                    headers,
                    i64::from(raw.status_code),
                    raw.content_hash.as_str(),
                    raw.crawled_at.timestamp_millis(),
                ],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to save raw crawl: {}", e)))?;

        Ok(())
    }

    async fn save_url_frame(&mut self, frame: &UrlFrame) -> Result<(), DbError> {
        let metadata = serde_json::to_string(&frame.metadata)?;
        let entities = serde_json::to_string(&frame.entities)?;
        let contacts = serde_json::to_string(&frame.contacts)?;

        self.tx
            .execute(
                "INSERT INTO url_frames (url, domain, metadata, entities, contacts, confidence_score, last_updated)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(url) DO UPDATE SET
                 domain = excluded.domain,
                 metadata = excluded.metadata,
                 entities = excluded.entities,
                 contacts = excluded.contacts,
                 confidence_score = excluded.confidence_score,
                 last_updated = excluded.last_updated",
                params![
                    frame.url.as_str(),
                    frame.domain.as_str(),
                    metadata,
                    entities,
                    contacts,
                    frame.confidence_score,
                    frame.last_updated.timestamp_millis(),
                ],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to save url frame: {}", e)))?;

        Ok(())
    }

    async fn load_domain(&mut self, domain: &str) -> Result<Option<DomainAggregate>, DbError> {
        load_domain(&self.tx, domain).await
    }

    async fn save_domain(&mut self, aggregate: &DomainAggregate) -> Result<(), DbError> {
        let contacts = serde_json::to_string(&aggregate.aggregated_contacts)?;

        self.tx
            .execute(
                "INSERT INTO domain_frames (domain, company_name, aggregated_contacts, confidence_score, url_count, last_crawled)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(domain) DO UPDATE SET
                 company_name = excluded.company_name,
                 aggregated_contacts = excluded.aggregated_contacts,
                 confidence_score = excluded.confidence_score,
                 url_count = excluded.url_count,
                 last_crawled = excluded.last_crawled",
                params![
                    aggregate.domain.as_str(),
                    aggregate.company_name.clone(),
                    contacts,
                    aggregate.confidence_score,
                    aggregate.url_count,
                    aggregate.last_crawled.timestamp_millis(),
                ],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to save domain frame: {}", e)))?;

        Ok(())
    }

    async fn commit(self) -> Result<(), DbError> {
        self.tx
            .commit()
            .await
            .map_err(|e| DbError::Transaction(format!("Failed to commit transaction: {}", e)))
    }

    async fn rollback(self) -> Result<(), DbError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| DbError::Transaction(format!("Failed to roll back transaction: {}", e)))
    }
}

async fn load_domain(conn: &Connection, domain: &str) -> Result<Option<DomainAggregate>, DbError> {
    let mut rows = conn
        .query(
            "SELECT domain, company_name, aggregated_contacts, confidence_score, url_count, last_crawled
             FROM domain_frames
             WHERE domain = ?",
            params![domain],
        )
        .await
        .map_err(|e| DbError::Query(format!("Failed to load domain: {}", e)))?;

    match rows.next().await {
        Ok(Some(row)) => Ok(Some(row_to_domain(&row)?)),
        Ok(None) => Ok(None),
        Err(e) => Err(DbError::Data(format!("Failed to load domain: {}", e))),
    }
}

fn from_millis(millis: i64, column: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| DbError::Data(format!("Invalid {} timestamp: {}", column, millis)))
}

/// Convert a database row to a DomainAggregate
fn row_to_domain(row: &Row) -> Result<DomainAggregate, DbError> {
    let contacts: String = row
        .get(2)
        .map_err(|e| DbError::Data(format!("Failed to get aggregated_contacts: {}", e)))?;
    let aggregated_contacts: ContactSet = serde_json::from_str(&contacts)?;

    let last_crawled: Option<i64> = row
        .get(5)
        .map_err(|e| DbError::Data(format!("Failed to get last_crawled: {}", e)))?;
    let last_crawled = last_crawled
        .ok_or_else(|| DbError::Data("Domain frame has no last_crawled".to_string()))?;

    Ok(DomainAggregate {
        domain: row
            .get(0)
            .map_err(|e| DbError::Data(format!("Failed to get domain: {}", e)))?,
        company_name: row
            .get(1)
            .map_err(|e| DbError::Data(format!("Failed to get company_name: {}", e)))?,
        aggregated_contacts,
        confidence_score: row
            .get(3)
            .map_err(|e| DbError::Data(format!("Failed to get confidence_score: {}", e)))?,
        url_count: row
            .get(4)
            .map_err(|e| DbError::Data(format!("Failed to get url_count: {}", e)))?,
        last_crawled: from_millis(last_crawled, "last_crawled")?,
    })
}

/// Convert a database row to a UrlFrame
fn row_to_url_frame(row: &Row) -> Result<UrlFrame, DbError> {
    let metadata: String = row
        .get(2)
        .map_err(|e| DbError::Data(format!("Failed to get metadata: {}", e)))?;
    let entities: String = row
        .get(3)
        .map_err(|e| DbError::Data(format!("Failed to get entities: {}", e)))?;
    let contacts: String = row
        .get(4)
        .map_err(|e| DbError::Data(format!("Failed to get contacts: {}", e)))?;
    let last_updated: i64 = row
        .get(6)
        .map_err(|e| DbError::Data(format!("Failed to get last_updated: {}", e)))?;

    Ok(UrlFrame {
        url: row
            .get(0)
            .map_err(|e| DbError::Data(format!("Failed to get url: {}", e)))?,
        domain: row
            .get(1)
            .map_err(|e| DbError::Data(format!("Failed to get domain: {}", e)))?,
        metadata: serde_json::from_str(&metadata)?,
        entities: serde_json::from_str(&entities)?,
        contacts: serde_json::from_str(&contacts)?,
        confidence_score: row
            .get(5)
            .map_err(|e| DbError::Data(format!("Failed to get confidence_score: {}", e)))?,
        last_updated: from_millis(last_updated, "last_updated")?,
    })
}

/// Convert a database row to a RawCrawl
fn row_to_raw_crawl(row: &Row) -> Result<RawCrawl, DbError> {
    let headers: String = row
        .get(3)
        .map_err(|e| DbError::Data(format!("Failed to get headers: {}", e)))?;
    let status_code: i64 = row
        .get(4)
        .map_err(|e| DbError::Data(format!("Failed to get status_code: {}", e)))?;
    let crawled_at: i64 = row
        .get(6)
        .map_err(|e| DbError::Data(format!("Failed to get crawled_at: {}", e)))?;

    Ok(RawCrawl {
        url: row
            .get(0)
            .map_err(|e| DbError::Data(format!("Failed to get url: {}", e)))?,
        domain: row
            .get(1)
            .map_err(|e| DbError::Data(format!("Failed to get domain: {}", e)))?,
        raw_html: row
            .get(2)
            .map_err(|e| DbError::Data(format!("Failed to get raw_html: {}", e)))?,
        headers: serde_json::from_str(&headers)?,
        status_code: u16::try_from(status_code)
            .map_err(|e| DbError::Data(format!("Invalid status_code {}: {}", status_code, e)))?,
        content_hash: row
            .get(5)
            .map_err(|e| DbError::Data(format!("Failed to get content_hash: {}", e)))?,
        crawled_at: from_millis(crawled_at, "crawled_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;

    use crate::extract::{CandidateEntity, PageMetadata};
    use tempfile::tempdir;

    async fn setup_test_db() -> Result<(Database, tempfile::TempDir), DbError> {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();

        let db = Database::new_from_path(&db_path).await?;

        Ok((db, temp_dir))
    }

    fn now_millis() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap()
    }

    fn contacts(emails: &[&str], phones: &[&str]) -> ContactSet {
        ContactSet {
            emails: emails.iter().map(|s| s.to_string()).collect(),
            phones: phones.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn raw(url: &str, body: &str) -> RawCrawl {
        RawCrawl {
            url: url.to_string(),
            domain: "example.com".to_string(),
            raw_html: body.to_string(),
            headers: BTreeMap::from([("content-type".to_string(), "text/html".to_string())]),
            status_code: 200,
            content_hash: "abc123".to_string(),
            crawled_at: now_millis(),
        }
    }

    fn aggregate(domain: &str, contacts: ContactSet, url_count: i64) -> DomainAggregate {
        DomainAggregate {
            domain: domain.to_string(),
            company_name: None,
            aggregated_contacts: contacts,
            url_count,
            confidence_score: 0.8,
            last_crawled: now_millis(),
        }
    }

    async fn commit_domain(db: &Database, aggregate: &DomainAggregate) {
        let mut tx = db.begin().await.unwrap();
        tx.save_domain(aggregate).await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_database_initialization() {
        let (db, _temp_dir) = setup_test_db().await.unwrap();

        let mut result = db
            .execute_query(
                "SELECT name FROM sqlite_master WHERE type='table'
                 AND name IN ('raw_crawls', 'url_frames', 'domain_frames')",
                params![],
            )
            .await
            .unwrap();

        let mut tables = Vec::new();
        while let Ok(Some(row)) = result.next().await {
            let table_name: String = row.get(0).unwrap();
            tables.push(table_name);
        }

        assert_eq!(tables.len(), 3);
    }

    #[tokio::test]
    async fn test_committed_page_round_trip() {
        let (db, _temp_dir) = setup_test_db().await.unwrap();

        let raw = raw("https://example.com/", "<title>Example</title>");
        let frame = UrlFrame {
            url: raw.url.clone(),
            domain: raw.domain.clone(),
            metadata: PageMetadata {
                title: "Example".to_string(),
                description: String::new(),
            },
            entities: vec![CandidateEntity::org("Example")],
            contacts: contacts(&["a@x.com"], &[]),
            confidence_score: 0.8,
            last_updated: now_millis(),
        };
        let domain = aggregate("example.com", contacts(&["a@x.com"], &[]), 1);

        let mut tx = db.begin().await.unwrap();
        tx.save_raw(&raw).await.unwrap();
        tx.save_url_frame(&frame).await.unwrap();
        tx.save_domain(&domain).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(db.get_raw_crawl(&raw.url).await.unwrap(), Some(raw));
        assert_eq!(db.get_url_frame(&frame.url).await.unwrap(), Some(frame));
        assert_eq!(db.load_domain("example.com").await.unwrap(), Some(domain));
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let (db, _temp_dir) = setup_test_db().await.unwrap();

        let mut tx = db.begin().await.unwrap();
        tx.save_raw(&raw("https://example.com/a", "body")).await.unwrap();
        tx.save_domain(&aggregate("example.com", ContactSet::default(), 1))
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(db.get_raw_crawl("https://example.com/a").await.unwrap(), None);
        assert_eq!(db.load_domain("example.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_raw_crawl_upsert_by_url() {
        let (db, _temp_dir) = setup_test_db().await.unwrap();

        for body in ["first", "second"] {
            let mut tx = db.begin().await.unwrap();
            tx.save_raw(&raw("https://example.com/a", body)).await.unwrap();
            tx.commit().await.unwrap();
        }

        let stored = db.get_raw_crawl("https://example.com/a").await.unwrap().unwrap();
        assert_eq!(stored.raw_html, "second");

        let mut rows = db
            .execute_query("SELECT COUNT(*) FROM raw_crawls", params![])
            .await
            .unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_domain_update_keeps_single_row() {
        let (db, _temp_dir) = setup_test_db().await.unwrap();

        commit_domain(&db, &aggregate("example.com", contacts(&["a@x.com"], &[]), 1)).await;
        commit_domain(
            &db,
            &aggregate("example.com", contacts(&["a@x.com", "b@x.com"], &[]), 2),
        )
        .await;

        let stored = db.load_domain("example.com").await.unwrap().unwrap();
        assert_eq!(stored.url_count, 2);
        assert_eq!(stored.aggregated_contacts.emails.len(), 2);
        assert_eq!(db.stats().await.unwrap().domains_processed, 1);
    }

    #[tokio::test]
    async fn test_stats() {
        let (db, _temp_dir) = setup_test_db().await.unwrap();
        assert_eq!(db.stats().await.unwrap(), CrawlStats::default());

        commit_domain(&db, &aggregate("a.com", ContactSet::default(), 1)).await;
        commit_domain(&db, &aggregate("b.com", ContactSet::default(), 1)).await;

        let stats = db.stats().await.unwrap();
        assert_eq!(stats.domains_processed, 2);
        assert_eq!(stats.urls_crawled, 0);
    }

    #[tokio::test]
    async fn test_query_contacts() {
        let (db, _temp_dir) = setup_test_db().await.unwrap();

        commit_domain(&db, &aggregate("empty.com", ContactSet::default(), 1)).await;
        commit_domain(
            &db,
            &aggregate(
                "tcs.com",
                contacts(&["a@tcs.com", "b@tcs.com", "c@tcs.com", "d@tcs.com"], &["9876543210"]),
                3,
            ),
        )
        .await;
        let mut named = aggregate("infosys.com", contacts(&[], &["9123456789"]), 1);
        named.company_name = Some("Infosys".to_string());
        commit_domain(&db, &named).await;

        let results = db.query_contacts(10).await.unwrap();
        assert_eq!(results.len(), 2);

        assert_eq!(results[0].domain, "tcs.com");
        assert_eq!(results[0].company_name, "tcs.com");
        assert_eq!(results[0].contacts.emails.len(), 3);
        assert_eq!(results[0].url_count, 3);
        assert_eq!(results[0].confidence, 0.8);

        assert_eq!(results[1].company_name, "Infosys");
        assert!(results[1].contacts.emails.is_empty());

        let limited = db.query_contacts(1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].domain, "tcs.com");
    }
}
