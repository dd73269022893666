//! LibSQL entity graph backend

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Row, params};
use tracing::{debug, instrument};

use super::{EntityObservation, EntityRecord, GraphStats, GraphStore};
use crate::store::DbError;

/// Entity graph stored in LibSQL
#[derive(Clone)]
pub struct LibsqlGraph {
    conn: Connection,
}

impl LibsqlGraph {
    /// Create a graph backend on an open connection
    #[instrument(skip(conn))]
    pub async fn new(conn: Connection) -> Result<Self, DbError> {
        initialize_schema(&conn).await?;

        Ok(Self { conn })
    }

    /// Create a graph backend from a database path
    pub async fn new_from_path(path: &str) -> Result<Self, DbError> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DbError::Connection(format!("Failed to open graph database: {}", e)))?;

        let conn = db.connect().map_err(|e| {
            DbError::Connection(format!("Failed to connect to graph database: {}", e))
        })?;

        Self::new(conn).await
    }

    /// Get a stored entity by key
    pub async fn get_entity(
        &self,
        name: &str,
        entity_type: &str,
    ) -> Result<Option<EntityRecord>, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT name, type, source_url, evidence_count, created_at, updated_at
                 FROM entities
                 WHERE name = ? AND type = ?",
                params![name, entity_type],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to get entity: {}", e)))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_entity(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DbError::Data(format!("Failed to get entity: {}", e))),
        }
    }

    async fn count(&self, table: &str) -> Result<i64, DbError> {
        let mut rows = self
            .conn
            .query(&format!("SELECT COUNT(*) FROM {}", table), params![])
            .await
            .map_err(|e| DbError::Query(format!("Failed to count {}: {}", table, e)))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get(0)
                .map_err(|e| DbError::Data(format!("Failed to get count of {}: {}", table, e))),
            Ok(None) => Ok(0),
            Err(e) => Err(DbError::Data(format!("Failed to count {}: {}", table, e))),
        }
    }
}

#[async_trait]
impl GraphStore for LibsqlGraph {
    async fn upsert_entity(&self, entity: &EntityObservation) -> Result<String, DbError> {
        let now = Utc::now().timestamp_millis();

        // A single conditional statement, so the increment never races
        self.conn
            .execute(
                "INSERT INTO entities (name, type, source_url, evidence_count, created_at, updated_at)
                 VALUES (?, ?, ?, 1, ?, ?)
                 ON CONFLICT(name, type) DO UPDATE SET
                 evidence_count = entities.evidence_count + 1,
                 source_url = excluded.source_url,
                 updated_at = MAX(entities.updated_at, excluded.updated_at)",
                params![
                    entity.name.as_str(),
                    entity.entity_type.as_str(),
                    entity.source_url.as_str(),
                    now,
                    now,
                ],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to upsert entity: {}", e)))?;

        debug!(name = %entity.name, entity_type = %entity.entity_type, "Upserted entity");
        Ok(entity.name.clone())
    }

    async fn stats(&self) -> Result<GraphStats, DbError> {
        Ok(GraphStats {
            entities: self.count("entities").await?,
            relationships: self.count("relationships").await?,
        })
    }
}

/// Initialize the graph schema
async fn initialize_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS entities (
            name TEXT NOT NULL,
            type TEXT NOT NULL,
            source_url TEXT NOT NULL,
            evidence_count INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (name, type)
        )",
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create entities table: {}", e)))?;

    // Edges are written by other tools; this crate only counts them
    conn.execute(
        "CREATE TABLE IF NOT EXISTS relationships (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_name TEXT NOT NULL,
            source_type TEXT NOT NULL,
            target_name TEXT NOT NULL,
            target_type TEXT NOT NULL,
            kind TEXT NOT NULL,
            source_url TEXT,
            created_at INTEGER NOT NULL
        )",
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create relationships table: {}", e)))?;

    Ok(())
}

fn from_millis(millis: i64, column: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| DbError::Data(format!("Invalid {} timestamp: {}", column, millis)))
}

/// Convert a database row to an EntityRecord
fn row_to_entity(row: &Row) -> Result<EntityRecord, DbError> {
    let created_at: i64 = row
        .get(4)
        .map_err(|e| DbError::Data(format!("Failed to get created_at: {}", e)))?;
    let updated_at: i64 = row
        .get(5)
        .map_err(|e| DbError::Data(format!("Failed to get updated_at: {}", e)))?;

    Ok(EntityRecord {
        name: row
            .get(0)
            .map_err(|e| DbError::Data(format!("Failed to get name: {}", e)))?,
        entity_type: row
            .get(1)
            .map_err(|e| DbError::Data(format!("Failed to get type: {}", e)))?,
        source_url: row
            .get(2)
            .map_err(|e| DbError::Data(format!("Failed to get source_url: {}", e)))?,
        evidence_count: row
            .get(3)
            .map_err(|e| DbError::Data(format!("Failed to get evidence_count: {}", e)))?,
        created_at: from_millis(created_at, "created_at")?,
        updated_at: from_millis(updated_at, "updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use futures::future;
    use tempfile::tempdir;

    async fn setup_test_graph() -> (LibsqlGraph, tempfile::TempDir) {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir
            .path()
            .join("graph.db")
            .to_string_lossy()
            .to_string();

        let graph = LibsqlGraph::new_from_path(&path).await.unwrap();
        (graph, temp_dir)
    }

    fn observe(name: &str, source_url: &str) -> EntityObservation {
        EntityObservation {
            name: name.to_string(),
            entity_type: "ORG".to_string(),
            source_url: source_url.to_string(),
        }
    }

    #[tokio::test]
    async fn test_first_upsert_inserts() {
        let (graph, _temp_dir) = setup_test_graph().await;

        let key = graph
            .upsert_entity(&observe("Tata", "https://www.tatasteel.com"))
            .await
            .unwrap();
        assert_eq!(key, "Tata");

        let entity = graph.get_entity("Tata", "ORG").await.unwrap().unwrap();
        assert_eq!(entity.evidence_count, 1);
        assert_eq!(entity.source_url, "https://www.tatasteel.com");
        assert_eq!(entity.created_at, entity.updated_at);
    }

    #[tokio::test]
    async fn test_repeated_upserts_count_evidence() {
        let (graph, _temp_dir) = setup_test_graph().await;

        graph.upsert_entity(&observe("Infosys", "https://a.example")).await.unwrap();
        let first = graph.get_entity("Infosys", "ORG").await.unwrap().unwrap();

        let mut previous_updated = first.updated_at;
        for k in 2..=5 {
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            graph.upsert_entity(&observe("Infosys", "https://b.example")).await.unwrap();

            let entity = graph.get_entity("Infosys", "ORG").await.unwrap().unwrap();
            assert_eq!(entity.evidence_count, k);
            assert_eq!(entity.created_at, first.created_at);
            assert!(entity.updated_at >= previous_updated);
            previous_updated = entity.updated_at;
        }

        let entity = graph.get_entity("Infosys", "ORG").await.unwrap().unwrap();
        assert_eq!(entity.source_url, "https://b.example");
        assert_eq!(graph.stats().await.unwrap().entities, 1);
    }

    #[tokio::test]
    async fn test_type_is_part_of_key() {
        let (graph, _temp_dir) = setup_test_graph().await;

        graph.upsert_entity(&observe("Jordan", "https://a.example")).await.unwrap();
        graph
            .upsert_entity(&EntityObservation {
                entity_type: "PERSON".to_string(),
                ..observe("Jordan", "https://a.example")
            })
            .await
            .unwrap();

        assert_eq!(graph.stats().await.unwrap().entities, 2);
        assert_eq!(
            graph.get_entity("Jordan", "PERSON").await.unwrap().unwrap().evidence_count,
            1
        );
    }

    #[tokio::test]
    async fn test_concurrent_upserts_do_not_lose_counts() {
        let (graph, _temp_dir) = setup_test_graph().await;

        let tasks = (0..20).map(|i| {
            let graph = graph.clone();
            async move {
                graph
                    .upsert_entity(&observe("Britannia", &format!("https://example.com/{}", i)))
                    .await
            }
        });

        for result in future::join_all(tasks).await {
            result.unwrap();
        }

        let entity = graph.get_entity("Britannia", "ORG").await.unwrap().unwrap();
        assert_eq!(entity.evidence_count, 20);
    }

    #[tokio::test]
    async fn test_stats_on_empty_graph() {
        let (graph, _temp_dir) = setup_test_graph().await;
        assert_eq!(graph.stats().await.unwrap(), GraphStats::default());
        assert!(graph.get_entity("Nobody", "ORG").await.unwrap().is_none());
    }
}
