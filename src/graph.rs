//! # Entity Graph Module
//!
//! A shared store of entity nodes keyed by `(name, type)`. Every observation of
//! an entity increments its evidence counter by one; repeated observations
//! never create a second record.
//!
//! ## Key Components
//!
//! - [`GraphStore`]: backend interface (`upsert_entity`, `stats`)
//! - [`LibsqlGraph`]: LibSQL backend with a single-statement atomic upsert
//! - [`DisabledGraph`]: explicit no-op backend for runs without a graph
//! - [`EntityGraphStore`]: the handle the crawler uses; it never fails, it
//!   logs backend errors and falls back to echoing the entity name
//!
//! Relationship edges are stored in their own table by the backend but are
//! only counted, never merged.

mod disabled;
mod libsql_graph;

pub use disabled::DisabledGraph;
pub use libsql_graph::LibsqlGraph;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::DbError;

/// One observation of an entity on a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityObservation {
    pub name: String,

    #[serde(rename = "type")]
    pub entity_type: String,

    /// URL the entity was seen on
    pub source_url: String,
}

/// A stored entity node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub name: String,

    #[serde(rename = "type")]
    pub entity_type: String,

    /// URL of the most recent observation
    pub source_url: String,

    /// Number of observations since creation
    pub evidence_count: i64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Counts over the graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub entities: i64,
    pub relationships: i64,
}

/// Backend for the entity graph
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Insert the entity or bump its evidence count; returns the entity key
    ///
    /// Must be atomic per `(name, type)` so concurrent observations of the
    /// same entity never lose an increment.
    async fn upsert_entity(&self, entity: &EntityObservation) -> Result<String, DbError>;

    async fn stats(&self) -> Result<GraphStats, DbError>;
}

/// Best-effort entity graph handle used by the crawler
#[derive(Clone)]
pub struct EntityGraphStore {
    backend: Arc<dyn GraphStore>,
}

impl std::fmt::Debug for EntityGraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityGraphStore").finish_non_exhaustive()
    }
}

impl EntityGraphStore {
    pub fn new(backend: Arc<dyn GraphStore>) -> Self {
        Self { backend }
    }

    /// A store that records nothing
    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledGraph))
    }

    /// Record one observation of `(name, entity_type)` seen on `source_url`
    ///
    /// Backend failures are logged and the input name is returned as the key.
    pub async fn upsert(&self, name: &str, entity_type: &str, source_url: &str) -> String {
        let observation = EntityObservation {
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            source_url: source_url.to_string(),
        };

        match self.backend.upsert_entity(&observation).await {
            Ok(key) => key,
            Err(e) => {
                warn!(name, entity_type, error = %e, "Entity upsert failed");
                observation.name
            }
        }
    }

    /// Entity and relationship counts
    pub async fn stats(&self) -> Result<GraphStats, DbError> {
        self.backend.stats().await
    }
}
