//! No-op graph backend

use async_trait::async_trait;
use tracing::debug;

use super::{EntityObservation, GraphStats, GraphStore};
use crate::store::DbError;

/// Graph backend selected when no graph storage is configured
///
/// Upserts succeed without storing anything and stats are always zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGraph;

#[async_trait]
impl GraphStore for DisabledGraph {
    async fn upsert_entity(&self, entity: &EntityObservation) -> Result<String, DbError> {
        debug!(name = %entity.name, "Graph disabled, dropping entity");
        Ok(entity.name.clone())
    }

    async fn stats(&self) -> Result<GraphStats, DbError> {
        Ok(GraphStats::default())
    }
}
