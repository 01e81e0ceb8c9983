//! Vector index capability
//!
//! The embedding store contract the core depends on: batch add, batch
//! delete, nearest-neighbor search with a score threshold, and point-id
//! listing for orphan reconciliation. Implementations: Qdrant for
//! production, an in-memory cosine index for tests and offline use.

mod memory;
mod payload;
mod qdrant;

pub use memory::*;
pub use payload::*;
pub use qdrant::*;

use crate::error::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Search result
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: String,
    pub score: f32,
    pub payload: ChunkPayload,
}

/// Search filter options
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub category: Option<String>,
    pub document_id: Option<String>,
}

impl SearchFilter {
    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.document_id.is_none()
    }

    /// Client-side check used by the in-memory index
    pub fn matches(&self, payload: &ChunkPayload) -> bool {
        if let Some(ref category) = self.category {
            if &payload.category != category {
                return false;
            }
        }
        if let Some(ref document_id) = self.document_id {
            if &payload.document_id != document_id {
                return false;
            }
        }
        true
    }
}

/// Capability trait for the embedding store
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Make sure the backing collection exists and matches the expected
    /// dimension
    async fn ensure_ready(&self) -> Result<()>;

    /// Upsert a batch of points
    async fn add(&self, points: Vec<ChunkPoint>) -> Result<()>;

    /// Delete a batch of points by id, tolerating already-absent ids
    async fn delete(&self, point_ids: &[Uuid]) -> Result<()>;

    /// Nearest-neighbor search; results are ordered by descending score and
    /// already filtered by the threshold
    async fn search(
        &self,
        query_vector: Vec<f32>,
        top_k: usize,
        threshold: f32,
        filter: Option<SearchFilter>,
    ) -> Result<Vec<SearchResult>>;

    /// List every point id in the index (orphan reconciliation)
    async fn list_point_ids(&self) -> Result<Vec<Uuid>>;

    /// Number of stored points
    async fn count(&self) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(category: &str, document_id: &str) -> ChunkPayload {
        ChunkPayload::new(
            document_id.to_string(),
            "doc.md".to_string(),
            category.to_string(),
            0,
            "hash".to_string(),
            "2024-01-01T00:00:00Z".to_string(),
        )
    }

    #[test]
    fn test_filter_matches() {
        let filter = SearchFilter {
            category: Some("general".to_string()),
            document_id: None,
        };

        assert!(filter.matches(&payload("general", "d1")));
        assert!(!filter.matches(&payload("tarifs", "d1")));
        assert!(SearchFilter::default().matches(&payload("tarifs", "d1")));
    }
}
