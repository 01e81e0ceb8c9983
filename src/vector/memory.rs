//! In-memory implementation of the vector index capability
//!
//! Cosine similarity over normalized vectors. Used by the test suite and
//! when running without a Qdrant instance.

use super::{ChunkPoint, SearchFilter, SearchResult, VectorIndex};
use crate::embed::normalize_embedding;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryIndex {
    points: Mutex<HashMap<Uuid, (Vec<f32>, super::ChunkPayload)>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let a = normalize_embedding(a);
    let b = normalize_embedding(b);
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn ensure_ready(&self) -> Result<()> {
        Ok(())
    }

    async fn add(&self, points: Vec<ChunkPoint>) -> Result<()> {
        let mut store = self.points.lock().await;
        for point in points {
            store.insert(point.id, (point.vector, point.payload));
        }
        Ok(())
    }

    async fn delete(&self, point_ids: &[Uuid]) -> Result<()> {
        let mut store = self.points.lock().await;
        for id in point_ids {
            store.remove(id);
        }
        Ok(())
    }

    async fn search(
        &self,
        query_vector: Vec<f32>,
        top_k: usize,
        threshold: f32,
        filter: Option<SearchFilter>,
    ) -> Result<Vec<SearchResult>> {
        let store = self.points.lock().await;

        let mut results: Vec<SearchResult> = store
            .iter()
            .filter(|(_, (_, payload))| {
                filter.as_ref().map(|f| f.matches(payload)).unwrap_or(true)
            })
            .map(|(id, (vector, payload))| SearchResult {
                id: id.to_string(),
                score: cosine_similarity(&query_vector, vector),
                payload: payload.clone(),
            })
            .filter(|r| r.score >= threshold)
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(top_k);

        Ok(results)
    }

    async fn list_point_ids(&self) -> Result<Vec<Uuid>> {
        let store = self.points.lock().await;
        Ok(store.keys().copied().collect())
    }

    async fn count(&self) -> Result<usize> {
        let store = self.points.lock().await;
        Ok(store.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::ChunkPayload;

    fn point(id: Uuid, vector: Vec<f32>, category: &str) -> ChunkPoint {
        ChunkPoint {
            id,
            vector,
            payload: ChunkPayload::new(
                "doc-1".to_string(),
                "doc.md".to_string(),
                category.to_string(),
                0,
                "hash".to_string(),
                "2024-01-01T00:00:00Z".to_string(),
            ),
        }
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let index = InMemoryIndex::new();
        let close = Uuid::new_v4();
        let far = Uuid::new_v4();

        index
            .add(vec![
                point(close, vec![1.0, 0.0], "general"),
                point(far, vec![0.0, 1.0], "general"),
            ])
            .await
            .unwrap();

        let results = index
            .search(vec![1.0, 0.1], 10, 0.0, None)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, close.to_string());
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn test_threshold_filters_results() {
        let index = InMemoryIndex::new();
        index
            .add(vec![point(Uuid::new_v4(), vec![0.0, 1.0], "general")])
            .await
            .unwrap();

        let results = index
            .search(vec![1.0, 0.0], 10, 0.7, None)
            .await
            .unwrap();

        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_category_filter() {
        let index = InMemoryIndex::new();
        index
            .add(vec![
                point(Uuid::new_v4(), vec![1.0, 0.0], "general"),
                point(Uuid::new_v4(), vec![1.0, 0.0], "tarifs"),
            ])
            .await
            .unwrap();

        let filter = SearchFilter {
            category: Some("tarifs".to_string()),
            document_id: None,
        };
        let results = index
            .search(vec![1.0, 0.0], 10, 0.5, Some(filter))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].payload.category, "tarifs");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let index = InMemoryIndex::new();
        let id = Uuid::new_v4();
        index
            .add(vec![point(id, vec![1.0, 0.0], "general")])
            .await
            .unwrap();

        index.delete(&[id]).await.unwrap();
        index.delete(&[id]).await.unwrap();

        assert_eq!(index.count().await.unwrap(), 0);
    }
}
