//! Similarity retrieval and context assembly
//!
//! Embeds the user query, searches the vector index above a similarity
//! threshold, enriches hits with chunk text from the metadata store, and
//! assembles the numbered context block fed to the model. Retrieval never
//! fails the caller: an unreachable index or embedding backend degrades to
//! an empty result.

use crate::config::RetrievalConfig;
use crate::embed::Embedder;
use crate::meta::MetaDb;
use crate::vector::{SearchFilter, VectorIndex};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sentinel returned by [`RetrievalEngine::build_context`] when nothing was
/// retrieved
pub const NO_CONTEXT_SENTINEL: &str = "Aucun document pertinent trouvé.";

/// A retrieved chunk with its similarity score
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub content: String,
    pub score: f32,
    pub document_id: String,
    pub filename: String,
}

/// Retrieval engine over the vector index and metadata store
pub struct RetrievalEngine {
    db: MetaDb,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(
        db: MetaDb,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            db,
            index,
            embedder,
            config,
        }
    }

    /// Retrieve the most relevant chunks for a query.
    ///
    /// Results are ordered by descending similarity and capped at `top_k`.
    /// Empty output means no ingested content cleared the threshold; callers
    /// must treat that as "nothing to ground on", not as a fault.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: Option<usize>,
        category: Option<&str>,
    ) -> Vec<RetrievedChunk> {
        let k = top_k.unwrap_or(self.config.top_k);
        debug!("Retrieving top {} chunks for query", k);

        let query_vector = match self.embedder.embed(vec![query.to_string()]).await {
            Ok(mut vectors) if !vectors.is_empty() => vectors.remove(0),
            Ok(_) => {
                warn!("Embedding backend returned no vector for query");
                return Vec::new();
            }
            Err(e) => {
                warn!("Query embedding failed, returning no context: {}", e);
                return Vec::new();
            }
        };

        let filter = category.map(|c| SearchFilter {
            category: Some(c.to_string()),
            document_id: None,
        });

        let results = match self
            .index
            .search(query_vector, k, self.config.similarity_threshold, filter)
            .await
        {
            Ok(results) => results,
            Err(e) => {
                warn!("Vector search failed, returning no context: {}", e);
                return Vec::new();
            }
        };

        let mut retrieved = Vec::with_capacity(results.len());
        for result in results {
            match self.db.get_chunk_by_point_id(&result.id).await {
                Ok(Some(chunk)) => retrieved.push(RetrievedChunk {
                    content: chunk.content,
                    score: result.score,
                    document_id: chunk.document_id,
                    filename: result.payload.filename,
                }),
                Ok(None) => {
                    warn!("Index point {} has no chunk row, skipping", result.id);
                }
                Err(e) => {
                    warn!("Chunk lookup failed for point {}: {}", result.id, e);
                }
            }
        }

        info!("Found {} relevant chunks", retrieved.len());
        retrieved
    }

    /// Assemble the numbered context block from retrieved chunks. The fixed
    /// sentinel is returned for an empty sequence, never an empty string.
    pub fn build_context(chunks: &[RetrievedChunk]) -> String {
        if chunks.is_empty() {
            return NO_CONTEXT_SENTINEL.to_string();
        }

        let mut context = String::from("Contexte basé sur les documents de la banque:\n\n");
        for (i, chunk) in chunks.iter().enumerate() {
            context.push_str(&format!("Document {}:\n{}\n\n", i + 1, chunk.content));
        }

        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::{Error, Result};
    use crate::meta::{Chunk, Document, MetaDb};
    use crate::vector::{ChunkPayload, ChunkPoint, InMemoryIndex};
    use async_trait::async_trait;
    use tempfile::TempDir;
    use uuid::Uuid;

    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .into_iter()
                .map(|t| {
                    if t.to_lowercase().contains("virement") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "axis-stub"
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        async fn embed(&self, _texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            Err(Error::Embedding("unreachable".to_string()))
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "broken-stub"
        }
    }

    async fn seed_chunk(
        db: &MetaDb,
        index: &InMemoryIndex,
        content: &str,
        category: &str,
        vector: Vec<f32>,
    ) {
        let doc = Document::new(
            format!("{}.md", Uuid::new_v4()),
            "/tmp/doc.md".to_string(),
            category.to_string(),
            None,
            0,
        );
        db.insert_document(&doc).await.unwrap();

        let chunk = Chunk::new(
            doc.id.clone(),
            0,
            content.to_string(),
            10,
            None,
            Uuid::new_v4().to_string(),
            "local_text".to_string(),
        );
        db.insert_chunks(std::slice::from_ref(&chunk)).await.unwrap();

        index
            .add(vec![ChunkPoint {
                id: Uuid::parse_str(&chunk.point_id).unwrap(),
                vector,
                payload: ChunkPayload::new(
                    doc.id,
                    doc.filename,
                    category.to_string(),
                    0,
                    chunk.chunk_hash,
                    "2024-01-01T00:00:00Z".to_string(),
                ),
            }])
            .await
            .unwrap();
    }

    async fn test_engine(
        embedder: Arc<dyn Embedder>,
    ) -> (TempDir, RetrievalEngine, Arc<InMemoryIndex>, MetaDb) {
        let dir = TempDir::new().unwrap();
        let db = MetaDb::new(&dir.path().join("meta.db")).await.unwrap();
        db.init_schema().await.unwrap();
        let index = Arc::new(InMemoryIndex::new());
        let engine = RetrievalEngine::new(
            db.clone(),
            index.clone(),
            embedder,
            Config::default().retrieval,
        );
        (dir, engine, index, db)
    }

    #[tokio::test]
    async fn test_retrieve_returns_matching_chunk() {
        let (_dir, engine, index, db) = test_engine(Arc::new(AxisEmbedder)).await;
        seed_chunk(&db, &index, "Un virement SEPA prend 24h.", "general", vec![1.0, 0.0]).await;
        seed_chunk(&db, &index, "Horaires des agences.", "general", vec![0.0, 1.0]).await;

        let chunks = engine.retrieve("Délai d'un virement ?", None, None).await;

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.contains("SEPA"));
        assert!(chunks[0].score >= 0.7);
    }

    #[tokio::test]
    async fn test_empty_store_returns_empty_and_sentinel() {
        let (_dir, engine, _index, _db) = test_engine(Arc::new(AxisEmbedder)).await;

        let chunks = engine.retrieve("question sans rapport", None, None).await;
        assert!(chunks.is_empty());

        let context = RetrievalEngine::build_context(&chunks);
        assert_eq!(context, NO_CONTEXT_SENTINEL);
        assert!(!context.is_empty());
    }

    #[tokio::test]
    async fn test_below_threshold_excluded() {
        let (_dir, engine, index, db) = test_engine(Arc::new(AxisEmbedder)).await;
        // Orthogonal to any "virement" query: similarity 0.0 < 0.7
        seed_chunk(&db, &index, "Horaires des agences.", "general", vec![0.0, 1.0]).await;

        let chunks = engine.retrieve("virement", None, None).await;
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn test_category_filter_restricts_results() {
        let (_dir, engine, index, db) = test_engine(Arc::new(AxisEmbedder)).await;
        seed_chunk(&db, &index, "Virement: frais généraux.", "general", vec![1.0, 0.0]).await;
        seed_chunk(&db, &index, "Virement: grille tarifaire.", "tarifs", vec![1.0, 0.0]).await;

        let chunks = engine.retrieve("virement", None, Some("tarifs")).await;

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.contains("tarifaire"));
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_to_empty() {
        let (_dir, engine, index, db) = test_engine(Arc::new(BrokenEmbedder)).await;
        seed_chunk(&db, &index, "Un virement SEPA prend 24h.", "general", vec![1.0, 0.0]).await;

        let chunks = engine.retrieve("virement", None, None).await;
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_build_context_numbers_chunks() {
        let chunks = vec![
            RetrievedChunk {
                content: "Premier extrait.".into(),
                score: 0.9,
                document_id: "d1".into(),
                filename: "a.md".into(),
            },
            RetrievedChunk {
                content: "Second extrait.".into(),
                score: 0.8,
                document_id: "d2".into(),
                filename: "b.md".into(),
            },
        ];

        let context = RetrievalEngine::build_context(&chunks);
        assert!(context.starts_with("Contexte basé sur les documents de la banque:"));
        assert!(context.contains("Document 1:\nPremier extrait."));
        assert!(context.contains("Document 2:\nSecond extrait."));
    }
}
