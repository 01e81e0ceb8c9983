//! Document ingestion pipeline
//!
//! Orchestrates extraction, chunking, embedding-store writes, and durable
//! chunk metadata, tracking per-document processing status through
//! `pending → extracting → chunking → embedding → metadata_persisted →
//! processed`, with `failed` reachable from any step. Deletion runs
//! embedding-store-first, then chunk rows, then the document row, and is
//! idempotent.

use crate::chunk::{chunk_units, compute_content_hash};
use crate::config::Config;
use crate::embed::{embed_in_batches, Embedder};
use crate::error::{Error, Result};
use crate::extract::{extract_document, DocumentAnalyzer, DocumentKind};
use crate::meta::{Chunk, Document, DocumentStatus, MetaDb};
use crate::vector::{ChunkPayload, ChunkPoint, VectorIndex};
use chrono::Utc;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

/// Ingestion pipeline over the metadata store, the vector index, and the
/// embedding backend
pub struct IngestionPipeline {
    db: MetaDb,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    analyzer: Option<Arc<dyn DocumentAnalyzer>>,
    config: Config,
}

/// Outcome of a directory ingestion sweep
#[derive(Debug, Default)]
pub struct DirectoryIngestStats {
    pub ingested: Vec<String>,
    pub skipped: usize,
    pub errors: Vec<String>,
}

impl IngestionPipeline {
    pub fn new(
        db: MetaDb,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        analyzer: Option<Arc<dyn DocumentAnalyzer>>,
        config: Config,
    ) -> Self {
        Self {
            db,
            index,
            embedder,
            analyzer,
            config,
        }
    }

    /// Ingest a document from disk. Returns the document id.
    ///
    /// With `force=false`, a document already processed under the same
    /// filename and category is not re-processed; its existing id is
    /// returned. With `force=true` the prior document is deleted first.
    pub async fn ingest(
        &self,
        path: &Path,
        category: &str,
        description: Option<String>,
        force: bool,
    ) -> Result<String> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Ingestion(format!("Invalid path: {}", path.display())))?
            .to_string();

        info!("Starting ingestion of {} (category {})", filename, category);

        if let Some(existing) = self.db.find_document_by_name(&filename, category).await? {
            if existing.processed && !force {
                info!(
                    "Document {} already processed as {}, skipping",
                    filename, existing.id
                );
                return Ok(existing.id);
            }
            // Forced re-ingestion, or the leftovers of a failed attempt
            info!("Re-ingesting {}: deleting prior document {}", filename, existing.id);
            self.delete(&existing.id).await?;
        }

        let kind = DocumentKind::from_path(path)
            .map_err(|e| Error::Ingestion(e.to_string()))?;
        let size_bytes = std::fs::metadata(path).map(|m| m.len() as i64).unwrap_or(0);

        let doc = Document::new(
            filename.clone(),
            path.display().to_string(),
            category.to_string(),
            description,
            size_bytes,
        );
        let document_id = doc.id.clone();
        self.db.insert_document(&doc).await?;

        match self.run_pipeline(path, kind, &doc).await {
            Ok(chunk_count) => {
                self.db
                    .mark_document_processed(&document_id, chunk_count)
                    .await?;
                info!(
                    "Successfully ingested {} as {} ({} chunks)",
                    filename, document_id, chunk_count
                );
                Ok(document_id)
            }
            Err(e) => {
                let note = e.to_string();
                self.db
                    .set_document_status(&document_id, DocumentStatus::Failed, Some(&note))
                    .await?;
                Err(Error::Ingestion(note))
            }
        }
    }

    async fn run_pipeline(&self, path: &Path, kind: DocumentKind, doc: &Document) -> Result<i64> {
        // Extract
        self.db
            .set_document_status(&doc.id, DocumentStatus::Extracting, None)
            .await?;
        let units = extract_document(path, kind, self.analyzer.as_deref()).await?;
        if units.iter().all(|u| u.content.trim().is_empty()) {
            return Err(Error::Extraction(format!(
                "No text content in {}",
                doc.filename
            )));
        }

        // Chunk
        self.db
            .set_document_status(&doc.id, DocumentStatus::Chunking, None)
            .await?;
        let bytes = std::fs::read(path)?;
        let doc_hash = compute_content_hash(&bytes);
        let text_chunks = chunk_units(&units, &doc_hash, &self.config.chunk)?;
        if text_chunks.is_empty() {
            return Err(Error::Ingestion(format!(
                "Chunking produced no chunks for {}",
                doc.filename
            )));
        }

        // Build the chunk rows first so point ids are fixed before any write
        let rows: Vec<Chunk> = text_chunks
            .iter()
            .map(|c| {
                Chunk::new(
                    doc.id.clone(),
                    c.chunk_index as i64,
                    c.text.clone(),
                    c.token_estimate as i64,
                    c.metadata.page_number.map(|p| p as i64),
                    c.hash.clone(),
                    c.metadata.backend.to_string(),
                )
            })
            .collect();

        // Embed and write the whole batch to the index
        self.db
            .set_document_status(&doc.id, DocumentStatus::Embedding, None)
            .await?;
        let texts: Vec<String> = text_chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = embed_in_batches(
            self.embedder.as_ref(),
            texts,
            self.config.embedding.batch_size,
        )
        .await?;

        if embeddings.len() != rows.len() {
            return Err(Error::Embedding(format!(
                "Expected {} embeddings, got {}",
                rows.len(),
                embeddings.len()
            )));
        }

        let now = Utc::now().to_rfc3339();
        let points: Vec<ChunkPoint> = rows
            .iter()
            .zip(embeddings.into_iter())
            .map(|(row, vector)| {
                let mut payload = ChunkPayload::new(
                    doc.id.clone(),
                    doc.filename.clone(),
                    doc.category.clone(),
                    row.chunk_index as i32,
                    row.chunk_hash.clone(),
                    now.clone(),
                );
                payload.page_number = row.page_number;

                ChunkPoint {
                    id: Uuid::parse_str(&row.point_id).unwrap_or_else(|_| Uuid::new_v4()),
                    vector,
                    payload,
                }
            })
            .collect();

        let point_ids: Vec<Uuid> = points.iter().map(|p| p.id).collect();
        self.index.add(points).await?;

        // Persist chunk metadata; roll the index batch back if this fails so
        // no half-written document survives
        self.db
            .set_document_status(&doc.id, DocumentStatus::MetadataPersisted, None)
            .await?;
        if let Err(e) = self.db.insert_chunks(&rows).await {
            warn!("Chunk metadata write failed, removing index batch: {}", e);
            if let Err(cleanup) = self.index.delete(&point_ids).await {
                warn!("Index cleanup after failed metadata write also failed: {}", cleanup);
            }
            return Err(e);
        }

        Ok(rows.len() as i64)
    }

    /// Delete a document, its chunks, and their index entries, in that
    /// reverse-ownership order. Tolerates already-absent state at each step.
    pub async fn delete(&self, document_id: &str) -> Result<()> {
        info!("Deleting document {}", document_id);

        let chunks = self.db.get_chunks(document_id).await?;
        let point_ids: Vec<Uuid> = chunks
            .iter()
            .filter_map(|c| Uuid::parse_str(&c.point_id).ok())
            .collect();

        self.index.delete(&point_ids).await?;
        self.db.delete_chunks(document_id).await?;
        self.db.delete_document(document_id).await?;

        Ok(())
    }

    /// Remove index points that no chunk row references
    pub async fn prune_orphans(&self) -> Result<usize> {
        let indexed = self.index.list_point_ids().await?;
        let referenced: HashSet<String> = self.db.all_point_ids().await?.into_iter().collect();

        let orphans: Vec<Uuid> = indexed
            .into_iter()
            .filter(|id| !referenced.contains(&id.to_string()))
            .collect();

        if orphans.is_empty() {
            return Ok(0);
        }

        warn!("Pruning {} orphaned index points", orphans.len());
        self.index.delete(&orphans).await?;
        Ok(orphans.len())
    }

    /// Ingest every PDF/Markdown file under a directory, continuing past
    /// per-file failures
    pub async fn ingest_directory(
        &self,
        dir: &Path,
        category: &str,
        force: bool,
    ) -> Result<DirectoryIngestStats> {
        let mut stats = DirectoryIngestStats::default();

        for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !entry.file_type().is_file() || DocumentKind::from_path(path).is_err() {
                stats.skipped += 1;
                continue;
            }

            match self.ingest(path, category, None, force).await {
                Ok(id) => stats.ingested.push(id),
                Err(e) => {
                    warn!("Failed to ingest {}: {}", path.display(), e);
                    stats.errors.push(format!("{}: {}", path.display(), e));
                }
            }
        }

        info!(
            "Directory ingestion finished: {} ingested, {} skipped, {} errors",
            stats.ingested.len(),
            stats.skipped,
            stats.errors.len()
        );
        Ok(stats)
    }

    /// List all documents
    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        self.db.list_documents().await
    }

    /// List documents in a category
    pub async fn list_documents_by_category(&self, category: &str) -> Result<Vec<Document>> {
        self.db.list_documents_by_category(category).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::InMemoryIndex;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Embedder that flags transfer-related text on one axis
    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
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
            "stub"
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            Err(Error::Embedding("backend unreachable".to_string()))
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "failing-stub"
        }
    }

    async fn test_pipeline(embedder: Arc<dyn Embedder>) -> (TempDir, IngestionPipeline, Arc<InMemoryIndex>) {
        let dir = TempDir::new().unwrap();
        let db = MetaDb::new(&dir.path().join("meta.db")).await.unwrap();
        db.init_schema().await.unwrap();

        let index = Arc::new(InMemoryIndex::new());
        let mut config = Config::default();
        config.embedding.dimension = 2;

        let pipeline = IngestionPipeline::new(db, index.clone(), embedder, None, config);
        (dir, pipeline, index)
    }

    fn write_doc(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_ingest_markdown_document() {
        let (dir, pipeline, index) = test_pipeline(Arc::new(StubEmbedder)).await;
        let path = write_doc(&dir, "virements.md", "# Virements\n\nUn virement SEPA prend 24h.");

        let id = pipeline
            .ingest(&path, "general", Some("notice".into()), false)
            .await
            .unwrap();

        let doc = pipeline.db.get_document(&id).await.unwrap().unwrap();
        assert!(doc.processed);
        assert_eq!(doc.get_status().unwrap(), DocumentStatus::Processed);
        assert_eq!(doc.chunk_count, 1);

        let chunks = pipeline.db.get_chunks(&id).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reingestion_is_idempotent() {
        let (dir, pipeline, index) = test_pipeline(Arc::new(StubEmbedder)).await;
        let path = write_doc(&dir, "faq.md", "Les virements sont gratuits en zone SEPA.");

        let first = pipeline.ingest(&path, "general", None, false).await.unwrap();
        let second = pipeline.ingest(&path, "general", None, false).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(pipeline.db.get_chunks(&first).await.unwrap().len(), 1);
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_force_reingestion_replaces_document() {
        let (dir, pipeline, index) = test_pipeline(Arc::new(StubEmbedder)).await;
        let path = write_doc(&dir, "faq.md", "Les virements sont gratuits en zone SEPA.");

        let first = pipeline.ingest(&path, "general", None, false).await.unwrap();
        let second = pipeline.ingest(&path, "general", None, true).await.unwrap();

        assert_ne!(first, second);
        assert!(pipeline.db.get_document(&first).await.unwrap().is_none());
        assert_eq!(pipeline.db.get_chunks(&second).await.unwrap().len(), 1);
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_embedding_failure_marks_document_failed() {
        let (dir, pipeline, index) = test_pipeline(Arc::new(FailingEmbedder)).await;
        let path = write_doc(&dir, "faq.md", "Texte du document.");

        let err = pipeline.ingest(&path, "general", None, false).await;
        assert!(matches!(err, Err(Error::Ingestion(_))));

        let docs = pipeline.db.list_documents().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get_status().unwrap(), DocumentStatus::Failed);
        assert!(docs[0].error_note.is_some());
        assert!(!docs[0].processed);

        // No chunk rows and no index entries survive the failure
        assert!(pipeline.db.get_chunks(&docs[0].id).await.unwrap().is_empty());
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_pdf_marks_document_failed() {
        let (dir, pipeline, _index) = test_pipeline(Arc::new(StubEmbedder)).await;
        let path = write_doc(&dir, "broken.pdf", "not actually a pdf");

        let err = pipeline.ingest(&path, "general", None, false).await;
        assert!(err.is_err());

        let docs = pipeline.db.list_documents().await.unwrap();
        assert_eq!(docs[0].get_status().unwrap(), DocumentStatus::Failed);
    }

    #[tokio::test]
    async fn test_retry_after_failure_succeeds() {
        let (dir, failing, _index) = test_pipeline(Arc::new(FailingEmbedder)).await;
        let path = write_doc(&dir, "faq.md", "Texte du document sur les virements.");

        assert!(failing.ingest(&path, "general", None, false).await.is_err());

        // Same store, working embedder: the failed attempt must not block
        // the retry on the (filename, category) uniqueness guard
        let retry = IngestionPipeline::new(
            failing.db.clone(),
            failing.index.clone(),
            Arc::new(StubEmbedder),
            None,
            failing.config.clone(),
        );
        let id = retry.ingest(&path, "general", None, false).await.unwrap();

        let doc = retry.db.get_document(&id).await.unwrap().unwrap();
        assert!(doc.processed);
        assert_eq!(retry.db.list_documents().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_complete_and_idempotent() {
        let (dir, pipeline, index) = test_pipeline(Arc::new(StubEmbedder)).await;
        let path = write_doc(&dir, "faq.md", "Contenu du document sur les virements.");

        let id = pipeline.ingest(&path, "general", None, false).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);

        pipeline.delete(&id).await.unwrap();
        assert!(pipeline.db.get_document(&id).await.unwrap().is_none());
        assert!(pipeline.db.get_chunks(&id).await.unwrap().is_empty());
        assert_eq!(index.count().await.unwrap(), 0);

        // Second delete of the same id is a no-op
        pipeline.delete(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_prune_orphans() {
        let (dir, pipeline, index) = test_pipeline(Arc::new(StubEmbedder)).await;
        let path = write_doc(&dir, "faq.md", "Contenu du document.");
        pipeline.ingest(&path, "general", None, false).await.unwrap();

        // Simulate a failed metadata delete: an index point with no row
        index
            .add(vec![ChunkPoint {
                id: Uuid::new_v4(),
                vector: vec![0.5, 0.5],
                payload: ChunkPayload::new(
                    "ghost".into(),
                    "ghost.md".into(),
                    "general".into(),
                    0,
                    "hash".into(),
                    "2024-01-01T00:00:00Z".into(),
                ),
            }])
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 2);

        let pruned = pipeline.prune_orphans().await.unwrap();
        assert_eq!(pruned, 1);
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_directory_ingestion_continues_past_failures() {
        let (dir, pipeline, _index) = test_pipeline(Arc::new(StubEmbedder)).await;
        let docs_dir = dir.path().join("docs");
        std::fs::create_dir_all(&docs_dir).unwrap();
        std::fs::write(docs_dir.join("ok.md"), "Document valide.").unwrap();
        std::fs::write(docs_dir.join("broken.pdf"), "garbage").unwrap();
        std::fs::write(docs_dir.join("notes.txt"), "ignored").unwrap();

        let stats = pipeline
            .ingest_directory(&docs_dir, "general", false)
            .await
            .unwrap();

        assert_eq!(stats.ingested.len(), 1);
        assert_eq!(stats.errors.len(), 1);
        assert!(stats.skipped >= 1);
    }
}
