//! Metadata storage using SQLite
//!
//! This module handles all local metadata storage including:
//! - Documents (uploaded files and their processing state)
//! - Chunks (embedded text chunks)
//! - Sessions (conversation identity)
//! - Messages (append-only conversation history)

mod schema;

pub use schema::*;

use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Document processing states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Extracting,
    Chunking,
    Embedding,
    MetadataPersisted,
    Processed,
    Failed,
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentStatus::Pending => write!(f, "pending"),
            DocumentStatus::Extracting => write!(f, "extracting"),
            DocumentStatus::Chunking => write!(f, "chunking"),
            DocumentStatus::Embedding => write!(f, "embedding"),
            DocumentStatus::MetadataPersisted => write!(f, "metadata_persisted"),
            DocumentStatus::Processed => write!(f, "processed"),
            DocumentStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for DocumentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(DocumentStatus::Pending),
            "extracting" => Ok(DocumentStatus::Extracting),
            "chunking" => Ok(DocumentStatus::Chunking),
            "embedding" => Ok(DocumentStatus::Embedding),
            "metadata_persisted" => Ok(DocumentStatus::MetadataPersisted),
            "processed" => Ok(DocumentStatus::Processed),
            "failed" => Ok(DocumentStatus::Failed),
            _ => Err(Error::Config(format!("Unknown document status: {}", s))),
        }
    }
}

/// Message roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            _ => Err(Error::Config(format!("Unknown message role: {}", s))),
        }
    }
}

/// An uploaded document
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub storage_path: String,
    pub category: String,
    pub description: Option<String>,
    pub size_bytes: i64,
    pub status: String,
    pub error_note: Option<String>,
    pub processed: bool,
    pub processed_at: Option<String>,
    pub chunk_count: i64,
    pub uploaded_at: String,
}

impl Document {
    pub fn new(
        filename: String,
        storage_path: String,
        category: String,
        description: Option<String>,
        size_bytes: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            filename,
            storage_path,
            category,
            description,
            size_bytes,
            status: DocumentStatus::Pending.to_string(),
            error_note: None,
            processed: false,
            processed_at: None,
            chunk_count: 0,
            uploaded_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn get_status(&self) -> Result<DocumentStatus> {
        self.status.parse()
    }
}

/// A text chunk row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub point_id: String,
    pub token_count: i64,
    pub page_number: Option<i64>,
    pub chunk_hash: String,
    pub extraction_backend: String,
    pub created_at: String,
}

impl Chunk {
    pub fn new(
        document_id: String,
        chunk_index: i64,
        content: String,
        token_count: i64,
        page_number: Option<i64>,
        chunk_hash: String,
        extraction_backend: String,
    ) -> Self {
        // Derive a stable point id from the chunk hash so re-ingestion
        // upserts instead of duplicating
        let point_id = Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_hash.as_bytes()).to_string();

        Self {
            id: Uuid::new_v4().to_string(),
            document_id,
            chunk_index,
            content,
            point_id,
            token_count,
            page_number,
            chunk_hash,
            extraction_backend,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// A conversation session row. `session_id` is the external identifier;
/// several rows may share it over time but at most one is active.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Session {
    pub fn new(session_id: String, user_id: String) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            session_id,
            user_id,
            active: true,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// A conversation message row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_pk: String,
    pub role: String,
    pub content: String,
    pub has_image: bool,
    pub image_ref: Option<String>,
    pub tokens_used: Option<i64>,
    pub created_at: String,
}

impl Message {
    pub fn new(session_pk: String, role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_pk,
            role: role.to_string(),
            content,
            has_image: false,
            image_ref: None,
            tokens_used: None,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn with_image(mut self, image_ref: Option<String>) -> Self {
        self.has_image = image_ref.is_some();
        self.image_ref = image_ref;
        self
    }

    pub fn get_role(&self) -> Result<Role> {
        self.role.parse()
    }
}

/// Metadata database handle
#[derive(Clone)]
pub struct MetaDb {
    pool: SqlitePool,
}

impl MetaDb {
    /// Connect to the metadata database at the given path
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    // ===== Document Operations =====

    /// Insert a new document
    pub async fn insert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, filename, storage_path, category, description, size_bytes, status, error_note, processed, processed_at, chunk_count, uploaded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.filename)
        .bind(&doc.storage_path)
        .bind(&doc.category)
        .bind(&doc.description)
        .bind(doc.size_bytes)
        .bind(&doc.status)
        .bind(&doc.error_note)
        .bind(doc.processed)
        .bind(&doc.processed_at)
        .bind(doc.chunk_count)
        .bind(&doc.uploaded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get document by ID
    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let doc = sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(doc)
    }

    /// Find a processed document by filename and category
    pub async fn find_processed_document(
        &self,
        filename: &str,
        category: &str,
    ) -> Result<Option<Document>> {
        let doc = sqlx::query_as::<_, Document>(
            "SELECT * FROM documents WHERE filename = ? AND category = ? AND processed = 1",
        )
        .bind(filename)
        .bind(category)
        .fetch_optional(&self.pool)
        .await?;
        Ok(doc)
    }

    /// Find any document by filename and category, processed or not
    pub async fn find_document_by_name(
        &self,
        filename: &str,
        category: &str,
    ) -> Result<Option<Document>> {
        let doc = sqlx::query_as::<_, Document>(
            "SELECT * FROM documents WHERE filename = ? AND category = ?",
        )
        .bind(filename)
        .bind(category)
        .fetch_optional(&self.pool)
        .await?;
        Ok(doc)
    }

    /// List all documents
    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        let docs =
            sqlx::query_as::<_, Document>("SELECT * FROM documents ORDER BY uploaded_at DESC")
                .fetch_all(&self.pool)
                .await?;
        Ok(docs)
    }

    /// List documents in a category
    pub async fn list_documents_by_category(&self, category: &str) -> Result<Vec<Document>> {
        let docs = sqlx::query_as::<_, Document>(
            "SELECT * FROM documents WHERE category = ? ORDER BY uploaded_at DESC",
        )
        .bind(category)
        .fetch_all(&self.pool)
        .await?;
        Ok(docs)
    }

    /// Update processing status, optionally recording an error note
    pub async fn set_document_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error_note: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE documents SET status = ?, error_note = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(error_note)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Mark a document fully processed with its final chunk count
    pub async fn mark_document_processed(&self, id: &str, chunk_count: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE documents
            SET status = ?, processed = 1, processed_at = ?, chunk_count = ?, error_note = NULL
            WHERE id = ?
            "#,
        )
        .bind(DocumentStatus::Processed.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(chunk_count)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete a document row
    pub async fn delete_document(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ===== Chunk Operations =====

    /// Insert a batch of chunks atomically
    pub async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_index, content, point_id, token_count, page_number, chunk_hash, extraction_backend, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(&chunk.point_id)
            .bind(chunk.token_count)
            .bind(chunk.page_number)
            .bind(&chunk.chunk_hash)
            .bind(&chunk.extraction_backend)
            .bind(&chunk.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Get chunks for a document, ordered by index
    pub async fn get_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let chunks = sqlx::query_as::<_, Chunk>(
            "SELECT * FROM chunks WHERE document_id = ? ORDER BY chunk_index",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(chunks)
    }

    /// Get chunk by its index point ID
    pub async fn get_chunk_by_point_id(&self, point_id: &str) -> Result<Option<Chunk>> {
        let chunk = sqlx::query_as::<_, Chunk>("SELECT * FROM chunks WHERE point_id = ?")
            .bind(point_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(chunk)
    }

    /// Delete all chunks of a document
    pub async fn delete_chunks(&self, document_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All point ids referenced by chunk rows (orphan reconciliation)
    pub async fn all_point_ids(&self) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT point_id FROM chunks")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    /// Document and chunk counts
    pub async fn stats(&self) -> Result<(i64, i64)> {
        let docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok((docs, chunks))
    }

    // ===== Session Operations =====

    /// Insert a new session
    pub async fn insert_session(&self, session: &Session) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, session_id, user_id, active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.session_id)
        .bind(&session.user_id)
        .bind(session.active)
        .bind(&session.created_at)
        .bind(&session.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Find the active session for an external id
    pub async fn find_active_session(&self, session_id: &str) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE session_id = ? AND active = 1 ORDER BY created_at DESC",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    /// Deactivate every session row carrying an external id
    pub async fn deactivate_sessions(&self, session_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE sessions SET active = 0, updated_at = ? WHERE session_id = ? AND active = 1",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Bump a session's updated_at
    pub async fn touch_session(&self, session_pk: &str) -> Result<()> {
        sqlx::query("UPDATE sessions SET updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(session_pk)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ===== Message Operations =====

    /// Append a message
    pub async fn insert_message(&self, message: &Message) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, session_pk, role, content, has_image, image_ref, tokens_used, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(&message.session_pk)
        .bind(&message.role)
        .bind(&message.content)
        .bind(message.has_image)
        .bind(&message.image_ref)
        .bind(message.tokens_used)
        .bind(&message.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Full history for an external session id, across all its session rows
    pub async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT m.* FROM messages m
            JOIN sessions s ON m.session_pk = s.id
            WHERE s.session_id = ?
            ORDER BY m.created_at, m.rowid
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    /// Messages belonging to one session row
    pub async fn list_messages_for_session_pk(&self, session_pk: &str) -> Result<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE session_pk = ? ORDER BY created_at, rowid",
        )
        .bind(session_pk)
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }
}
