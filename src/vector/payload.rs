//! Payload schema for indexed chunk points

use qdrant_client::qdrant::{PointStruct, Value as QdrantValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// A point ready to be upserted to the index
#[derive(Debug, Clone)]
pub struct ChunkPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

impl ChunkPoint {
    /// Convert to qdrant-client PointStruct
    pub fn to_point_struct(self) -> PointStruct {
        let payload_map = self.payload.to_qdrant_payload();
        PointStruct::new(self.id.to_string(), self.vector, payload_map)
    }
}

/// Payload stored with each chunk point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// Owning document id
    pub document_id: String,

    /// Original filename of the document
    pub filename: String,

    /// Document category
    pub category: String,

    /// Chunk index within the document
    pub chunk_index: i32,

    /// Page the chunk came from, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<i64>,

    /// Hash of the chunk content
    pub chunk_hash: String,

    /// When this chunk was indexed
    pub updated_at: String,
}

impl ChunkPayload {
    pub fn new(
        document_id: String,
        filename: String,
        category: String,
        chunk_index: i32,
        chunk_hash: String,
        updated_at: String,
    ) -> Self {
        Self {
            document_id,
            filename,
            category,
            chunk_index,
            page_number: None,
            chunk_hash,
            updated_at,
        }
    }

    /// Convert to Qdrant payload format
    pub fn to_qdrant_payload(self) -> HashMap<String, QdrantValue> {
        let mut map = HashMap::new();

        map.insert("document_id".to_string(), string_to_qdrant(&self.document_id));
        map.insert("filename".to_string(), string_to_qdrant(&self.filename));
        map.insert("category".to_string(), string_to_qdrant(&self.category));
        map.insert(
            "chunk_index".to_string(),
            int_to_qdrant(self.chunk_index as i64),
        );
        map.insert("chunk_hash".to_string(), string_to_qdrant(&self.chunk_hash));
        map.insert("updated_at".to_string(), string_to_qdrant(&self.updated_at));

        if let Some(page) = self.page_number {
            map.insert("page_number".to_string(), int_to_qdrant(page));
        }

        map
    }
}

fn string_to_qdrant(s: &str) -> QdrantValue {
    QdrantValue {
        kind: Some(qdrant_client::qdrant::value::Kind::StringValue(s.to_string())),
    }
}

fn int_to_qdrant(i: i64) -> QdrantValue {
    QdrantValue {
        kind: Some(qdrant_client::qdrant::value::Kind::IntegerValue(i)),
    }
}

impl From<Map<String, Value>> for ChunkPayload {
    fn from(map: Map<String, Value>) -> Self {
        serde_json::from_value(Value::Object(map)).unwrap_or_else(|_| ChunkPayload {
            document_id: String::new(),
            filename: String::new(),
            category: String::new(),
            chunk_index: 0,
            page_number: None,
            chunk_hash: String::new(),
            updated_at: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_serialization() {
        let mut payload = ChunkPayload::new(
            "doc-123".to_string(),
            "tarifs.pdf".to_string(),
            "tarifs".to_string(),
            2,
            "hash123".to_string(),
            "2024-01-01T00:00:00Z".to_string(),
        );
        payload.page_number = Some(4);

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("document_id"));
        assert!(json.contains("doc-123"));

        let parsed: ChunkPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.document_id, "doc-123");
        assert_eq!(parsed.page_number, Some(4));
    }

    #[test]
    fn test_qdrant_payload_has_all_fields() {
        let payload = ChunkPayload::new(
            "doc-123".to_string(),
            "tarifs.pdf".to_string(),
            "tarifs".to_string(),
            2,
            "hash123".to_string(),
            "2024-01-01T00:00:00Z".to_string(),
        );

        let map = payload.to_qdrant_payload();
        assert!(map.contains_key("document_id"));
        assert!(map.contains_key("category"));
        assert!(map.contains_key("chunk_index"));
        assert!(!map.contains_key("page_number"));
    }
}
