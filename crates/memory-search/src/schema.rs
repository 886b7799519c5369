//! Memory index definition.
//!
//! One index holds every memory kind. The `embedding` field is a k-NN
//! vector (HNSW on faiss); the rest are scalar fields mirroring `Memory`.

use serde_json::{json, Value};

pub const ID_FIELD: &str = "memory_id";
pub const KIND_FIELD: &str = "memory_type";
pub const EMBEDDING_FIELD: &str = "embedding";
pub const CREATED_AT_FIELD: &str = "created_at";

/// Mapping type that marks a usable vector field.
pub const VECTOR_FIELD_TYPE: &str = "knn_vector";

/// Request body that creates the memory index at `dimension`.
pub fn memory_index_body(dimension: usize) -> Value {
    json!({
        "settings": {
            "index": {
                "knn": true,
                "knn.space_type": "l2"
            }
        },
        "mappings": {
            "properties": {
                "memory_id": { "type": "keyword" },
                "memory_type": { "type": "keyword" },
                "title": { "type": "text" },
                "content": {
                    "type": "text",
                    "fields": { "keyword": { "type": "keyword", "ignore_above": 256 } }
                },
                "content_format": { "type": "keyword" },
                "embedding": {
                    "type": VECTOR_FIELD_TYPE,
                    "dimension": dimension,
                    "method": {
                        "name": "hnsw",
                        "space_type": "l2",
                        "engine": "faiss"
                    }
                },
                "created_at": { "type": "date" },
                "updated_at": { "type": "date" },
                "last_accessed": { "type": "date" },
                "tags": { "type": "keyword" },
                "confidence": { "type": "float" },
                "access_count": { "type": "integer" },
                "session_id": { "type": "keyword" },
                "key_points": { "type": "text" },
                "next_steps": { "type": "text" },
                "description": { "type": "text" },
                "source_id": { "type": "keyword" },
                "target_id": { "type": "keyword" },
                "relationship_type": { "type": "keyword" },
                "strength": { "type": "float" },
                "metadata": {
                    "properties": {
                        "confidence": { "type": "float" },
                        "access_count": { "type": "long" },
                        "source": {
                            "type": "text",
                            "fields": { "keyword": { "type": "keyword", "ignore_above": 256 } }
                        }
                    }
                }
            }
        }
    })
}

/// The `embedding` field definition inside a get-mapping response.
fn embedding_mapping<'a>(mapping: &'a Value, index: &str) -> Option<&'a Value> {
    mapping
        .get(index)?
        .get("mappings")?
        .get("properties")?
        .get(EMBEDDING_FIELD)
}

/// True when the index mapping declares `embedding` as a k-NN vector.
pub fn has_vector_field(mapping: &Value, index: &str) -> bool {
    embedding_mapping(mapping, index)
        .and_then(|field| field.get("type"))
        .and_then(Value::as_str)
        == Some(VECTOR_FIELD_TYPE)
}

/// Declared vector dimension, if the mapping has one.
pub fn vector_dimension(mapping: &Value, index: &str) -> Option<usize> {
    embedding_mapping(mapping, index)?
        .get("dimension")?
        .as_u64()
        .map(|d| d as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(index: &str, body: &Value) -> Value {
        json!({ index: { "mappings": body["mappings"].clone() } })
    }

    #[test]
    fn test_index_body_vector_field() {
        let body = memory_index_body(384);
        let emb = &body["mappings"]["properties"]["embedding"];
        assert_eq!(emb["type"], "knn_vector");
        assert_eq!(emb["dimension"], 384);
        assert_eq!(emb["method"]["engine"], "faiss");
        assert_eq!(emb["method"]["name"], "hnsw");
        assert_eq!(body["settings"]["index"]["knn"], true);
    }

    #[test]
    fn test_has_vector_field() {
        let mapping = wrap("mem", &memory_index_body(8));
        assert!(has_vector_field(&mapping, "mem"));
        assert_eq!(vector_dimension(&mapping, "mem"), Some(8));
        assert!(!has_vector_field(&mapping, "other"));
    }

    #[test]
    fn test_plain_float_field_is_not_vector() {
        let mapping = json!({
            "mem": { "mappings": { "properties": { "embedding": { "type": "float" } } } }
        });
        assert!(!has_vector_field(&mapping, "mem"));

        let empty = json!({ "mem": { "mappings": {} } });
        assert!(!has_vector_field(&empty, "mem"));
    }
}
