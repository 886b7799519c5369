//! The storage-engine seam.
//!
//! Everything the memory engine needs from a document store: single
//! document writes and reads, a bulk access-stat update, JSON-bodied search,
//! and index administration.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::StorageError;

/// One search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    /// Absent when results are sorted by a field
    pub score: Option<f32>,
    pub source: Value,
}

/// Search results in store order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    /// Number of matching documents, which may exceed `hits.len()`
    pub total: u64,
    pub hits: Vec<SearchHit>,
}

impl SearchResponse {
    /// Parse an OpenSearch `_search` response body.
    pub fn from_opensearch(body: &Value) -> Result<Self, StorageError> {
        let hits_obj = body
            .get("hits")
            .ok_or_else(|| StorageError::Serialization("search response has no hits".into()))?;

        // `total` is an object in current versions, a bare number in old ones
        let total = match hits_obj.get("total") {
            Some(Value::Object(t)) => t.get("value").and_then(Value::as_u64).unwrap_or(0),
            Some(v) => v.as_u64().unwrap_or(0),
            None => 0,
        };

        let hits = hits_obj
            .get("hits")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|hit| SearchHit {
                        id: hit
                            .get("_id")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        score: hit.get("_score").and_then(Value::as_f64).map(|s| s as f32),
                        source: hit.get("_source").cloned().unwrap_or(Value::Null),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self { total, hits })
    }

    pub fn ids(&self) -> Vec<String> {
        self.hits.iter().map(|h| h.id.clone()).collect()
    }
}

/// Document store used by the memory engine.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Write `document` under `id`, visible to search on return.
    async fn index_document(
        &self,
        index: &str,
        id: &str,
        document: &Value,
    ) -> Result<(), StorageError>;

    /// Fetch a document source. Missing document or index is `None`.
    async fn get_document(&self, index: &str, id: &str) -> Result<Option<Value>, StorageError>;

    /// Whether a document exists. A missing index counts as absent.
    async fn exists(&self, index: &str, id: &str) -> Result<bool, StorageError>;

    /// Apply one access to each id in a single bulk request.
    ///
    /// Returns how many documents were updated.
    async fn update_access(
        &self,
        index: &str,
        ids: &[String],
        timestamp: DateTime<Utc>,
    ) -> Result<usize, StorageError>;

    /// Run a search body against `index`.
    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse, StorageError>;

    async fn index_exists(&self, index: &str) -> Result<bool, StorageError>;

    /// Create an index from a settings + mappings body.
    async fn create_index(&self, index: &str, body: &Value) -> Result<(), StorageError>;

    /// Get-mapping response, keyed by index name.
    async fn get_mapping(&self, index: &str) -> Result<Value, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_search_response() {
        let body = json!({
            "took": 3,
            "hits": {
                "total": { "value": 7, "relation": "eq" },
                "hits": [
                    { "_id": "a", "_score": 1.5, "_source": { "title": "A" } },
                    { "_id": "b", "_score": null, "_source": { "title": "B" } }
                ]
            }
        });
        let resp = SearchResponse::from_opensearch(&body).unwrap();
        assert_eq!(resp.total, 7);
        assert_eq!(resp.ids(), vec!["a", "b"]);
        assert_eq!(resp.hits[0].score, Some(1.5));
        assert_eq!(resp.hits[1].score, None);
        assert_eq!(resp.hits[1].source["title"], "B");
    }

    #[test]
    fn test_parse_legacy_total() {
        let body = json!({ "hits": { "total": 2, "hits": [] } });
        assert_eq!(SearchResponse::from_opensearch(&body).unwrap().total, 2);
    }

    #[test]
    fn test_missing_hits_is_error() {
        assert!(SearchResponse::from_opensearch(&json!({ "error": "x" })).is_err());
    }
}
