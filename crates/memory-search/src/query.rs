//! Hybrid query construction.
//!
//! Produces OpenSearch query bodies that blend k-NN vector similarity with
//! BM25 keyword relevance into a single score.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

use memory_types::{MemoryKind, SearchSettings};

use crate::schema::{CREATED_AT_FIELD, EMBEDDING_FIELD, KIND_FIELD};

/// Fields for the keyword clause, with boosts.
pub const KEYWORD_FIELDS: [&str; 4] = ["title^2", "content", "key_points", "tags^1.5"];

/// Candidate multiplier for the k-NN clause.
pub const KNN_CANDIDATE_FACTOR: usize = 2;

/// Largest `k` OpenSearch accepts in a k-NN clause.
pub const MAX_KNN_K: usize = 10_000;

/// Largest result size whose candidate count stays within [`MAX_KNN_K`].
pub const MAX_SEARCH_SIZE: usize = MAX_KNN_K / KNN_CANDIDATE_FACTOR;

/// Blended scoring script. Cosine is in [-1, 1]; scores must be non-negative.
pub const HYBRID_SCORE_SCRIPT: &str = "double cos = doc['embedding'].size() == 0 ? 0.0 : \
cosineSimilarity(params.query_vector, doc['embedding']); \
return Math.max(0.0, params.vector_weight * cos + params.keyword_weight * _score);";

/// Keyword-only scoring script, used when the query vector is all zeros.
pub const KEYWORD_SCORE_SCRIPT: &str = "params.keyword_weight * _score";

/// Scripted update applied to each accessed memory.
pub const ACCESS_UPDATE_SCRIPT: &str = "ctx._source.access_count = ctx._source.access_count != null ? ctx._source.access_count + 1 : 1; \
ctx._source.last_accessed = params.timestamp; \
if (ctx._source.metadata == null) { ctx._source.metadata = new HashMap(); } \
ctx._source.metadata.access_count = ctx._source.metadata.access_count != null ? ctx._source.metadata.access_count + 1 : 1;";

/// Inclusive creation-time window; either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub gte: Option<DateTime<Utc>>,
    pub lte: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(gte: Option<DateTime<Utc>>, lte: Option<DateTime<Utc>>) -> Self {
        Self { gte, lte }
    }

    pub fn is_unbounded(&self) -> bool {
        self.gte.is_none() && self.lte.is_none()
    }

    fn to_filter(self) -> Option<Value> {
        if self.is_unbounded() {
            return None;
        }
        let mut bounds = serde_json::Map::new();
        if let Some(gte) = self.gte {
            bounds.insert("gte".into(), Value::String(format_timestamp(&gte)));
        }
        if let Some(lte) = self.lte {
            bounds.insert("lte".into(), Value::String(format_timestamp(&lte)));
        }
        Some(json!({ "range": { CREATED_AT_FIELD: bounds } }))
    }
}

/// Timestamp form used in documents and range filters.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Builds hybrid search bodies from configured weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridQueryBuilder {
    vector_weight: f32,
    keyword_weight: f32,
}

impl HybridQueryBuilder {
    pub fn new(vector_weight: f32, keyword_weight: f32) -> Self {
        Self {
            vector_weight,
            keyword_weight,
        }
    }

    pub fn from_settings(settings: &SearchSettings) -> Self {
        Self::new(settings.vector_weight, settings.keyword_weight)
    }

    pub fn vector_weight(&self) -> f32 {
        self.vector_weight
    }

    pub fn keyword_weight(&self) -> f32 {
        self.keyword_weight
    }

    /// Build a search body for `text_query` and its `embedding`.
    ///
    /// The boolean core has a k-NN clause (`k = 2 * size`) and a
    /// multi-field keyword clause, at least one of which must match. The
    /// k-NN clause selects candidates only (boost 0); the script adds the
    /// weighted cosine itself so `_score` carries the keyword part alone.
    pub fn build_hybrid_query(
        &self,
        text_query: &str,
        embedding: &[f32],
        size: usize,
        kind: Option<MemoryKind>,
        time_range: Option<&TimeRange>,
    ) -> Value {
        let filters = build_filters(kind, time_range);
        let keyword_clause = json!({
            "multi_match": {
                "query": text_query,
                "fields": KEYWORD_FIELDS,
                "type": "best_fields"
            }
        });

        let has_vector = embedding.iter().any(|v| *v != 0.0);

        let (should, script) = if has_vector {
            let knn_clause = json!({
                "knn": {
                    EMBEDDING_FIELD: {
                        "vector": embedding,
                        "k": size.saturating_mul(KNN_CANDIDATE_FACTOR).min(MAX_KNN_K),
                        "boost": 0.0
                    }
                }
            });
            let script = json!({
                "source": HYBRID_SCORE_SCRIPT,
                "lang": "painless",
                "params": {
                    "query_vector": embedding,
                    "vector_weight": self.vector_weight,
                    "keyword_weight": self.keyword_weight
                }
            });
            (vec![knn_clause, keyword_clause], script)
        } else {
            let script = json!({
                "source": KEYWORD_SCORE_SCRIPT,
                "lang": "painless",
                "params": { "keyword_weight": self.keyword_weight }
            });
            (vec![keyword_clause], script)
        };

        let mut bool_query = json!({
            "should": should,
            "minimum_should_match": 1
        });
        if !filters.is_empty() {
            bool_query["filter"] = Value::Array(filters);
        }

        json!({
            "size": size,
            "query": {
                "script_score": {
                    "query": { "bool": bool_query },
                    "script": script
                }
            }
        })
    }
}

impl Default for HybridQueryBuilder {
    fn default() -> Self {
        Self::from_settings(&SearchSettings::default())
    }
}

fn build_filters(kind: Option<MemoryKind>, time_range: Option<&TimeRange>) -> Vec<Value> {
    let mut filters = Vec::new();
    if let Some(kind) = kind {
        filters.push(json!({ "term": { KIND_FIELD: kind.as_str() } }));
    }
    if let Some(range) = time_range.and_then(|r| r.to_filter()) {
        filters.push(range);
    }
    filters
}

/// Newest memory of `kind` by creation time.
pub fn latest_by_kind_query(kind: MemoryKind) -> Value {
    json!({
        "size": 1,
        "query": { "term": { KIND_FIELD: kind.as_str() } },
        "sort": [ { CREATED_AT_FIELD: { "order": "desc" } } ]
    })
}

/// Weighted blend used by the hybrid script, for callers scoring locally.
pub fn blend_score(vector_weight: f32, keyword_weight: f32, cosine: f32, keyword: f32) -> f32 {
    (vector_weight * cosine + keyword_weight * keyword).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bool_query(body: &Value) -> &Value {
        &body["query"]["script_score"]["query"]["bool"]
    }

    #[test]
    fn test_knn_k_is_twice_size() {
        let builder = HybridQueryBuilder::new(0.7, 0.3);
        let body = builder.build_hybrid_query("rust", &[0.1, 0.2], 10, None, None);
        assert_eq!(body["size"], 10);
        assert_eq!(bool_query(&body)["should"][0]["knn"]["embedding"]["k"], 20);
        assert_eq!(bool_query(&body)["minimum_should_match"], 1);
    }

    #[test]
    fn test_knn_k_is_capped() {
        let builder = HybridQueryBuilder::new(0.7, 0.3);
        let body = builder.build_hybrid_query("rust", &[0.1, 0.2], MAX_SEARCH_SIZE, None, None);
        assert_eq!(bool_query(&body)["should"][0]["knn"]["embedding"]["k"], MAX_KNN_K);

        let body = builder.build_hybrid_query("rust", &[0.1, 0.2], usize::MAX, None, None);
        assert_eq!(bool_query(&body)["should"][0]["knn"]["embedding"]["k"], MAX_KNN_K);
    }

    #[test]
    fn test_keyword_fields_and_boosts() {
        let builder = HybridQueryBuilder::new(0.7, 0.3);
        let body = builder.build_hybrid_query("rust", &[1.0], 10, None, None);
        let mm = &bool_query(&body)["should"][1]["multi_match"];
        assert_eq!(mm["query"], "rust");
        assert_eq!(mm["type"], "best_fields");
        assert_eq!(
            mm["fields"],
            json!(["title^2", "content", "key_points", "tags^1.5"])
        );
    }

    #[test]
    fn test_script_carries_weights_and_vector() {
        let builder = HybridQueryBuilder::new(0.7, 0.3);
        let body = builder.build_hybrid_query("q", &[0.5, 0.5], 5, None, None);
        let params = &body["query"]["script_score"]["script"]["params"];
        assert!((params["vector_weight"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert!((params["keyword_weight"].as_f64().unwrap() - 0.3).abs() < 1e-6);
        assert_eq!(params["query_vector"], json!([0.5, 0.5]));
    }

    #[test]
    fn test_no_filters_when_unconstrained() {
        let builder = HybridQueryBuilder::default();
        let body = builder.build_hybrid_query("q", &[1.0], 3, None, None);
        assert!(bool_query(&body).get("filter").is_none());

        let open = TimeRange::default();
        let body = builder.build_hybrid_query("q", &[1.0], 3, None, Some(&open));
        assert!(bool_query(&body).get("filter").is_none());
    }

    #[test]
    fn test_kind_and_range_filters() {
        let builder = HybridQueryBuilder::default();
        let gte = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let range = TimeRange::new(Some(gte), None);
        let body = builder.build_hybrid_query(
            "q",
            &[1.0],
            3,
            Some(MemoryKind::Episodic),
            Some(&range),
        );
        let filters = bool_query(&body)["filter"].as_array().unwrap();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0]["term"]["memory_type"], "episodic");
        assert_eq!(
            filters[1]["range"]["created_at"]["gte"],
            "2024-01-01T00:00:00.000000Z"
        );
        assert!(filters[1]["range"]["created_at"].get("lte").is_none());
    }

    #[test]
    fn test_zero_vector_degrades_to_keyword_only() {
        let builder = HybridQueryBuilder::new(0.7, 0.3);
        let body = builder.build_hybrid_query("q", &[0.0; 8], 4, None, None);
        let should = bool_query(&body)["should"].as_array().unwrap();
        assert_eq!(should.len(), 1);
        assert!(should[0].get("multi_match").is_some());
        let script = &body["query"]["script_score"]["script"];
        assert_eq!(script["source"], KEYWORD_SCORE_SCRIPT);
        assert!(script["params"].get("query_vector").is_none());
    }

    #[test]
    fn test_latest_by_kind() {
        let body = latest_by_kind_query(MemoryKind::Episodic);
        assert_eq!(body["size"], 1);
        assert_eq!(body["query"]["term"]["memory_type"], "episodic");
        assert_eq!(body["sort"][0]["created_at"]["order"], "desc");
    }

    #[test]
    fn test_blend_score_never_negative() {
        assert!((blend_score(0.7, 0.3, 1.0, 2.0) - 1.3).abs() < 1e-6);
        assert_eq!(blend_score(1.0, 0.0, -1.0, 0.0), 0.0);
    }
}
