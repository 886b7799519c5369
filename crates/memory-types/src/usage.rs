//! Access statistics.
//!
//! Access stats are bumped as a side effect of reads. Only a bounded prefix of
//! each result set is counted, so one search never costs more than a handful
//! of writes.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// Default number of top hits whose stats are updated per read.
pub const DEFAULT_ACCESS_UPDATE_LIMIT: usize = 5;

/// The ids whose stats get updated for a result set: at most `limit`, in
/// result order, blanks dropped.
pub fn access_prefix(ids: &[String], limit: usize) -> Vec<String> {
    ids.iter()
        .filter(|id| !id.trim().is_empty())
        .take(limit)
        .cloned()
        .collect()
}

/// Apply one access to a stored memory document.
///
/// Mirrors the server-side update script: `access_count` and
/// `metadata.access_count` are incremented (starting from 1 when absent) and
/// `last_accessed` is overwritten.
pub fn apply_access_to_document(doc: &mut Map<String, Value>, at: DateTime<Utc>) {
    let count = doc
        .get("access_count")
        .and_then(Value::as_u64)
        .map(|c| c.saturating_add(1))
        .unwrap_or(1);
    doc.insert("access_count".to_string(), Value::from(count));
    doc.insert(
        "last_accessed".to_string(),
        Value::String(at.to_rfc3339_opts(SecondsFormat::Micros, true)),
    );

    let metadata = doc
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    if !metadata.is_object() {
        *metadata = Value::Object(Map::new());
    }
    if let Value::Object(meta) = metadata {
        let count = meta
            .get("access_count")
            .and_then(Value::as_u64)
            .map(|c| c.saturating_add(1))
            .unwrap_or(1);
        meta.insert("access_count".to_string(), Value::from(count));
    }
}
