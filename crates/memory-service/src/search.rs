//! Hybrid search and session lookup.

use tracing::{debug, info, warn};

use memory_search::{document_to_memory, latest_by_kind_query, MAX_SEARCH_SIZE};
use memory_storage::{SearchHit, StorageError};
use memory_types::{Memory, MemoryError, MemoryKind};

use crate::requests::SearchRequest;
use crate::service::MemoryService;

/// A search result with its blended relevance score.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub memory: Memory,
    pub score: f32,
}

impl MemoryService {
    /// Blend vector similarity and keyword relevance over the primary index.
    ///
    /// Hits below the minimum score are dropped. Access stats are bumped in
    /// the background for the first few hits as ranked by the index, before
    /// the score cut, so a retrieval counts even when the caller's threshold
    /// hides it.
    pub async fn semantic_search(
        &self,
        request: SearchRequest,
    ) -> Result<Vec<ScoredMemory>, MemoryError> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(MemoryError::Validation("query must not be empty".into()));
        }
        let size = request.size.unwrap_or(self.settings.search.default_size);
        if size == 0 {
            return Err(MemoryError::Validation("size must be at least 1".into()));
        }
        if size > MAX_SEARCH_SIZE {
            return Err(MemoryError::Validation(format!(
                "size must be at most {}",
                MAX_SEARCH_SIZE
            )));
        }
        let min_score = request.min_score.unwrap_or(self.settings.search.min_score);

        info!(query, size, kind = ?request.kind, "Searching memories");
        let embedding = self.embeddings.generate(query).await;
        let body = self.queries.build_hybrid_query(
            query,
            &embedding,
            size,
            request.kind,
            request.time_range.as_ref(),
        );

        let index = self.memory_index();
        let response = self.store.search(index, &body).await?;
        let total_hits = response.hits.len();
        let ranked_ids: Vec<String> = response.hits.iter().map(|hit| hit.id.clone()).collect();

        let results: Vec<ScoredMemory> = response
            .hits
            .into_iter()
            .filter(|hit| hit.score.unwrap_or(0.0) >= min_score)
            .filter_map(decode_hit)
            .map(|(memory, score)| ScoredMemory { memory, score })
            .collect();
        debug!(total_hits, kept = results.len(), min_score, "Filtered search hits");

        self.access.record_access(index, &ranked_ids);
        Ok(results)
    }

    /// The newest session memory.
    ///
    /// Looks in the primary index first and falls back to the legacy index.
    /// A missing index counts as empty.
    pub async fn get_last_session_memory(&self) -> Result<Option<Memory>, MemoryError> {
        let query = latest_by_kind_query(MemoryKind::Episodic);
        let primary = self.settings.index.memory_index.as_str();
        let legacy = self.settings.index.legacy_index.as_str();

        let mut indexes = vec![primary];
        if !legacy.is_empty() && legacy != primary {
            indexes.push(legacy);
        }

        for index in indexes {
            let response = match self.store.search(index, &query).await {
                Ok(response) => response,
                Err(StorageError::IndexNotFound(_)) => {
                    debug!(index, "Session index does not exist");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let Some((memory, _)) = response.hits.into_iter().next().and_then(decode_hit) else {
                debug!(index, "No session memories in index");
                continue;
            };
            info!(index, id = %memory.id, "Found last session memory");
            self.access.record_access(index, std::slice::from_ref(&memory.id));
            return Ok(Some(memory));
        }
        Ok(None)
    }
}

/// Decode a hit, skipping documents that no longer parse.
fn decode_hit(hit: SearchHit) -> Option<(Memory, f32)> {
    let score = hit.score.unwrap_or(0.0);
    match document_to_memory(&hit.id, &hit.source) {
        Ok(memory) => Some((memory, score)),
        Err(e) => {
            warn!(id = %hit.id, error = %e, "Skipping undecodable document");
            None
        }
    }
}
