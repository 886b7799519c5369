//! Access-stat updates as a side effect of reads.
//!
//! A read hands its result ids to the tracker and returns immediately. The
//! tracker takes a bounded prefix of them and applies one bulk scripted
//! update on a detached task. Failures are logged and dropped; a read never
//! fails because its bookkeeping did.
//!
//! Short-lived processes (the CLI, tests) call [`AccessTracker::flush`]
//! before exiting so pending updates are not lost with the runtime.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use memory_types::{access_prefix, DEFAULT_ACCESS_UPDATE_LIMIT};

use crate::store::MemoryStore;

/// Fire-and-forget access-stat updater.
pub struct AccessTracker {
    store: Arc<dyn MemoryStore>,
    limit: usize,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl AccessTracker {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self::with_limit(store, DEFAULT_ACCESS_UPDATE_LIMIT)
    }

    /// Tracker that updates at most `limit` ids per read.
    pub fn with_limit(store: Arc<dyn MemoryStore>, limit: usize) -> Self {
        Self {
            store,
            limit,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Schedule an update for the first `limit` of `ids`.
    ///
    /// Returns the ids that were scheduled. Must be called inside a Tokio
    /// runtime.
    pub fn record_access(&self, index: &str, ids: &[String]) -> Vec<String> {
        let ids = access_prefix(ids, self.limit);
        if ids.is_empty() {
            return ids;
        }

        let store = self.store.clone();
        let index = index.to_string();
        let scheduled = ids.clone();
        let handle = tokio::spawn(async move {
            apply(store.as_ref(), &index, &ids).await;
        });

        if let Ok(mut pending) = self.pending.lock() {
            pending.retain(|h| !h.is_finished());
            pending.push(handle);
        }
        scheduled
    }

    /// Apply an update inline, for callers that want it done before
    /// returning. Same prefix and same failure handling.
    pub async fn record_access_now(&self, index: &str, ids: &[String]) -> usize {
        let ids = access_prefix(ids, self.limit);
        if ids.is_empty() {
            return 0;
        }
        apply(self.store.as_ref(), index, &ids).await
    }

    /// Wait for every scheduled update to finish.
    pub async fn flush(&self) {
        let handles: Vec<JoinHandle<()>> = match self.pending.lock() {
            Ok(mut pending) => pending.drain(..).collect(),
            Err(_) => return,
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Access update task did not complete");
            }
        }
    }

    /// Number of updates not yet known to be finished.
    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .map(|p| p.iter().filter(|h| !h.is_finished()).count())
            .unwrap_or(0)
    }
}

async fn apply(store: &dyn MemoryStore, index: &str, ids: &[String]) -> usize {
    match store.update_access(index, ids, Utc::now()).await {
        Ok(updated) => {
            debug!(index, requested = ids.len(), updated, "Updated access stats");
            updated
        }
        Err(e) => {
            warn!(index, error = %e, "Failed to update access stats");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryStore;
    use serde_json::json;

    async fn store_with(ids: &[String]) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for id in ids {
            store
                .index_document(
                    "mem",
                    id,
                    &json!({ "memory_id": id, "access_count": 1, "metadata": { "access_count": 1 } }),
                )
                .await
                .unwrap();
        }
        store
    }

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("memory_{:02}", i)).collect()
    }

    #[tokio::test]
    async fn test_only_prefix_is_updated() {
        let all = ids(50);
        let store = store_with(&all).await;
        let tracker = AccessTracker::new(store.clone());

        let scheduled = tracker.record_access("mem", &all);
        assert_eq!(scheduled, all[..5].to_vec());
        tracker.flush().await;

        for (i, id) in all.iter().enumerate() {
            let doc = store.get_document("mem", id).await.unwrap().unwrap();
            let expected = if i < 5 { 2 } else { 1 };
            assert_eq!(doc["access_count"], expected, "{}", id);
            assert_eq!(doc["metadata"]["access_count"], expected, "{}", id);
        }
        assert_eq!(store.access_update_calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_ids_schedule_nothing() {
        let store = store_with(&[]).await;
        let tracker = AccessTracker::new(store.clone());
        assert!(tracker.record_access("mem", &[]).is_empty());
        tracker.flush().await;
        assert_eq!(store.access_update_calls(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_swallowed() {
        let all = ids(3);
        let store = store_with(&all).await;
        store.set_fail_access_updates(true);
        let tracker = AccessTracker::new(store.clone());

        tracker.record_access("mem", &all);
        tracker.flush().await;
        assert_eq!(tracker.record_access_now("mem", &all).await, 0);

        let doc = store.get_document("mem", &all[0]).await.unwrap().unwrap();
        assert_eq!(doc["access_count"], 1);
    }

    #[tokio::test]
    async fn test_record_access_now_counts() {
        let all = ids(8);
        let store = store_with(&all).await;
        let tracker = AccessTracker::with_limit(store, 3);
        assert_eq!(tracker.record_access_now("mem", &all).await, 3);
        assert_eq!(tracker.pending(), 0);
    }
}
