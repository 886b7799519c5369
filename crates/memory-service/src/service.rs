//! Memory service: writes, reads and updates against the primary index.
//!
//! Search lives in [`crate::search`], connections in [`crate::graph`] and
//! schema setup in [`crate::bootstrap`]; all of them extend the same
//! [`MemoryService`].

use std::sync::Arc;

use tracing::{debug, info};

use memory_embeddings::{prepare_text_for_embedding, EmbeddingGenerator};
use memory_search::{document_to_memory, memory_to_document, HybridQueryBuilder};
use memory_storage::{AccessTracker, MemoryStore};
use memory_types::{Memory, MemoryContent, MemoryError, MemoryKind, Settings, StructuredContent};

use crate::requests::{MemoryUpdate, NewMemory, NewSession};

/// Metadata source recorded on memories stored directly.
pub const SOURCE_DIRECT: &str = "direct_creation";

/// Metadata source recorded on session summaries.
pub const SOURCE_SESSION: &str = "session_summary";

/// Entry point for every memory operation.
///
/// Owns nothing global: the store and the embedding generator are handed in
/// by the composition root and may be shared with other services.
pub struct MemoryService {
    pub(crate) settings: Settings,
    pub(crate) store: Arc<dyn MemoryStore>,
    pub(crate) embeddings: Arc<EmbeddingGenerator>,
    pub(crate) access: AccessTracker,
    pub(crate) queries: HybridQueryBuilder,
}

impl MemoryService {
    pub fn new(
        settings: Settings,
        store: Arc<dyn MemoryStore>,
        embeddings: Arc<EmbeddingGenerator>,
    ) -> Self {
        let access = AccessTracker::with_limit(store.clone(), settings.search.access_update_limit);
        let queries = HybridQueryBuilder::from_settings(&settings.search);
        Self {
            settings,
            store,
            embeddings,
            access,
            queries,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    pub fn embeddings(&self) -> &Arc<EmbeddingGenerator> {
        &self.embeddings
    }

    pub fn memory_index(&self) -> &str {
        &self.settings.index.memory_index
    }

    /// Store a memory of any kind.
    pub async fn store_memory(&self, request: NewMemory) -> Result<Memory, MemoryError> {
        let id = resolve_id(request.id, "memory")?;
        let memory = Memory::new(id, request.kind, request.title, request.content)
            .with_tags(request.tags)
            .with_source(SOURCE_DIRECT)
            .with_metadata(request.metadata);

        let memory = self.embed_and_write(memory).await?;
        info!(id = %memory.id, kind = %memory.kind, "Stored memory");
        Ok(memory)
    }

    /// Store a session summary as an episodic memory.
    pub async fn store_session_memory(&self, request: NewSession) -> Result<Memory, MemoryError> {
        if request.session_id.trim().is_empty() {
            return Err(MemoryError::Validation("session_id is required".into()));
        }
        let id = resolve_id(request.id, "session")?;
        let content = StructuredContent::session(
            request.summary,
            request.key_points,
            request.next_steps,
        );
        let memory = Memory::new(
            id,
            MemoryKind::Episodic,
            request.title,
            MemoryContent::Structured(content),
        )
        .with_session(request.session_id)
        .with_tags(request.tags)
        .with_source(SOURCE_SESSION)
        .with_metadata(request.metadata);

        let memory = self.embed_and_write(memory).await?;
        info!(
            id = %memory.id,
            session_id = memory.session_id.as_deref().unwrap_or_default(),
            "Stored session memory"
        );
        Ok(memory)
    }

    /// Fetch a memory from the primary index. Does not count as an access.
    pub async fn get_memory(&self, id: &str) -> Result<Option<Memory>, MemoryError> {
        let index = self.memory_index();
        match self.store.get_document(index, id).await? {
            Some(source) => Ok(Some(document_to_memory(id, &source)?)),
            None => {
                debug!(index, id, "Memory not found");
                Ok(None)
            }
        }
    }

    /// Apply explicit changes to a stored memory and re-embed it.
    pub async fn update_memory(
        &self,
        id: &str,
        update: MemoryUpdate,
    ) -> Result<Memory, MemoryError> {
        if update.is_empty() {
            return Err(MemoryError::Validation("no fields to update".into()));
        }
        let mut memory = self
            .get_memory(id)
            .await?
            .ok_or_else(|| MemoryError::NotFound(format!("memory {}", id)))?;

        if let Some(title) = update.title {
            memory.title = title;
        }
        if let Some(content) = update.content {
            memory.content = content;
        }
        if let Some(tags) = update.tags {
            memory.set_tags(tags);
        }
        if let Some(metadata) = update.metadata {
            memory = memory.with_metadata(metadata);
        }
        if let Some(confidence) = update.confidence {
            memory = memory.with_confidence(confidence);
        }
        memory.touch();

        let memory = self.embed_and_write(memory).await?;
        info!(id = %memory.id, "Updated memory");
        Ok(memory)
    }

    /// Wait for pending access-stat updates. Call before a short-lived
    /// process exits.
    pub async fn flush_access_updates(&self) {
        self.access.flush().await;
    }

    /// Embed the normalized text of `memory`, then persist it.
    pub(crate) async fn embed_and_write(&self, memory: Memory) -> Result<Memory, MemoryError> {
        let text = prepare_text_for_embedding(&memory);
        let embedding = self.embeddings.generate(&text).await;
        self.write_with_embedding(memory, embedding).await
    }

    pub(crate) async fn write_with_embedding(
        &self,
        mut memory: Memory,
        embedding: Vec<f32>,
    ) -> Result<Memory, MemoryError> {
        let expected = self.settings.embedding.dimension;
        if embedding.len() != expected {
            return Err(MemoryError::Validation(format!(
                "embedding has dimension {} but the index expects {}",
                embedding.len(),
                expected
            )));
        }
        memory.embedding = embedding;

        let document = memory_to_document(&memory)?;
        self.store
            .index_document(self.memory_index(), &memory.id, &document)
            .await?;
        Ok(memory)
    }
}

/// Use the caller's id, or generate `{prefix}_{ulid}`.
pub(crate) fn resolve_id(id: Option<String>, prefix: &str) -> Result<String, MemoryError> {
    match id {
        None => Ok(Memory::generate_id(prefix)),
        Some(id) => {
            let id = id.trim();
            if id.is_empty() {
                Err(MemoryError::Validation("id must not be blank".into()))
            } else {
                Ok(id.to_string())
            }
        }
    }
}
