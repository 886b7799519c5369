//! Composition and schema setup.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use memory_embeddings::{CandleLoader, EmbeddingGenerator, HashLoader, ModelLoader};
use memory_search::{has_vector_field, memory_index_body, vector_dimension};
use memory_storage::{OpenSearchConfig, OpenSearchStore, StorageError};
use memory_types::{EmbeddingProvider, MemoryError, Settings};

use crate::service::MemoryService;

/// Outcome of [`MemoryService::ensure_memory_schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaStatus {
    /// Index was missing and has been created
    Created,
    /// Index exists with a k-NN vector embedding field
    AlreadyValid,
    /// Index exists but its embedding field is not a k-NN vector; left as is
    ExistsButInvalid,
}

impl SchemaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaStatus::Created => "created",
            SchemaStatus::AlreadyValid => "already_valid",
            SchemaStatus::ExistsButInvalid => "exists_but_invalid",
        }
    }
}

impl std::fmt::Display for SchemaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Embedding generator for the configured provider.
///
/// The model is not loaded here; the first embedding call loads it.
pub fn build_embeddings(settings: &Settings) -> Arc<EmbeddingGenerator> {
    let embedding = &settings.embedding;
    let loader: Arc<dyn ModelLoader> = match embedding.provider {
        EmbeddingProvider::Hash => Arc::new(HashLoader::new(embedding.dimension)),
        EmbeddingProvider::Candle => {
            let loader = match &embedding.cache_dir {
                Some(dir) => CandleLoader::new(PathBuf::from(dir)),
                None => CandleLoader::default(),
            };
            Arc::new(loader.with_revision(embedding.revision.clone()))
        }
    };
    Arc::new(
        EmbeddingGenerator::new(loader, embedding.model.clone())
            .with_default_dimension(embedding.dimension)
            .with_normalize(embedding.normalize),
    )
}

impl MemoryService {
    /// Service backed by the configured OpenSearch cluster.
    pub fn connect(settings: Settings) -> Result<Self, MemoryError> {
        let store = OpenSearchStore::new(OpenSearchConfig::from_settings(&settings.opensearch))?;
        let embeddings = build_embeddings(&settings);
        info!(
            url = %settings.opensearch.url,
            index = %settings.index.memory_index,
            model = %settings.embedding.model,
            "Memory service configured"
        );
        Ok(Self::new(settings, Arc::new(store), embeddings))
    }

    /// Prepare the primary index.
    pub async fn initialize(&self) -> Result<SchemaStatus, MemoryError> {
        let index = self.memory_index().to_string();
        self.ensure_memory_schema(&index).await
    }

    /// Create `index` with the memory mapping unless it already exists.
    ///
    /// An existing index is inspected, never modified.
    pub async fn ensure_memory_schema(&self, index: &str) -> Result<SchemaStatus, MemoryError> {
        let dimension = self.settings.embedding.dimension;

        if !self.store.index_exists(index).await? {
            match self.store.create_index(index, &memory_index_body(dimension)).await {
                Ok(()) => {
                    info!(index, dimension, "Created memory index");
                    return Ok(SchemaStatus::Created);
                }
                // Lost a creation race; inspect what the winner made
                Err(StorageError::Status { status: 400, ref body })
                    if body.contains("resource_already_exists") => {}
                Err(e) => return Err(e.into()),
            }
        }

        let mapping = self.store.get_mapping(index).await?;
        if !has_vector_field(&mapping, index) {
            warn!(index, "Memory index exists but has no k-NN embedding field");
            return Ok(SchemaStatus::ExistsButInvalid);
        }
        if let Some(found) = vector_dimension(&mapping, index) {
            if found != dimension {
                warn!(
                    index,
                    found,
                    configured = dimension,
                    "Memory index vector dimension differs from configuration"
                );
            }
        }
        info!(index, "Memory index already valid");
        Ok(SchemaStatus::AlreadyValid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_names() {
        assert_eq!(SchemaStatus::Created.to_string(), "created");
        assert_eq!(SchemaStatus::AlreadyValid.as_str(), "already_valid");
        assert_eq!(SchemaStatus::ExistsButInvalid.as_str(), "exists_but_invalid");
    }

    #[tokio::test]
    async fn test_hash_provider_builds_without_download() {
        let mut settings = Settings::default();
        settings.embedding.provider = EmbeddingProvider::Hash;
        settings.embedding.dimension = 16;
        let embeddings = build_embeddings(&settings);
        let vector = embeddings.generate("hello world").await;
        assert_eq!(vector.len(), 16);
        assert!(embeddings.is_loaded());
    }
}
