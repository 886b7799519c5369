//! Lazily-loaded embedding generator.
//!
//! Holds at most one loaded model per process. The first caller loads it;
//! concurrent first callers wait on the same load. Generation never fails
//! from the caller's point of view: blank input and encoder errors both
//! produce a zero vector, which downstream treats as "no semantic signal".

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use memory_types::DEFAULT_EMBEDDING_DIMENSION;

use crate::error::EmbeddingError;
use crate::model::EmbeddingModel;

/// Model input limit in tokens.
pub const MAX_SEQUENCE_LENGTH: usize = 512;

/// Character cap applied before encoding (about four chars per token).
pub const MAX_INPUT_CHARS: usize = MAX_SEQUENCE_LENGTH * 4;

/// Produces a model instance for a model name.
///
/// Loading is blocking work and runs on the blocking pool.
pub trait ModelLoader: Send + Sync {
    fn load(&self, model_name: &str) -> Result<Arc<dyn EmbeddingModel>, EmbeddingError>;
}

/// Text to vector, with a once-per-process model.
pub struct EmbeddingGenerator {
    loader: Arc<dyn ModelLoader>,
    model_name: String,
    default_dimension: usize,
    normalize: bool,
    model: OnceCell<Arc<dyn EmbeddingModel>>,
}

impl EmbeddingGenerator {
    pub fn new(loader: Arc<dyn ModelLoader>, model_name: impl Into<String>) -> Self {
        Self {
            loader,
            model_name: model_name.into(),
            default_dimension: DEFAULT_EMBEDDING_DIMENSION,
            normalize: true,
            model: OnceCell::new(),
        }
    }

    /// Dimension used for zero vectors when no model is available.
    pub fn with_default_dimension(mut self, dimension: usize) -> Self {
        self.default_dimension = dimension;
        self
    }

    /// Default normalization for [`generate`](Self::generate).
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn default_dimension(&self) -> usize {
        self.default_dimension
    }

    /// True once the shared model has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    /// The shared model, loading it on first use.
    pub async fn model(&self) -> Result<Arc<dyn EmbeddingModel>, EmbeddingError> {
        let model = self
            .model
            .get_or_try_init(|| async {
                let loader = self.loader.clone();
                let name = self.model_name.clone();
                info!(model = %name, "Loading embedding model");
                let loaded = tokio::task::spawn_blocking(move || loader.load(&name))
                    .await
                    .map_err(|e| EmbeddingError::Load(format!("load task failed: {}", e)))??;
                info!(
                    model = %self.model_name,
                    dimension = loaded.info().dimension,
                    "Embedding model ready"
                );
                Ok::<_, EmbeddingError>(loaded)
            })
            .await?;
        Ok(model.clone())
    }

    /// Embed `text` with the shared model and default normalization.
    pub async fn generate(&self, text: &str) -> Vec<f32> {
        self.generate_with(text, None, self.normalize).await
    }

    /// Embed `text`, optionally with a caller-supplied model.
    ///
    /// Never fails: blank input yields a zero vector of the default
    /// dimension, and any encoder failure yields a zero vector sized to the
    /// model in use (or the default when none could be loaded).
    pub async fn generate_with(
        &self,
        text: &str,
        model_override: Option<Arc<dyn EmbeddingModel>>,
        normalize: bool,
    ) -> Vec<f32> {
        if text.trim().is_empty() {
            warn!("Empty text provided for embedding, returning zero vector");
            return vec![0.0; self.default_dimension];
        }

        match self
            .try_generate(text, model_override.clone(), normalize)
            .await
        {
            Ok(values) => values,
            Err(e) => {
                let dimension = self.fallback_dimension(model_override.as_deref());
                error!(error = %e, dimension, "Embedding generation failed, using zero vector");
                vec![0.0; dimension]
            }
        }
    }

    /// Embed `text`, surfacing encoder errors instead of degrading.
    pub async fn try_generate(
        &self,
        text: &str,
        model_override: Option<Arc<dyn EmbeddingModel>>,
        normalize: bool,
    ) -> Result<Vec<f32>, EmbeddingError> {
        let model = match model_override {
            Some(model) => model,
            None => self.model().await?,
        };
        let input = truncate_chars(text, MAX_INPUT_CHARS);
        if input.len() < text.len() {
            debug!(
                original_chars = text.chars().count(),
                kept_chars = MAX_INPUT_CHARS,
                "Truncated embedding input"
            );
        }
        let input = input.to_string();
        let embedding = tokio::task::spawn_blocking(move || model.embed(&input, normalize))
            .await
            .map_err(|e| EmbeddingError::Task(e.to_string()))??;
        Ok(embedding.values)
    }

    fn fallback_dimension(&self, model_override: Option<&dyn EmbeddingModel>) -> usize {
        if let Some(model) = model_override {
            return model.info().dimension;
        }
        self.model
            .get()
            .map(|m| m.info().dimension)
            .unwrap_or(self.default_dimension)
    }
}

/// First `max_chars` characters of `text`, cut on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
