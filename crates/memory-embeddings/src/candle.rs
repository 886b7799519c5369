//! Candle-based embedding implementation.
//!
//! Runs any BERT-family sentence encoder (default intfloat/e5-small-v2)
//! with mean pooling over the attention mask.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use serde::Deserialize;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::hub::{default_cache_dir, ModelSource};
use crate::error::EmbeddingError;
use crate::generator::ModelLoader;
use crate::model::{Embedding, EmbeddingModel, ModelInfo};

/// Maximum sequence length in tokens
pub const MAX_SEQ_LENGTH: usize = 512;

/// Default batch size for embedding
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// The slice of config.json we need before the full BERT config.
#[derive(Deserialize)]
struct HiddenSize {
    hidden_size: usize,
}

/// Candle-based BERT embedder.
pub struct CandleEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    info: ModelInfo,
}

impl CandleEmbedder {
    /// Load the embedding model from the hub cache (downloading if needed).
    pub fn load(source: &ModelSource) -> Result<Self, EmbeddingError> {
        let paths = source.resolve()?;
        Self::load_from_paths(
            &source.repo_id,
            &paths.config,
            &paths.tokenizer,
            &paths.weights,
        )
    }

    /// Load the default model at its default revision
    pub fn load_default() -> Result<Self, EmbeddingError> {
        Self::load(&ModelSource::default())
    }

    /// Load from explicit file paths
    pub fn load_from_paths(
        name: &str,
        config_path: &Path,
        tokenizer_path: &Path,
        weights_path: &Path,
    ) -> Result<Self, EmbeddingError> {
        info!(model = name, "Loading embedding model...");

        // CPU only
        let device = Device::Cpu;

        let config_str = std::fs::read_to_string(config_path)?;
        let config: BertConfig = serde_json::from_str(&config_str)
            .map_err(|e| EmbeddingError::ModelNotFound(format!("Invalid config: {}", e)))?;
        let hidden: HiddenSize = serde_json::from_str(&config_str)
            .map_err(|e| EmbeddingError::ModelNotFound(format!("Invalid config: {}", e)))?;

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path.to_path_buf()], DType::F32, &device)?
        };

        let model = BertModel::load(vb, &config)?;

        info!(
            model = name,
            dim = hidden.hidden_size,
            max_seq = MAX_SEQ_LENGTH,
            "Model loaded successfully"
        );

        Ok(Self {
            model,
            tokenizer,
            device,
            info: ModelInfo {
                name: name.to_string(),
                dimension: hidden.hidden_size,
                max_sequence_length: MAX_SEQ_LENGTH,
            },
        })
    }

    /// Mean pooling over token embeddings (excluding padding)
    fn mean_pooling(
        &self,
        embeddings: &Tensor,
        attention_mask: &Tensor,
    ) -> Result<Tensor, EmbeddingError> {
        let mask = attention_mask
            .unsqueeze(2)?
            .broadcast_as(embeddings.shape())?;
        let mask_f32 = mask.to_dtype(DType::F32)?;

        let masked = embeddings.broadcast_mul(&mask_f32)?;
        let sum = masked.sum(1)?;

        let mask_sum = mask_f32.sum(1)?;
        let mask_sum = mask_sum.clamp(1e-9, f64::MAX)?;

        let mean = sum.broadcast_div(&mask_sum)?;
        Ok(mean)
    }
}

impl EmbeddingModel for CandleEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn embed_batch(
        &self,
        texts: &[&str],
        normalize: bool,
    ) -> Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!(count = texts.len(), "Embedding batch");

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(MAX_SEQ_LENGTH);

        let mut input_ids: Vec<Vec<u32>> = Vec::with_capacity(encodings.len());
        let mut attention_masks: Vec<Vec<u32>> = Vec::with_capacity(encodings.len());

        for encoding in &encodings {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();

            let truncated_len = ids.len().min(max_len);
            let mut padded_ids = ids[..truncated_len].to_vec();
            let mut padded_mask = mask[..truncated_len].to_vec();

            padded_ids.resize(max_len, 0);
            padded_mask.resize(max_len, 0);

            input_ids.push(padded_ids);
            attention_masks.push(padded_mask);
        }

        let batch_size = texts.len();
        let input_ids_flat: Vec<u32> = input_ids.into_iter().flatten().collect();
        let mask_flat: Vec<u32> = attention_masks.into_iter().flatten().collect();

        let input_ids = Tensor::from_vec(input_ids_flat, (batch_size, max_len), &self.device)?;
        let attention_mask = Tensor::from_vec(mask_flat, (batch_size, max_len), &self.device)?;
        let token_type_ids = Tensor::zeros_like(&input_ids)?;

        let output = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

        let pooled = self.mean_pooling(&output, &attention_mask)?;
        let pooled_vec: Vec<Vec<f32>> = pooled.to_vec2()?;

        let embeddings: Vec<Embedding> = pooled_vec
            .into_iter()
            .map(|values| Embedding::with_normalization(values, normalize))
            .collect();

        debug!(
            count = embeddings.len(),
            dim = self.info.dimension,
            "Batch complete"
        );

        Ok(embeddings)
    }
}

/// Loads [`CandleEmbedder`]s through a hub cache directory.
#[derive(Debug, Clone)]
pub struct CandleLoader {
    cache_dir: PathBuf,
    revision: Option<String>,
}

impl CandleLoader {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            revision: None,
        }
    }

    /// Pin every loaded model to `revision`.
    pub fn with_revision(mut self, revision: Option<String>) -> Self {
        self.revision = revision;
        self
    }

    /// Where `model_name` resolves from.
    pub fn source(&self, model_name: &str) -> ModelSource {
        let source = ModelSource::new(model_name).with_cache_dir(self.cache_dir.clone());
        match &self.revision {
            Some(revision) => source.with_revision(revision.clone()),
            None => source,
        }
    }
}

impl Default for CandleLoader {
    fn default() -> Self {
        Self::new(default_cache_dir())
    }
}

impl ModelLoader for CandleLoader {
    fn load(&self, model_name: &str) -> Result<Arc<dyn EmbeddingModel>, EmbeddingError> {
        Ok(Arc::new(CandleEmbedder::load(&self.source(model_name))?))
    }
}
