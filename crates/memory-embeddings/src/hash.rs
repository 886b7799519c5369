//! Feature-hashing embedder.
//!
//! Maps lowercase word unigrams and bigrams into a fixed number of signed
//! buckets. No model files, fully deterministic, and texts sharing words
//! land close together. Used for offline runs and tests.

use std::sync::Arc;

use crate::error::EmbeddingError;
use crate::generator::ModelLoader;
use crate::model::{Embedding, EmbeddingModel, ModelInfo};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Deterministic bag-of-words embedder.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    info: ModelInfo,
}

impl HashEmbedder {
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            info: ModelInfo {
                name: name.into(),
                dimension,
                max_sequence_length: usize::MAX,
            },
        }
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let dim = self.info.dimension;
        let mut values = vec![0.0f32; dim];
        if dim == 0 {
            return values;
        }

        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();

        for token in &tokens {
            add_feature(&mut values, token.as_bytes(), 1.0);
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            add_feature(&mut values, bigram.as_bytes(), 0.5);
        }
        values
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

fn add_feature(values: &mut [f32], feature: &[u8], weight: f32) {
    let hash = fnv1a(feature);
    let bucket = (hash % values.len() as u64) as usize;
    let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
    values[bucket] += sign * weight;
}

impl EmbeddingModel for HashEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn embed_batch(
        &self,
        texts: &[&str],
        normalize: bool,
    ) -> Result<Vec<Embedding>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|text| Embedding::with_normalization(self.encode(text), normalize))
            .collect())
    }
}

/// Builds [`HashEmbedder`]s of a fixed dimension for any model name.
#[derive(Debug, Clone)]
pub struct HashLoader {
    dimension: usize,
}

impl HashLoader {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl ModelLoader for HashLoader {
    fn load(&self, model_name: &str) -> Result<Arc<dyn EmbeddingModel>, EmbeddingError> {
        if self.dimension == 0 {
            return Err(EmbeddingError::InvalidInput(
                "hash embedder dimension must be positive".into(),
            ));
        }
        Ok(Arc::new(HashEmbedder::new(model_name, self.dimension)))
    }
}
