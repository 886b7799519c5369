//! # memory-embeddings
//!
//! Text-to-vector conversion for the memory engine.
//!
//! ## Features
//! - Local inference via Candle (BERT-family sentence encoders)
//! - Feature-hashing embedder for offline use and tests
//! - One shared model per process, loaded on first use
//! - Memory-to-text normalization for embedding input
//! - Model files resolved through the Hugging Face hub cache, with
//!   revision pinning

pub mod candle;
pub mod error;
pub mod generator;
pub mod hash;
pub mod hub;
pub mod model;
pub mod text;

pub use crate::candle::{CandleEmbedder, CandleLoader};
pub use error::EmbeddingError;
pub use generator::{
    truncate_chars, EmbeddingGenerator, ModelLoader, MAX_INPUT_CHARS, MAX_SEQUENCE_LENGTH,
};
pub use hash::{HashEmbedder, HashLoader};
pub use hub::{
    default_cache_dir, ModelPaths, ModelSource, DEFAULT_MODEL_REPO, DEFAULT_REVISION,
};
pub use model::{cosine_similarity, Embedding, EmbeddingModel, ModelInfo};
pub use text::{connection_embedding_text, prepare_text_for_embedding};
