//! Error types for the memory system.

use thiserror::Error;

/// Unified error type for memory operations.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Malformed request or missing reference (detected before any write)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Embedding model failure surfaced to the caller
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Backing store request failed
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored document could not be decoded into a Memory
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),
}

impl MemoryError {
    /// True for failures reported before anything was written.
    pub fn is_validation(&self) -> bool {
        matches!(self, MemoryError::Validation(_))
    }
}
