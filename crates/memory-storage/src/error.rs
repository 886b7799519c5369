//! Storage layer error types.

use thiserror::Error;

use memory_types::MemoryError;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// Request never produced a response (connect, timeout, TLS)
    #[error("HTTP transport error: {0}")]
    Transport(String),

    /// Store answered with a non-success status
    #[error("Store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Target index does not exist
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// Document not found
    #[error("Document not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Query uses a construct the in-process store cannot evaluate
    #[error("Unsupported query: {0}")]
    UnsupportedQuery(String),

    /// Client could not be configured
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// Worth retrying: transport failures, throttling and server errors.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Transport(_) => true,
            StorageError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        StorageError::Transport(err.to_string())
    }
}

impl From<StorageError> for MemoryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => MemoryError::NotFound(id),
            StorageError::Config(msg) => MemoryError::Config(msg),
            other => MemoryError::Store(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StorageError::Transport("reset".into()).is_transient());
        assert!(StorageError::Status { status: 503, body: String::new() }.is_transient());
        assert!(StorageError::Status { status: 429, body: String::new() }.is_transient());
        assert!(!StorageError::Status { status: 400, body: String::new() }.is_transient());
        assert!(!StorageError::IndexNotFound("x".into()).is_transient());
    }

    #[test]
    fn test_into_memory_error() {
        let err: MemoryError = StorageError::NotFound("m1".into()).into();
        assert!(matches!(err, MemoryError::NotFound(id) if id == "m1"));
        let err: MemoryError = StorageError::IndexNotFound("idx".into()).into();
        assert!(matches!(err, MemoryError::Store(_)));
    }
}
