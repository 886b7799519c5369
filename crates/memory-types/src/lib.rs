//! # memory-types
//!
//! Shared domain types for the associative memory system.
//!
//! This crate defines the core data structures used throughout the system:
//! - Memory: the retrievable unit of knowledge, with tagged content
//! - Connection: the relationship carried by associative memories
//! - Usage: access statistics bumped on read
//! - Settings: layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use memory_types::{Memory, MemoryContent, MemoryKind};
//!
//! let memory = Memory::new(
//!     Memory::generate_id("memory"),
//!     MemoryKind::Semantic,
//!     "Rust ownership",
//!     MemoryContent::from_text("Each value has exactly one owner."),
//! );
//! assert_eq!(memory.access_count, 1);
//! ```

pub mod config;
pub mod error;
pub mod memory;
pub mod usage;

pub use config::{
    EmbeddingProvider, EmbeddingSettings, IndexSettings, OpenSearchSettings, SearchSettings,
    Settings, DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL, DEFAULT_LEGACY_INDEX,
    DEFAULT_MEMORY_INDEX,
};
pub use error::MemoryError;
pub use memory::{clamp_unit, Connection, Memory, MemoryContent, MemoryKind, StructuredContent};
pub use usage::{access_prefix, apply_access_to_document, DEFAULT_ACCESS_UPDATE_LIMIT};
