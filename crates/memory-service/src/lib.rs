//! Memory operations for the slarglebart memory engine.
//!
//! Provides:
//! - Storing plain, session and connection memories
//! - Hybrid semantic/keyword search with access tracking
//! - Most recent session lookup with legacy index fallback
//! - Schema bootstrap for the memory index
//! - Plain-text rendering for the CLI

pub mod bootstrap;
pub mod format;
pub mod graph;
pub mod requests;
pub mod search;
pub mod service;

pub use bootstrap::{build_embeddings, SchemaStatus};
pub use format::{format_memory, format_search_results, format_session};
pub use requests::{MemoryUpdate, NewConnection, NewMemory, NewSession, SearchRequest};
pub use search::ScoredMemory;
pub use service::MemoryService;
