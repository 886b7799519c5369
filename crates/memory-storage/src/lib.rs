//! Storage layer for the memory engine.
//!
//! Provides the [`MemoryStore`] seam with two implementations:
//! - [`OpenSearchStore`]: REST client for a real cluster, with retries
//! - [`InMemoryStore`]: in-process evaluator for tests and offline runs
//!
//! plus the [`AccessTracker`] that applies access-stat updates off the read
//! path.

pub mod error;
pub mod in_memory;
pub mod opensearch;
pub mod store;
pub mod usage;

pub use error::StorageError;
pub use in_memory::InMemoryStore;
pub use opensearch::{OpenSearchConfig, OpenSearchStore};
pub use store::{MemoryStore, SearchHit, SearchResponse};
pub use usage::AccessTracker;
