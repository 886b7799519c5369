//! # memory-search
//!
//! Search-side wire forms for the memory index: hybrid query bodies,
//! the index mapping, and the `Memory` <-> document codec.
//!
//! Everything here is pure JSON construction; talking to the store is
//! `memory-storage`'s job.

pub mod document;
pub mod query;
pub mod schema;

pub use document::{
    document_to_memory, memory_to_document, parse_timestamp, ContentFormat, MemoryDocument,
};
pub use query::{
    blend_score, format_timestamp, latest_by_kind_query, HybridQueryBuilder, TimeRange,
    ACCESS_UPDATE_SCRIPT, HYBRID_SCORE_SCRIPT, KEYWORD_FIELDS, KEYWORD_SCORE_SCRIPT,
    KNN_CANDIDATE_FACTOR, MAX_KNN_K, MAX_SEARCH_SIZE,
};
pub use schema::{
    has_vector_field, memory_index_body, vector_dimension, CREATED_AT_FIELD, EMBEDDING_FIELD,
    ID_FIELD, KIND_FIELD, VECTOR_FIELD_TYPE,
};
