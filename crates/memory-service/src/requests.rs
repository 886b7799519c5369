//! Inputs for the memory operations.

use serde_json::{Map, Value};

use memory_search::TimeRange;
use memory_types::{MemoryContent, MemoryKind};

/// Default strength of a new connection.
pub const DEFAULT_CONNECTION_STRENGTH: f32 = 0.5;

/// A memory to store.
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub kind: MemoryKind,
    pub title: String,
    pub content: MemoryContent,
    /// Generated as `memory_<ulid>` when absent
    pub id: Option<String>,
    pub tags: Vec<String>,
    pub metadata: Map<String, Value>,
}

impl NewMemory {
    pub fn new(kind: MemoryKind, title: impl Into<String>, content: MemoryContent) -> Self {
        Self {
            kind,
            title: title.into(),
            content,
            id: None,
            tags: Vec::new(),
            metadata: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A session summary to store as an episodic memory.
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub session_id: String,
    pub title: String,
    pub summary: String,
    pub key_points: Vec<String>,
    pub next_steps: Vec<String>,
    /// Generated as `session_<ulid>` when absent
    pub id: Option<String>,
    pub tags: Vec<String>,
    pub metadata: Map<String, Value>,
}

impl NewSession {
    pub fn new(
        session_id: impl Into<String>,
        title: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            title: title.into(),
            summary: summary.into(),
            ..Default::default()
        }
    }

    pub fn with_key_points(mut self, key_points: Vec<String>) -> Self {
        self.key_points = key_points;
        self
    }

    pub fn with_next_steps(mut self, next_steps: Vec<String>) -> Self {
        self.next_steps = next_steps;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A directed, typed link between two stored memories.
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub source_id: String,
    pub target_id: String,
    pub relationship_type: String,
    pub description: String,
    /// Clamped to [0, 1] when stored
    pub strength: f32,
    /// Generated as `connection_<ulid>` when absent
    pub id: Option<String>,
    pub tags: Vec<String>,
}

impl NewConnection {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relationship_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            relationship_type: relationship_type.into(),
            description: description.into(),
            strength: DEFAULT_CONNECTION_STRENGTH,
            id: None,
            tags: Vec::new(),
        }
    }

    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = strength;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Hybrid search parameters. Unset values fall back to the search settings.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub kind: Option<MemoryKind>,
    pub time_range: Option<TimeRange>,
    pub size: Option<usize>,
    pub min_score: Option<f32>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_kind(mut self, kind: MemoryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }
}

/// Explicit changes to a stored memory. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct MemoryUpdate {
    pub title: Option<String>,
    pub content: Option<MemoryContent>,
    pub tags: Option<Vec<String>>,
    pub confidence: Option<f32>,
    /// Merged over the existing metadata
    pub metadata: Option<Map<String, Value>>,
}

impl MemoryUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.tags.is_none()
            && self.confidence.is_none()
            && self.metadata.is_none()
    }
}
