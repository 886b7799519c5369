//! Memory and Connection types.
//!
//! A Memory is the retrievable unit of knowledge. A Connection is a Memory of
//! kind `associative` that additionally links two other Memories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Something that happened (sessions, conversations)
    Episodic,
    /// Facts and concepts
    Semantic,
    /// How-to knowledge
    Procedural,
    /// Links between other memories
    Associative,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Episodic => "episodic",
            MemoryKind::Semantic => "semantic",
            MemoryKind::Procedural => "procedural",
            MemoryKind::Associative => "associative",
        }
    }

    /// Parse from string, returning None for unknown kinds.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "episodic" => Some(MemoryKind::Episodic),
            "semantic" => Some(MemoryKind::Semantic),
            "procedural" => Some(MemoryKind::Procedural),
            "associative" => Some(MemoryKind::Associative),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown memory kind: {}", s))
    }
}

/// Structured content record (session summaries, concept descriptions).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_points: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_steps: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl StructuredContent {
    /// Session-style content: summary plus key points and next steps.
    pub fn session(
        summary: impl Into<String>,
        key_points: Vec<String>,
        next_steps: Vec<String>,
    ) -> Self {
        Self {
            summary: Some(summary.into()),
            key_points,
            next_steps,
            description: None,
        }
    }
}

/// Memory content.
///
/// Content arrives as a plain string, a structured record, or a string that
/// holds a JSON object. All three are reduced to canonical text before
/// embedding.
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryContent {
    Plain(String),
    Structured(StructuredContent),
    /// A string whose trimmed form parses as a JSON object.
    RawJson(String),
}

impl MemoryContent {
    /// Classify free text: JSON objects become `RawJson`, everything else `Plain`.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let trimmed = text.trim_start();
        if trimmed.starts_with('{') {
            if let Ok(Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
                return MemoryContent::RawJson(text);
            }
        }
        MemoryContent::Plain(text)
    }

    /// The text stored in the index's `content` field.
    pub fn primary_text(&self) -> &str {
        match self {
            MemoryContent::Plain(s) | MemoryContent::RawJson(s) => s,
            MemoryContent::Structured(s) => s
                .summary
                .as_deref()
                .or(s.description.as_deref())
                .unwrap_or(""),
        }
    }

    pub fn as_structured(&self) -> Option<&StructuredContent> {
        match self {
            MemoryContent::Structured(s) => Some(s),
            _ => None,
        }
    }
}

impl Default for MemoryContent {
    fn default() -> Self {
        MemoryContent::Plain(String::new())
    }
}

/// Relationship carried by an associative memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub source_id: String,
    pub target_id: String,
    pub relationship_type: String,
    /// Clamped to [0, 1]
    pub strength: f32,
}

impl Connection {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relationship_type: impl Into<String>,
        strength: f32,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            relationship_type: relationship_type.into(),
            strength: clamp_unit(strength),
        }
    }
}

/// A retrievable unit of knowledge.
#[derive(Debug, Clone, PartialEq)]
pub struct Memory {
    pub id: String,
    pub kind: MemoryKind,
    pub title: String,
    pub content: MemoryContent,
    pub embedding: Vec<f32>,
    /// Deduplicated, insertion ordered
    pub tags: Vec<String>,
    /// Clamped to [0, 1]
    pub confidence: f32,
    pub access_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    /// Episodic memories produced from a session
    pub session_id: Option<String>,
    /// Present on associative memories
    pub connection: Option<Connection>,
    pub metadata: Map<String, Value>,
}

impl Memory {
    /// Create a new memory with fresh timestamps.
    ///
    /// New memories start with `access_count = 1` and `confidence = 1.0`;
    /// the embedding is filled in by the caller before the memory is stored.
    pub fn new(
        id: impl Into<String>,
        kind: MemoryKind,
        title: impl Into<String>,
        content: MemoryContent,
    ) -> Self {
        let now = Utc::now();
        let mut memory = Self {
            id: id.into(),
            kind,
            title: title.into(),
            content,
            embedding: Vec::new(),
            tags: Vec::new(),
            confidence: 1.0,
            access_count: 1,
            created_at: now,
            updated_at: now,
            last_accessed: now,
            session_id: None,
            connection: None,
            metadata: Map::new(),
        };
        memory.sync_metadata();
        memory
    }

    /// Generate an id of the form `{prefix}_{ulid}`.
    pub fn generate_id(prefix: &str) -> String {
        format!("{}_{}", prefix, ulid::Ulid::new().to_string().to_lowercase())
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_tags(tags);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_connection(mut self, connection: Connection) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = clamp_unit(confidence);
        self.sync_metadata();
        self
    }

    /// Merge caller metadata over the current map. The mirrored counters
    /// always win so they stay consistent with the top-level fields.
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        for (key, value) in metadata {
            self.metadata.insert(key, value);
        }
        self.sync_metadata();
        self
    }

    /// Record where the memory came from (`metadata.source`).
    pub fn with_source(mut self, source: &str) -> Self {
        self.metadata
            .entry("source")
            .or_insert_with(|| Value::String(source.to_string()));
        self
    }

    pub fn set_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.clear();
        for tag in tags {
            let tag = tag.into();
            let tag = tag.trim();
            if !tag.is_empty() && !self.tags.iter().any(|t| t == tag) {
                self.tags.push(tag.to_string());
            }
        }
    }

    /// Mirror confidence and access_count into metadata.
    pub fn sync_metadata(&mut self) {
        self.metadata
            .insert("confidence".to_string(), Value::from(self.confidence as f64));
        self.metadata
            .insert("access_count".to_string(), Value::from(self.access_count));
    }

    /// Mark the memory as modified now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn is_connection(&self) -> bool {
        self.kind == MemoryKind::Associative && self.connection.is_some()
    }
}

/// Clamp a score-like value into [0, 1]; NaN becomes 0.
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
