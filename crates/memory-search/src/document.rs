//! Document mapping between `Memory` and the stored JSON form.
//!
//! Structured content is flattened: `content` holds the summary while key
//! points, next steps and description become top-level fields so the
//! keyword clause can reach them. `content_format` records which variant
//! was stored. Documents written before `content_format` existed may carry
//! `content` as a nested object and naive timestamps; both still decode.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use memory_types::{
    clamp_unit, Connection, Memory, MemoryContent, MemoryError, MemoryKind, StructuredContent,
};

use crate::query::format_timestamp;

/// How `content` should be read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentFormat {
    Plain,
    Structured,
    Json,
}

/// Stored form of a memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryDocument {
    #[serde(default)]
    pub memory_id: String,
    pub memory_type: String,
    #[serde(default)]
    pub title: String,
    /// A string, or an object in legacy documents
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_format: Option<ContentFormat>,
    #[serde(
        default,
        deserialize_with = "string_or_seq",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub key_points: Vec<String>,
    #[serde(
        default,
        deserialize_with = "string_or_seq",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub next_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f32>,
    #[serde(default)]
    pub embedding: Vec<f32>,
    #[serde(default, deserialize_with = "string_or_seq")]
    pub tags: Vec<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default = "default_access_count")]
    pub access_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

fn default_confidence() -> f32 {
    1.0
}

fn default_access_count() -> u64 {
    1
}

/// Accept `"a"`, `["a", "b"]` or null for list fields.
fn string_or_seq<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => Vec::new(),
        Value::String(s) => vec![s],
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        other => vec![other.to_string()],
    })
}

/// Parse RFC 3339, or a naive ISO-8601 timestamp taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

impl MemoryDocument {
    /// Encode a memory.
    pub fn from_memory(memory: &Memory) -> Self {
        let (content, content_format, key_points, next_steps, description) = match &memory.content
        {
            MemoryContent::Plain(text) => (
                Value::String(text.clone()),
                ContentFormat::Plain,
                Vec::new(),
                Vec::new(),
                None,
            ),
            MemoryContent::RawJson(text) => (
                Value::String(text.clone()),
                ContentFormat::Json,
                Vec::new(),
                Vec::new(),
                None,
            ),
            MemoryContent::Structured(s) => (
                Value::String(s.summary.clone().unwrap_or_default()),
                ContentFormat::Structured,
                s.key_points.clone(),
                s.next_steps.clone(),
                s.description.clone(),
            ),
        };

        let connection = memory.connection.as_ref();

        Self {
            memory_id: memory.id.clone(),
            memory_type: memory.kind.as_str().to_string(),
            title: memory.title.clone(),
            content,
            content_format: Some(content_format),
            key_points,
            next_steps,
            description,
            session_id: memory.session_id.clone(),
            source_id: connection.map(|c| c.source_id.clone()),
            target_id: connection.map(|c| c.target_id.clone()),
            relationship_type: connection.map(|c| c.relationship_type.clone()),
            strength: connection.map(|c| c.strength),
            embedding: memory.embedding.clone(),
            tags: memory.tags.clone(),
            confidence: memory.confidence,
            access_count: memory.access_count,
            created_at: Some(format_timestamp(&memory.created_at)),
            updated_at: Some(format_timestamp(&memory.updated_at)),
            last_accessed: Some(format_timestamp(&memory.last_accessed)),
            metadata: memory.metadata.clone(),
        }
    }

    /// Decode into a memory.
    pub fn into_memory(self) -> Result<Memory, MemoryError> {
        let kind = MemoryKind::parse(&self.memory_type).ok_or_else(|| {
            MemoryError::InvalidDocument(format!(
                "{}: unknown memory_type '{}'",
                self.memory_id, self.memory_type
            ))
        })?;
        if self.memory_id.is_empty() {
            return Err(MemoryError::InvalidDocument("missing memory_id".into()));
        }

        let content = self.decode_content();

        let created_at = self
            .created_at
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);
        let updated_at = self
            .updated_at
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(created_at);
        let last_accessed = self
            .last_accessed
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(updated_at);

        let connection = match (
            kind,
            self.source_id,
            self.target_id,
            self.relationship_type,
        ) {
            (MemoryKind::Associative, Some(source), Some(target), Some(rel)) => Some(
                Connection::new(source, target, rel, self.strength.unwrap_or(0.5)),
            ),
            _ => None,
        };

        let mut memory = Memory::new(self.memory_id, kind, self.title, content);
        memory.embedding = self.embedding;
        memory.set_tags(self.tags);
        memory.confidence = clamp_unit(self.confidence);
        memory.access_count = self.access_count;
        memory.created_at = created_at;
        memory.updated_at = updated_at;
        memory.last_accessed = last_accessed;
        memory.session_id = self.session_id;
        memory.connection = connection;
        memory.metadata = self.metadata;
        Ok(memory)
    }

    fn decode_content(&self) -> MemoryContent {
        let text = match &self.content {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            Value::Object(obj) => return MemoryContent::Structured(structured_from_object(obj)),
            other => Some(other.to_string()),
        };

        match self.content_format {
            Some(ContentFormat::Plain) => MemoryContent::Plain(text.unwrap_or_default()),
            Some(ContentFormat::Json) => MemoryContent::RawJson(text.unwrap_or_default()),
            Some(ContentFormat::Structured) => MemoryContent::Structured(StructuredContent {
                summary: text.filter(|s| !s.is_empty()),
                key_points: self.key_points.clone(),
                next_steps: self.next_steps.clone(),
                description: self.description.clone(),
            }),
            // Legacy: session documents carry top-level key points or next steps
            None if !self.key_points.is_empty() || !self.next_steps.is_empty() => {
                MemoryContent::Structured(StructuredContent {
                    summary: text.filter(|s| !s.is_empty()),
                    key_points: self.key_points.clone(),
                    next_steps: self.next_steps.clone(),
                    description: self.description.clone(),
                })
            }
            None => MemoryContent::from_text(text.unwrap_or_default()),
        }
    }
}

fn structured_from_object(obj: &Map<String, Value>) -> StructuredContent {
    let text = |key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let list = |key: &str| match obj.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    };
    StructuredContent {
        summary: text("summary"),
        key_points: list("key_points"),
        next_steps: list("next_steps"),
        description: text("description"),
    }
}

/// Encode a memory as a JSON document body.
pub fn memory_to_document(memory: &Memory) -> Result<Value, MemoryError> {
    Ok(serde_json::to_value(MemoryDocument::from_memory(memory))?)
}

/// Decode a stored document. `id` fills in a missing `memory_id`.
pub fn document_to_memory(id: &str, source: &Value) -> Result<Memory, MemoryError> {
    let mut doc: MemoryDocument = serde_json::from_value(source.clone())
        .map_err(|e| MemoryError::InvalidDocument(format!("{}: {}", id, e)))?;
    if doc.memory_id.is_empty() {
        doc.memory_id = id.to_string();
    }
    doc.into_memory()
}
