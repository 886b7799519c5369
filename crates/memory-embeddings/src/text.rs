//! Memory-to-text normalization for embedding input.

use serde_json::Value;

use memory_types::{Memory, MemoryContent, StructuredContent};

/// Flatten a memory into one whitespace-joined string.
///
/// Order: title, then content, then tags. Structured content contributes
/// its summary, key points and description; JSON text contributes its
/// top-level string values in key order. A memory with nothing to say
/// falls back to `"{id} {kind}"`.
pub fn prepare_text_for_embedding(memory: &Memory) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !memory.title.is_empty() {
        parts.push(memory.title.clone());
    }

    match &memory.content {
        MemoryContent::Plain(text) => {
            if !text.is_empty() {
                parts.push(text.clone());
            }
        }
        MemoryContent::Structured(structured) => push_structured(&mut parts, structured),
        MemoryContent::RawJson(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => {
                parts.extend(
                    map.values()
                        .filter_map(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                );
            }
            _ => {
                if !raw.is_empty() {
                    parts.push(raw.clone());
                }
            }
        },
    }

    if !memory.tags.is_empty() {
        parts.push(memory.tags.join(" "));
    }

    let text = parts.join(" ").trim().to_string();
    if text.is_empty() {
        format!("{} {}", memory.id, memory.kind)
    } else {
        text
    }
}

fn push_structured(parts: &mut Vec<String>, structured: &StructuredContent) {
    if let Some(summary) = structured.summary.as_deref().filter(|s| !s.is_empty()) {
        parts.push(summary.to_string());
    }
    if !structured.key_points.is_empty() {
        parts.push(structured.key_points.join(" "));
    }
    if let Some(description) = structured.description.as_deref().filter(|s| !s.is_empty()) {
        parts.push(description.to_string());
    }
}

/// Embedding input for an associative memory.
pub fn connection_embedding_text(
    relationship_type: &str,
    description: &str,
    source_id: &str,
    target_id: &str,
) -> String {
    format!(
        "{} {} connection from {} to {}",
        relationship_type, description, source_id, target_id
    )
}
