//! Plain-text rendering of memories for terminal output.

use memory_search::format_timestamp;
use memory_types::{Memory, MemoryKind};

use crate::search::ScoredMemory;

/// Shown when a search keeps no hits.
pub const NO_RESULTS: &str = "No memories found matching the query.";

/// Render search results, one block per hit, numbered from 1.
pub fn format_search_results(results: &[ScoredMemory]) -> String {
    if results.is_empty() {
        return NO_RESULTS.to_string();
    }
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format_hit(i + 1, &r.memory, r.score))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn format_hit(position: usize, memory: &Memory, score: f32) -> String {
    let created = format_timestamp(&memory.created_at);
    let content = memory.content.primary_text();

    match (memory.kind, memory.connection.as_ref()) {
        (MemoryKind::Associative, Some(connection)) => format!(
            "Connection {}: {} (Score: {:.2})\n\
             Type: {}\n\
             Relationship: {}\n\
             Description: {}\n\
             From: {} To: {}\n\
             Strength: {}\n\
             Created: {}\n\
             ID: {}\n",
            position,
            memory.title,
            score,
            memory.kind,
            connection.relationship_type,
            content,
            connection.source_id,
            connection.target_id,
            connection.strength,
            created,
            memory.id,
        ),
        (MemoryKind::Episodic, _) => {
            let key_points = memory
                .content
                .as_structured()
                .map(|s| s.key_points.join(", "))
                .unwrap_or_default();
            format!(
                "Memory {}: {} (Score: {:.2})\n\
                 Type: {}\n\
                 Content: {}\n\
                 Key Points: {}\n\
                 Created: {}\n\
                 Tags: {}\n\
                 ID: {}\n",
                position,
                memory.title,
                score,
                memory.kind,
                content,
                key_points,
                created,
                memory.tags.join(", "),
                memory.id,
            )
        }
        _ => format!(
            "Memory {}: {} (Score: {:.2})\n\
             Type: {}\n\
             Content: {}\n\
             Created: {}\n\
             Tags: {}\n\
             ID: {}\n",
            position,
            memory.title,
            score,
            memory.kind,
            content,
            created,
            memory.tags.join(", "),
            memory.id,
        ),
    }
}

/// Render a session memory with its summary, key points and next steps.
pub fn format_session(memory: &Memory) -> String {
    let structured = memory.content.as_structured();
    let summary = match structured.and_then(|s| s.summary.as_deref()) {
        Some(summary) => summary,
        None => memory.content.primary_text(),
    };
    let bullets = |items: Option<&Vec<String>>| {
        items
            .map(|items| {
                items
                    .iter()
                    .map(|item| format!("- {}", item))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default()
    };

    format!(
        "Session: {}\nDate: {}\n\nSummary: {}\n\nKey Points:\n{}\n\nNext Steps:\n{}",
        memory.title,
        format_timestamp(&memory.created_at),
        summary,
        bullets(structured.map(|s| &s.key_points)),
        bullets(structured.map(|s| &s.next_steps)),
    )
}

/// Render a single memory with its bookkeeping fields.
pub fn format_memory(memory: &Memory) -> String {
    let mut lines = vec![
        format!("ID: {}", memory.id),
        format!("Title: {}", memory.title),
        format!("Type: {}", memory.kind),
        format!("Content: {}", memory.content.primary_text()),
    ];
    if let Some(structured) = memory.content.as_structured() {
        if !structured.key_points.is_empty() {
            lines.push(format!("Key Points: {}", structured.key_points.join(", ")));
        }
        if !structured.next_steps.is_empty() {
            lines.push(format!("Next Steps: {}", structured.next_steps.join(", ")));
        }
    }
    if let Some(connection) = &memory.connection {
        lines.push(format!(
            "Connection: {} -[{} {:.2}]-> {}",
            connection.source_id,
            connection.relationship_type,
            connection.strength,
            connection.target_id
        ));
    }
    if let Some(session_id) = &memory.session_id {
        lines.push(format!("Session ID: {}", session_id));
    }
    lines.push(format!("Tags: {}", memory.tags.join(", ")));
    lines.push(format!("Confidence: {:.2}", memory.confidence));
    lines.push(format!("Access Count: {}", memory.access_count));
    lines.push(format!("Created: {}", format_timestamp(&memory.created_at)));
    lines.push(format!("Updated: {}", format_timestamp(&memory.updated_at)));
    lines.push(format!("Last Accessed: {}", format_timestamp(&memory.last_accessed)));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_types::{Connection, MemoryContent, StructuredContent};

    fn session() -> Memory {
        Memory::new(
            "session_1",
            MemoryKind::Episodic,
            "Planning",
            MemoryContent::Structured(StructuredContent::session(
                "Discussed the roadmap",
                vec!["ship search".into(), "fix tags".into()],
                vec!["write docs".into()],
            )),
        )
        .with_tags(["planning"])
    }

    #[test]
    fn test_empty_results() {
        assert_eq!(format_search_results(&[]), NO_RESULTS);
    }

    #[test]
    fn test_episodic_hit_layout() {
        let out = format_search_results(&[ScoredMemory {
            memory: session(),
            score: 0.876,
        }]);
        assert!(out.starts_with("Memory 1: Planning (Score: 0.88)\nType: episodic\n"));
        assert!(out.contains("Content: Discussed the roadmap\n"));
        assert!(out.contains("Key Points: ship search, fix tags\n"));
        assert!(out.contains("Tags: planning\n"));
        assert!(out.ends_with("ID: session_1\n"));
    }

    #[test]
    fn test_connection_hit_layout() {
        let memory = Memory::new(
            "connection_1",
            MemoryKind::Associative,
            "Connection: supports",
            MemoryContent::Plain("evidence".into()),
        )
        .with_connection(Connection::new("a", "b", "supports", 0.5));
        let out = format_search_results(&[
            ScoredMemory {
                memory: session(),
                score: 0.9,
            },
            ScoredMemory { memory, score: 0.5 },
        ]);
        let blocks: Vec<&str> = out.split("\n\n").collect();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[1].starts_with("Connection 2: Connection: supports (Score: 0.50)"));
        assert!(blocks[1].contains("Relationship: supports\n"));
        assert!(blocks[1].contains("Description: evidence\n"));
        assert!(blocks[1].contains("From: a To: b\n"));
        assert!(blocks[1].contains("Strength: 0.5\n"));
    }

    #[test]
    fn test_session_layout() {
        let out = format_session(&session());
        assert!(out.starts_with("Session: Planning\nDate: "));
        assert!(out.contains("\n\nSummary: Discussed the roadmap\n\n"));
        assert!(out.contains("Key Points:\n- ship search\n- fix tags\n\n"));
        assert!(out.ends_with("Next Steps:\n- write docs"));
    }

    #[test]
    fn test_plain_session_content() {
        let memory = Memory::new(
            "session_2",
            MemoryKind::Episodic,
            "Old",
            MemoryContent::Plain("flat summary".into()),
        );
        let out = format_session(&memory);
        assert!(out.contains("Summary: flat summary"));
        assert!(out.ends_with("Next Steps:\n"));
    }

    #[test]
    fn test_memory_details() {
        let out = format_memory(&session().with_session("s-42"));
        assert!(out.contains("Session ID: s-42"));
        assert!(out.contains("Next Steps: write docs"));
        assert!(out.contains("Access Count: 1"));
    }
}
