//! Connections between memories.
//!
//! A connection is itself an associative memory, searchable like any other.
//! Both endpoints are checked before the write, but the check and the write
//! are separate requests: an endpoint deleted in between leaves a dangling
//! connection. The store offers no cross-document precondition to close
//! that gap.

use tracing::{info, warn};

use memory_embeddings::connection_embedding_text;
use memory_types::{Connection, Memory, MemoryContent, MemoryError, MemoryKind};

use crate::requests::NewConnection;
use crate::service::{resolve_id, MemoryService};

/// Metadata source recorded on connections.
pub const SOURCE_CONNECTION: &str = "explicit_connection";

impl MemoryService {
    /// Link two stored memories.
    ///
    /// Fails with a validation error naming every missing endpoint; nothing
    /// is written in that case.
    pub async fn create_connection(&self, request: NewConnection) -> Result<Memory, MemoryError> {
        let relationship = request.relationship_type.trim().to_string();
        if relationship.is_empty() {
            return Err(MemoryError::Validation("relationship_type is required".into()));
        }
        if request.source_id.trim().is_empty() || request.target_id.trim().is_empty() {
            return Err(MemoryError::Validation(
                "source_id and target_id are required".into(),
            ));
        }
        let id = resolve_id(request.id, "connection")?;

        let index = self.memory_index();
        let (source_exists, target_exists) = tokio::join!(
            self.store.exists(index, &request.source_id),
            self.store.exists(index, &request.target_id)
        );

        let mut missing = Vec::new();
        if !source_exists? {
            missing.push(format!("Source memory {} not found", request.source_id));
        }
        if !target_exists? {
            missing.push(format!("Target memory {} not found", request.target_id));
        }
        if !missing.is_empty() {
            warn!(
                source_id = %request.source_id,
                target_id = %request.target_id,
                "Connection endpoints missing"
            );
            return Err(MemoryError::Validation(format!(
                "Cannot create connection - {}",
                missing.join(", ")
            )));
        }

        let text = connection_embedding_text(
            &relationship,
            &request.description,
            &request.source_id,
            &request.target_id,
        );
        let connection = Connection::new(
            request.source_id,
            request.target_id,
            relationship.clone(),
            request.strength,
        );
        let memory = Memory::new(
            id,
            MemoryKind::Associative,
            format!("Connection: {}", relationship),
            MemoryContent::Plain(request.description),
        )
        .with_connection(connection)
        .with_tags(request.tags)
        .with_source(SOURCE_CONNECTION);

        let embedding = self.embeddings.generate(&text).await;
        let memory = self.write_with_embedding(memory, embedding).await?;
        info!(
            id = %memory.id,
            relationship = %relationship,
            "Created connection"
        );
        Ok(memory)
    }
}
