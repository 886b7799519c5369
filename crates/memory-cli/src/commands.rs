//! Command implementations for slarglebart.
//!
//! Each command runs one memory operation and renders its outcome as text.
//! Pending access-stat updates are flushed before the process exits.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info};

use memory_search::{parse_timestamp, TimeRange};
use memory_service::{
    format_memory, format_search_results, format_session, MemoryService, MemoryUpdate,
    NewConnection, NewMemory, NewSession, SearchRequest,
};
use memory_types::{MemoryContent, Settings};

use crate::cli::{Cli, Commands};

/// Load configuration and apply CLI overrides (highest precedence).
pub fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings =
        Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    apply_overrides(&mut settings, cli);
    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

fn apply_overrides(settings: &mut Settings, cli: &Cli) {
    if let Some(log_level) = &cli.log_level {
        settings.log_level = log_level.clone();
    }
    if let Some(index) = &cli.index {
        settings.index.memory_index = index.clone();
    }
}

/// Install the global tracing subscriber. Logs go to stderr so command
/// output on stdout stays clean.
pub fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Run a parsed command line end to end.
pub async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(&cli)?;
    init_logging(&settings.log_level)?;

    if let Commands::Config = cli.command {
        println!("{}", render_config(&settings)?);
        return Ok(());
    }

    let service = MemoryService::connect(settings).context("Failed to set up memory service")?;
    let result = execute(&service, cli.command).await;
    service.flush_access_updates().await;
    println!("{}", result?);
    Ok(())
}

/// Effective configuration as TOML. The password is never serialized.
pub fn render_config(settings: &Settings) -> Result<String> {
    toml::to_string_pretty(settings).context("Failed to render configuration")
}

/// Execute one command against `service` and return its text output.
pub async fn execute(service: &MemoryService, command: Commands) -> Result<String> {
    debug!(?command, "Executing command");
    match command {
        Commands::Init => {
            let status = service
                .initialize()
                .await
                .context("Failed to initialize memory index")?;
            info!(%status, "Memory system initialized");
            Ok(format!(
                "Memory index {}: {}",
                service.memory_index(),
                status
            ))
        }

        Commands::Store {
            title,
            content,
            kind,
            tags,
            id,
            metadata,
        } => {
            let mut request = NewMemory::new(kind, title, MemoryContent::from_text(content))
                .with_tags(tags);
            if let Some(id) = id {
                request = request.with_id(id);
            }
            if let Some(raw) = metadata {
                request = request.with_metadata(parse_metadata(&raw)?);
            }
            let memory = service
                .store_memory(request)
                .await
                .context("Failed to store memory")?;
            Ok(format!("Stored {} memory {}", memory.kind, memory.id))
        }

        Commands::Session {
            session_id,
            title,
            summary,
            key_points,
            next_steps,
            tags,
        } => {
            let request = NewSession::new(session_id, title, summary)
                .with_key_points(key_points)
                .with_next_steps(next_steps)
                .with_tags(tags);
            let memory = service
                .store_session_memory(request)
                .await
                .context("Failed to store session memory")?;
            Ok(format!("Stored session memory {}", memory.id))
        }

        Commands::Connect {
            source_id,
            target_id,
            relationship,
            description,
            strength,
            tags,
        } => {
            let request = NewConnection::new(source_id, target_id, relationship, description)
                .with_strength(strength)
                .with_tags(tags);
            let memory = service
                .create_connection(request)
                .await
                .context("Failed to create connection")?;
            Ok(format!("Created connection {}", memory.id))
        }

        Commands::Search {
            query,
            kind,
            size,
            min_score,
            from,
            to,
        } => {
            let mut request = SearchRequest::new(query);
            request.kind = kind;
            request.size = size;
            request.min_score = min_score;
            if from.is_some() || to.is_some() {
                let gte = from.as_deref().map(|s| parse_time(s, false)).transpose()?;
                let lte = to.as_deref().map(|s| parse_time(s, true)).transpose()?;
                request = request.with_time_range(TimeRange::new(gte, lte));
            }
            let results = service
                .semantic_search(request)
                .await
                .context("Failed to search memories")?;
            Ok(format_search_results(&results))
        }

        Commands::LastSession => {
            let session = service
                .get_last_session_memory()
                .await
                .context("Failed to retrieve last session memory")?;
            Ok(match session {
                Some(memory) => format_session(&memory),
                None => "No session memories found.".to_string(),
            })
        }

        Commands::Get { id } => {
            let memory = service
                .get_memory(&id)
                .await
                .context("Failed to fetch memory")?;
            match memory {
                Some(memory) => Ok(format_memory(&memory)),
                None => bail!("Memory {} not found", id),
            }
        }

        Commands::Update {
            id,
            title,
            content,
            tags,
            confidence,
            metadata,
        } => {
            let update = MemoryUpdate {
                title,
                content: content.map(MemoryContent::from_text),
                tags,
                confidence,
                metadata: metadata.as_deref().map(parse_metadata).transpose()?,
            };
            let memory = service
                .update_memory(&id, update)
                .await
                .context("Failed to update memory")?;
            Ok(format!("Updated memory {}", memory.id))
        }

        Commands::Config => render_config(service.settings()),
    }
}

/// Parse a JSON object argument.
fn parse_metadata(raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw).context("metadata is not valid JSON")? {
        Value::Object(map) => Ok(map),
        _ => bail!("metadata must be a JSON object"),
    }
}

/// Parse an RFC 3339 timestamp or a bare date. A bare date used as an upper
/// bound covers the whole day.
fn parse_time(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    if let Some(ts) = parse_timestamp(raw) {
        return Ok(ts);
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("Invalid time '{}', expected RFC 3339 or YYYY-MM-DD", raw))?;
    let time = if end_of_day {
        date.and_hms_micro_opt(23, 59, 59, 999_999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    match time {
        Some(naive) => Ok(naive.and_utc()),
        None => bail!("Invalid time '{}'", raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_metadata() {
        let map = parse_metadata(r#"{"project":"atlas"}"#).unwrap();
        assert_eq!(map["project"], "atlas");
        assert!(parse_metadata("[1,2]").is_err());
        assert!(parse_metadata("not json").is_err());
    }

    #[test]
    fn test_parse_time() {
        let start = parse_time("2024-05-01", false).unwrap();
        assert_eq!(start.to_rfc3339(), "2024-05-01T00:00:00+00:00");
        let end = parse_time("2024-05-01", true).unwrap();
        assert!(end > start);
        assert_eq!(end.date_naive(), start.date_naive());
        let exact = parse_time("2024-05-01T10:30:00Z", true).unwrap();
        assert_eq!(exact.to_rfc3339(), "2024-05-01T10:30:00+00:00");
        assert!(parse_time("yesterday", false).is_err());
    }

    #[test]
    fn test_overrides_take_precedence() {
        let cli = Cli::parse_from([
            "slarglebart",
            "--index",
            "other_index",
            "--log-level",
            "trace",
            "config",
        ]);
        let mut settings = Settings::default();
        apply_overrides(&mut settings, &cli);
        assert_eq!(settings.index.memory_index, "other_index");
        assert_eq!(settings.log_level, "trace");
    }

    #[test]
    fn test_render_config_hides_password() {
        let mut settings = Settings::default();
        settings.opensearch.password = Some("hunter2".into());
        let rendered = render_config(&settings).unwrap();
        assert!(rendered.contains("slarglebart_memories_v2"));
        assert!(!rendered.contains("hunter2"));
    }
}
