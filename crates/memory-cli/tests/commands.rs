//! Commands executed against the in-process store.

use std::io::Write;
use std::sync::Arc;

use clap::Parser;

use memory_cli::{execute, load_settings, Cli, Commands};
use memory_service::{build_embeddings, MemoryService};
use memory_storage::InMemoryStore;
use memory_types::{EmbeddingProvider, Settings};

fn service() -> MemoryService {
    let mut settings = Settings::default();
    settings.embedding.provider = EmbeddingProvider::Hash;
    settings.embedding.dimension = 128;
    let embeddings = build_embeddings(&settings);
    MemoryService::new(settings, Arc::new(InMemoryStore::new()), embeddings)
}

fn command(args: &[&str]) -> Commands {
    let mut argv = vec!["slarglebart"];
    argv.extend_from_slice(args);
    Cli::parse_from(argv).command
}

async fn run(service: &MemoryService, args: &[&str]) -> anyhow::Result<String> {
    let output = execute(service, command(args)).await;
    service.flush_access_updates().await;
    output
}

fn stored_id(output: &str) -> String {
    output
        .split_whitespace()
        .last()
        .map(str::to_string)
        .unwrap_or_default()
}

#[tokio::test]
async fn init_reports_schema_status() {
    let service = service();
    let first = run(&service, &["init"]).await.unwrap();
    assert_eq!(first, "Memory index slarglebart_memories_v2: created");
    let second = run(&service, &["init"]).await.unwrap();
    assert_eq!(second, "Memory index slarglebart_memories_v2: already_valid");
}

#[tokio::test]
async fn store_search_and_get() {
    let service = service();
    run(&service, &["init"]).await.unwrap();

    let out = run(
        &service,
        &[
            "store",
            "Borrow checker",
            "References must not outlive their owner",
            "--tags",
            "rust,compiler",
            "--metadata",
            r#"{"project":"atlas"}"#,
        ],
    )
    .await
    .unwrap();
    assert!(out.starts_with("Stored semantic memory memory_"));
    let id = stored_id(&out);

    let results = run(&service, &["search", "borrow checker"]).await.unwrap();
    assert!(results.starts_with("Memory 1: Borrow checker (Score: "));
    assert!(results.contains("Tags: rust, compiler"));

    let details = run(&service, &["get", &id]).await.unwrap();
    assert!(details.contains("Title: Borrow checker"));
    assert!(details.contains("Access Count: 2"));
}

#[tokio::test]
async fn search_without_hits_says_so() {
    let service = service();
    run(&service, &["init"]).await.unwrap();
    let out = run(&service, &["search", "nothing stored yet"]).await.unwrap();
    assert_eq!(out, "No memories found matching the query.");
}

#[tokio::test]
async fn session_and_last_session() {
    let service = service();
    run(&service, &["init"]).await.unwrap();
    assert_eq!(
        run(&service, &["last-session"]).await.unwrap(),
        "No session memories found."
    );

    let out = run(
        &service,
        &[
            "session",
            "s-7",
            "Retro",
            "Went well overall",
            "--key-point",
            "faster builds",
            "--next-step",
            "cut release",
        ],
    )
    .await
    .unwrap();
    assert!(out.starts_with("Stored session memory session_"));

    let last = run(&service, &["last-session"]).await.unwrap();
    assert!(last.starts_with("Session: Retro\nDate: "));
    assert!(last.contains("Key Points:\n- faster builds"));
    assert!(last.ends_with("Next Steps:\n- cut release"));
}

#[tokio::test]
async fn connect_requires_existing_endpoints() {
    let service = service();
    run(&service, &["init"]).await.unwrap();
    let a = stored_id(&run(&service, &["store", "A", "first"]).await.unwrap());

    let err = run(&service, &["connect", &a, "missing-9", "supports"])
        .await
        .unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("Target memory missing-9 not found"));
    assert!(!message.contains("Source memory"));

    let b = stored_id(&run(&service, &["store", "B", "second"]).await.unwrap());
    let out = run(
        &service,
        &["connect", &a, &b, "supports", "-d", "A backs B", "-s", "0.9"],
    )
    .await
    .unwrap();
    assert!(out.starts_with("Created connection connection_"));
}

#[tokio::test]
async fn update_changes_title() {
    let service = service();
    run(&service, &["init"]).await.unwrap();
    let id = stored_id(&run(&service, &["store", "Old", "body"]).await.unwrap());

    let out = run(&service, &["update", &id, "--title", "New", "--confidence", "0.4"])
        .await
        .unwrap();
    assert_eq!(out, format!("Updated memory {}", id));
    let details = run(&service, &["get", &id]).await.unwrap();
    assert!(details.contains("Title: New"));
    assert!(details.contains("Confidence: 0.40"));

    assert!(run(&service, &["update", &id]).await.is_err());
    assert!(run(&service, &["get", "memory_missing"]).await.is_err());
}

#[tokio::test]
async fn bad_metadata_is_rejected() {
    let service = service();
    let err = run(&service, &["store", "T", "C", "--metadata", "[1]"])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("JSON object"));
}

#[test]
fn config_file_and_flags_layer() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        "[index]\nmemory_index = \"from_file\"\n\n[search]\ndefault_size = 4"
    )
    .unwrap();
    let path = file.path().to_string_lossy().to_string();

    let cli = Cli::parse_from(["slarglebart", "--config", &path, "config"]);
    let settings = load_settings(&cli).unwrap();
    assert_eq!(settings.search.default_size, 4);

    let cli = Cli::parse_from(["slarglebart", "--config", &path, "--index", "from_flag", "config"]);
    let settings = load_settings(&cli).unwrap();
    assert_eq!(settings.index.memory_index, "from_flag");
}
