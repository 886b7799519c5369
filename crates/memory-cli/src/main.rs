//! Slarglebart
//!
//! Associative memory with hybrid semantic and keyword retrieval over
//! OpenSearch.
//!
//! # Usage
//!
//! ```bash
//! slarglebart init
//! slarglebart store "Rust ownership" "Each value has one owner" --tags rust
//! slarglebart search "who owns a value" --type semantic
//! slarglebart last-session
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/slarglebart/config.toml)
//! 3. `--config` file
//! 4. Environment variables (SLARGLEBART_*, then EMBEDDING_MODEL, MEMORY_INDEX, ...)
//! 5. CLI flags

use anyhow::Result;
use clap::Parser;

use memory_cli::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    run(Cli::parse()).await
}
