//! CLI argument parsing for slarglebart.
//!
//! Global flags override every other configuration source.

use clap::{Parser, Subcommand};

use memory_types::MemoryKind;

/// Slarglebart
///
/// Associative memory with hybrid semantic and keyword retrieval.
#[derive(Parser, Debug)]
#[command(name = "slarglebart")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/slarglebart/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override the primary memory index
    #[arg(long, global = true)]
    pub index: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Memory commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Create the memory index if it does not exist
    Init,

    /// Store a memory
    Store {
        title: String,

        /// Plain text, or a JSON object
        content: String,

        /// Memory type (episodic, semantic, procedural, associative)
        #[arg(short = 't', long = "type", default_value = "semantic")]
        kind: MemoryKind,

        /// Comma-separated tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Explicit id instead of a generated one
        #[arg(long)]
        id: Option<String>,

        /// Extra metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Store a session summary
    Session {
        session_id: String,

        title: String,

        summary: String,

        /// Key point (repeatable)
        #[arg(long = "key-point")]
        key_points: Vec<String>,

        /// Next step (repeatable)
        #[arg(long = "next-step")]
        next_steps: Vec<String>,

        /// Comma-separated tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// Connect two stored memories
    Connect {
        source_id: String,

        target_id: String,

        /// Relationship type (e.g. supports, depends_on)
        relationship: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// Strength between 0 and 1
        #[arg(short, long, default_value = "0.5")]
        strength: f32,

        /// Comma-separated tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// Hybrid semantic and keyword search
    Search {
        query: String,

        /// Only memories of this type
        #[arg(short = 't', long = "type")]
        kind: Option<MemoryKind>,

        /// Maximum results
        #[arg(short = 'n', long)]
        size: Option<usize>,

        /// Drop hits scoring below this
        #[arg(long)]
        min_score: Option<f32>,

        /// Created at or after (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// Created at or before (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
    },

    /// Show the most recent session memory
    LastSession,

    /// Show a memory by id
    Get { id: String },

    /// Change fields of a stored memory
    Update {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        content: Option<String>,

        /// Comma-separated tags, replacing the current ones
        #[arg(long, value_delimiter = ',')]
        tags: Option<Vec<String>>,

        #[arg(long)]
        confidence: Option<f32>,

        /// JSON object merged over the current metadata
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Print the effective configuration
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_store_defaults() {
        let cli = Cli::parse_from(["slarglebart", "store", "Title", "Body"]);
        match cli.command {
            Commands::Store {
                kind, tags, id, ..
            } => {
                assert_eq!(kind, MemoryKind::Semantic);
                assert!(tags.is_empty());
                assert!(id.is_none());
            }
            _ => panic!("Expected Store command"),
        }
    }

    #[test]
    fn test_cli_store_with_type_and_tags() {
        let cli = Cli::parse_from([
            "slarglebart",
            "store",
            "Deploy",
            "Run migrations",
            "--type",
            "procedural",
            "--tags",
            "ops,release",
        ]);
        match cli.command {
            Commands::Store { kind, tags, .. } => {
                assert_eq!(kind, MemoryKind::Procedural);
                assert_eq!(tags, vec!["ops", "release"]);
            }
            _ => panic!("Expected Store command"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_type() {
        let result = Cli::try_parse_from(["slarglebart", "store", "a", "b", "--type", "dream"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_session_repeatable_points() {
        let cli = Cli::parse_from([
            "slarglebart",
            "session",
            "s-1",
            "Standup",
            "Talked",
            "--key-point",
            "one",
            "--key-point",
            "two",
            "--next-step",
            "three",
        ]);
        match cli.command {
            Commands::Session {
                key_points,
                next_steps,
                ..
            } => {
                assert_eq!(key_points, vec!["one", "two"]);
                assert_eq!(next_steps, vec!["three"]);
            }
            _ => panic!("Expected Session command"),
        }
    }

    #[test]
    fn test_cli_connect_defaults() {
        let cli = Cli::parse_from(["slarglebart", "connect", "a", "b", "supports"]);
        match cli.command {
            Commands::Connect {
                strength,
                description,
                ..
            } => {
                assert!((strength - 0.5).abs() < f32::EPSILON);
                assert!(description.is_empty());
            }
            _ => panic!("Expected Connect command"),
        }
    }

    #[test]
    fn test_cli_search_options() {
        let cli = Cli::parse_from([
            "slarglebart",
            "search",
            "rust",
            "-t",
            "episodic",
            "-n",
            "3",
            "--min-score",
            "0.5",
            "--from",
            "2024-01-01",
        ]);
        match cli.command {
            Commands::Search {
                kind,
                size,
                min_score,
                from,
                to,
                ..
            } => {
                assert_eq!(kind, Some(MemoryKind::Episodic));
                assert_eq!(size, Some(3));
                assert_eq!(min_score, Some(0.5));
                assert_eq!(from.as_deref(), Some("2024-01-01"));
                assert!(to.is_none());
            }
            _ => panic!("Expected Search command"),
        }
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "slarglebart",
            "last-session",
            "--index",
            "custom",
            "--log-level",
            "debug",
        ]);
        assert!(matches!(cli.command, Commands::LastSession));
        assert_eq!(cli.index.as_deref(), Some("custom"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_cli_update_tags_optional() {
        let cli = Cli::parse_from(["slarglebart", "update", "memory_1", "--title", "New"]);
        match cli.command {
            Commands::Update { id, title, tags, .. } => {
                assert_eq!(id, "memory_1");
                assert_eq!(title.as_deref(), Some("New"));
                assert!(tags.is_none());
            }
            _ => panic!("Expected Update command"),
        }
    }
}
