//! Model file resolution through the Hugging Face hub cache.
//!
//! Files stay in hf-hub's own cache layout under the configured directory
//! (`models--<org>--<name>/snapshots/<commit>/...`); nothing is copied out.
//! A model can be pinned to a branch, tag or commit. A revision that is
//! already cached resolves without touching the network.

use std::path::PathBuf;

use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Cache, Repo, RepoType};
use tracing::{debug, info};

use crate::error::EmbeddingError;

/// Default model repository on the hub
pub const DEFAULT_MODEL_REPO: &str = "intfloat/e5-small-v2";

/// Revision used when none is pinned
pub const DEFAULT_REVISION: &str = "main";

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";

/// Platform cache directory for model files.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("slarglebart")
        .join("models")
}

/// Local paths of the files a BERT encoder needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

/// A model repository at a revision, resolved against a hub cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSource {
    pub repo_id: String,
    pub revision: String,
    pub cache_dir: PathBuf,
}

impl Default for ModelSource {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL_REPO)
    }
}

impl ModelSource {
    /// `repo_id` may carry a revision suffix, as in `org/name@v1.0`.
    pub fn new(repo_id: &str) -> Self {
        let (repo_id, revision) = match repo_id.split_once('@') {
            Some((repo, rev)) if !rev.is_empty() => (repo, rev),
            _ => (repo_id.trim_end_matches('@'), DEFAULT_REVISION),
        };
        Self {
            repo_id: repo_id.to_string(),
            revision: revision.to_string(),
            cache_dir: default_cache_dir(),
        }
    }

    /// Pin a revision. An explicit revision beats an `@` suffix.
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    fn repo(&self) -> Repo {
        Repo::with_revision(self.repo_id.clone(), RepoType::Model, self.revision.clone())
    }

    /// Paths from the local cache, if every file is present for this revision.
    pub fn cached(&self) -> Option<ModelPaths> {
        let repo = Cache::new(self.cache_dir.clone()).repo(self.repo());
        Some(ModelPaths {
            config: repo.get(CONFIG_FILE)?,
            tokenizer: repo.get(TOKENIZER_FILE)?,
            weights: repo.get(WEIGHTS_FILE)?,
        })
    }

    /// Cached paths, downloading whatever is missing.
    pub fn resolve(&self) -> Result<ModelPaths, EmbeddingError> {
        if let Some(paths) = self.cached() {
            debug!(
                repo = %self.repo_id,
                revision = %self.revision,
                "Using cached model files"
            );
            return Ok(paths);
        }

        info!(
            repo = %self.repo_id,
            revision = %self.revision,
            cache = ?self.cache_dir,
            "Downloading model files"
        );
        std::fs::create_dir_all(&self.cache_dir)?;
        let api = ApiBuilder::new()
            .with_cache_dir(self.cache_dir.clone())
            .with_progress(false)
            .build()
            .map_err(|e| EmbeddingError::Download(e.to_string()))?;
        let repo = api.repo(self.repo());
        let fetch = |file: &str| {
            repo.get(file).map_err(|e| {
                EmbeddingError::Download(format!(
                    "{}@{} {}: {}",
                    self.repo_id, self.revision, file, e
                ))
            })
        };

        Ok(ModelPaths {
            config: fetch(CONFIG_FILE)?,
            tokenizer: fetch(TOKENIZER_FILE)?,
            weights: fetch(WEIGHTS_FILE)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    /// Lay out `files` the way the hub cache stores a revision.
    fn seed_cache(dir: &Path, repo_id: &str, revision: &str, commit: &str, files: &[&str]) {
        let repo_dir = dir.join(format!("models--{}", repo_id.replace('/', "--")));
        let refs = repo_dir.join("refs");
        std::fs::create_dir_all(&refs).unwrap();
        std::fs::write(refs.join(revision), commit).unwrap();
        let snapshot = repo_dir.join("snapshots").join(commit);
        std::fs::create_dir_all(&snapshot).unwrap();
        for f in files {
            std::fs::write(snapshot.join(f), b"x").unwrap();
        }
    }

    #[test]
    fn test_default_source() {
        let source = ModelSource::default();
        assert_eq!(source.repo_id, DEFAULT_MODEL_REPO);
        assert_eq!(source.revision, "main");
        assert!(source.cache_dir.to_string_lossy().contains("slarglebart"));
    }

    #[test]
    fn test_revision_suffix_and_override() {
        let source = ModelSource::new("org/encoder@v2");
        assert_eq!(source.repo_id, "org/encoder");
        assert_eq!(source.revision, "v2");

        let pinned = ModelSource::new("org/encoder@v2").with_revision("abc123");
        assert_eq!(pinned.revision, "abc123");

        let bare = ModelSource::new("org/encoder@");
        assert_eq!(bare.repo_id, "org/encoder");
        assert_eq!(bare.revision, "main");
    }

    #[test]
    fn test_cached_reads_hub_layout() {
        let temp = TempDir::new().unwrap();
        seed_cache(
            temp.path(),
            "test/model",
            "main",
            "0123abcd",
            &["config.json", "tokenizer.json", "model.safetensors"],
        );

        let source = ModelSource::new("test/model").with_cache_dir(temp.path());
        let paths = source.cached().unwrap();
        assert!(paths.weights.ends_with("snapshots/0123abcd/model.safetensors"));
    }

    #[test]
    fn test_cached_respects_revision() {
        let temp = TempDir::new().unwrap();
        seed_cache(
            temp.path(),
            "test/model",
            "main",
            "0123abcd",
            &["config.json", "tokenizer.json", "model.safetensors"],
        );

        let other = ModelSource::new("test/model")
            .with_revision("v9")
            .with_cache_dir(temp.path());
        assert!(other.cached().is_none());
    }

    #[test]
    fn test_cached_needs_every_file() {
        let temp = TempDir::new().unwrap();
        seed_cache(
            temp.path(),
            "test/model",
            "main",
            "0123abcd",
            &["config.json", "tokenizer.json"],
        );

        let source = ModelSource::new("test/model").with_cache_dir(temp.path());
        assert!(source.cached().is_none());
    }
}
