// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for semsearch
//!
//! Loads configuration from .semsearch.toml in current directory or
//! ~/.config/semsearch/config.toml, then applies environment overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::embedding::provider::DEFAULT_FASTEMBED_MODEL;
use crate::embedding::{EmbeddingProviderConfig, ProviderSpec, DEFAULT_HASHING_DIM};
use crate::index::BackendKind;

/// Environment variables that override file settings.
pub const ENV_DATA_FOLDER: &str = "DATA_FOLDER";
pub const ENV_CACHE_DB: &str = "CACHE_DB";
pub const ENV_EMBEDDING_MODEL: &str = "EMBEDDING_MODEL";
pub const ENV_INDEX_PATH: &str = "INDEX_PATH";
pub const ENV_EMBEDDING_WORKERS: &str = "EMBEDDING_WORKERS";

/// Embedding provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    #[default]
    FastEmbed,
    Command,
    Hashing,
}

/// Document source configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Folder scanned for `.txt` documents
    pub folder: Option<PathBuf>,
}

impl DataConfig {
    /// Get document folder (defaults to "data/docs")
    pub fn folder(&self) -> PathBuf {
        self.folder
            .clone()
            .unwrap_or_else(|| PathBuf::from("data/docs"))
    }
}

/// Embedding cache configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// SQLite database holding cached embeddings
    pub db_path: Option<PathBuf>,
}

impl CacheConfig {
    /// Get cache database path (defaults to ".semsearch/embeddings.sqlite")
    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(".semsearch").join("embeddings.sqlite"))
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Persisted index file
    pub path: Option<PathBuf>,
    /// Search backend (auto, parallel, brute_force)
    pub backend: Option<BackendKind>,
}

impl IndexConfig {
    /// Get index path (defaults to ".semsearch/vectors.ssvi")
    pub fn path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| PathBuf::from(".semsearch").join("vectors.ssvi"))
    }

    /// Get backend (defaults to Auto)
    pub fn backend(&self) -> BackendKind {
        self.backend.unwrap_or_default()
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider type (fastembed, command, hashing)
    pub provider: Option<EmbeddingProviderType>,
    /// Model identifier for the embedding provider
    pub model: Option<String>,
    /// Command to execute for command provider
    pub command: Option<String>,
    /// Worker threads for batch embedding (0 = all cores but one)
    pub workers: Option<usize>,
    /// Vector dimension for the hashing provider
    pub dimension: Option<usize>,
    /// Texts per model call for fastembed
    pub batch_size: Option<usize>,
    /// Characters kept per text before embedding
    pub max_chars: Option<usize>,
}

impl EmbeddingConfig {
    /// Get provider type (defaults to FastEmbed)
    pub fn provider(&self) -> EmbeddingProviderType {
        self.provider.unwrap_or_default()
    }

    /// Get model identifier (defaults to "all-minilm-l6-v2")
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_FASTEMBED_MODEL)
    }

    /// Get command (defaults to "embedder")
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("embedder")
    }

    /// Get worker count (0 lets the embedder pick)
    pub fn workers(&self) -> usize {
        self.workers.unwrap_or(0)
    }

    /// Get hashing dimension (defaults to 384)
    pub fn dimension(&self) -> usize {
        self.dimension.unwrap_or(DEFAULT_HASHING_DIM)
    }

    /// Resolve the provider factory for these settings
    pub fn provider_spec(&self) -> ProviderSpec {
        match self.provider() {
            EmbeddingProviderType::FastEmbed => {
                let mut config = EmbeddingProviderConfig::new(self.model());
                if let Some(batch_size) = self.batch_size {
                    config.batch_size = batch_size;
                }
                if let Some(max_chars) = self.max_chars {
                    config.max_chars = max_chars;
                }
                ProviderSpec::FastEmbed(config.sanitized())
            }
            EmbeddingProviderType::Command => ProviderSpec::Command {
                command: self.command().to_string(),
                model: self.model().to_string(),
            },
            EmbeddingProviderType::Hashing => ProviderSpec::Hashing {
                dimension: self.dimension(),
            },
        }
    }
}

/// Search defaults
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Results returned when the CLI gets no `-k`
    pub top_k: Option<usize>,
}

impl SearchConfig {
    /// Get top k (defaults to 5)
    pub fn top_k(&self) -> usize {
        self.top_k.unwrap_or(5)
    }
}

/// Configuration loaded from .semsearch.toml or ~/.config/semsearch/config.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub cache: CacheConfig,
    pub index: IndexConfig,
    pub embeddings: EmbeddingConfig,
    pub search: SearchConfig,
}

impl Config {
    /// Load configuration from files, then the environment
    ///
    /// Precedence (highest to lowest):
    /// 1. environment variables
    /// 2. .semsearch.toml in current directory
    /// 3. ~/.config/semsearch/config.toml
    pub fn load() -> Self {
        let mut config = Self::load_file();
        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    fn load_file() -> Self {
        if let Some(config) = Self::load_from_path(Path::new(".semsearch.toml")) {
            return config;
        }

        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("semsearch").join("config.toml");
            if let Some(config) = Self::load_from_path(&config_path) {
                return config;
            }
        }

        Self::default()
    }

    /// Reads one config file; missing or malformed files yield `None`.
    pub fn load_from_path(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "loaded config");
                Some(config)
            }
            Err(e) => {
                tracing::warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Apply overrides from `var` (normally the process environment)
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| var(name).filter(|value| !value.trim().is_empty());

        if let Some(folder) = var(ENV_DATA_FOLDER) {
            self.data.folder = Some(PathBuf::from(folder));
        }
        if let Some(db) = var(ENV_CACHE_DB) {
            self.cache.db_path = Some(PathBuf::from(db));
        }
        if let Some(model) = var(ENV_EMBEDDING_MODEL) {
            self.embeddings.model = Some(model);
        }
        if let Some(path) = var(ENV_INDEX_PATH) {
            self.index.path = Some(PathBuf::from(path));
        }
        if let Some(workers) = var(ENV_EMBEDDING_WORKERS) {
            match workers.trim().parse::<usize>() {
                Ok(n) => self.embeddings.workers = Some(n),
                Err(_) => tracing::warn!(
                    value = %workers,
                    "ignoring invalid {}", ENV_EMBEDDING_WORKERS
                ),
            }
        }
    }

    /// Merge CLI top_k with config (CLI wins)
    pub fn merge_top_k(&self, cli_value: Option<usize>) -> usize {
        cli_value.unwrap_or_else(|| self.search.top_k())
    }
}
