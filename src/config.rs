// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for exemplar
//!
//! Loads configuration from .exemplarrc.toml in current directory or ~/.config/exemplar/config.toml

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::errors::{Error, Result};
use crate::index::DistanceMetric;
use crate::retriever::StrategyKind;

/// Embedding provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    /// Local fastembed model
    #[default]
    Builtin,
    /// External process speaking JSON over stdin/stdout
    Command,
    /// Deterministic token hashing (offline, tests)
    Hash,
}

/// Embedding configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider type (builtin, command, hash)
    pub provider: Option<EmbeddingProviderType>,
    /// Model identifier for the embedding provider
    pub model: Option<String>,
    /// Command to execute for command provider
    pub command: Option<String>,
    /// Texts per provider call
    pub batch_size: Option<usize>,
    /// Characters kept per text before embedding
    pub max_chars: Option<usize>,
    /// Whether to L2-normalize vectors
    pub normalize: Option<bool>,
    /// Vector dimension for the hash provider
    pub dimension: Option<usize>,
    /// Timeout for a single provider call in milliseconds
    pub timeout_ms: Option<u64>,
}

impl EmbeddingConfig {
    /// Get provider type (defaults to Builtin)
    pub fn provider(&self) -> EmbeddingProviderType {
        self.provider.unwrap_or_default()
    }

    /// Get model identifier (defaults to "minilm")
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("minilm")
    }

    /// Get command (defaults to "embedder")
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("embedder")
    }

    /// Get batch size (defaults to 32)
    pub fn batch_size(&self) -> usize {
        self.batch_size.filter(|&n| n > 0).unwrap_or(32)
    }

    /// Get max chars (defaults to 2000)
    pub fn max_chars(&self) -> usize {
        self.max_chars.filter(|&n| n > 0).unwrap_or(2000)
    }

    /// Get normalize (defaults to true)
    pub fn normalize(&self) -> bool {
        self.normalize.unwrap_or(true)
    }

    /// Get hash provider dimension (defaults to 384)
    pub fn dimension(&self) -> usize {
        self.dimension.filter(|&n| n > 0).unwrap_or(384)
    }

    /// Get provider call timeout (defaults to 30s)
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(30_000))
    }
}

/// Index configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Location of the persisted index
    pub path: Option<PathBuf>,
    /// Distance metric used for build and query
    pub metric: Option<DistanceMetric>,
    /// Corpus entries embedded per batch during build
    pub batch_size: Option<usize>,
}

impl IndexConfig {
    /// Get configured index path, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Get metric (defaults to cosine)
    pub fn metric(&self) -> DistanceMetric {
        self.metric.unwrap_or_default()
    }

    /// Get build batch size (defaults to 32)
    pub fn batch_size(&self) -> usize {
        self.batch_size.filter(|&n| n > 0).unwrap_or(32)
    }
}

/// Retrieval defaults
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Default strategy (nearest, diversity, hybrid)
    pub strategy: Option<StrategyKind>,
    /// Number of exemplars to return
    pub k: Option<usize>,
    /// Candidate pool size for diversity selection
    pub fetch_k: Option<usize>,
    /// Relevance/diversity trade-off (1.0 = pure relevance)
    pub lambda: Option<f32>,
    /// Weight of keyword overlap in hybrid scoring
    pub keyword_weight: Option<f32>,
    /// Exemplars included in a formatted prompt block
    pub max_examples: Option<usize>,
}

impl RetrievalConfig {
    /// Get strategy (defaults to nearest)
    pub fn strategy(&self) -> StrategyKind {
        self.strategy.unwrap_or_default()
    }

    /// Get k (defaults to 5)
    pub fn k(&self) -> usize {
        self.k.unwrap_or(5)
    }

    /// Get fetch_k (defaults to 20)
    pub fn fetch_k(&self) -> usize {
        self.fetch_k.unwrap_or(20)
    }

    /// Get lambda (defaults to 0.5)
    pub fn lambda(&self) -> f32 {
        self.lambda.unwrap_or(0.5)
    }

    /// Get keyword weight (defaults to 0.3)
    pub fn keyword_weight(&self) -> f32 {
        self.keyword_weight.unwrap_or(0.3)
    }

    /// Get max examples (defaults to 3)
    pub fn max_examples(&self) -> usize {
        self.max_examples.unwrap_or(3)
    }
}

/// Retry policy for embedding calls
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per embedding call, including the first
    pub max_attempts: Option<u32>,
    /// First backoff delay in milliseconds
    pub initial_delay_ms: Option<u64>,
    /// Backoff ceiling in milliseconds
    pub max_delay_ms: Option<u64>,
}

impl RetryConfig {
    /// Get max attempts (defaults to 3)
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.filter(|&n| n > 0).unwrap_or(3)
    }

    /// Get initial delay (defaults to 500ms)
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms.unwrap_or(500))
    }

    /// Get max delay (defaults to 10s)
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms.unwrap_or(10_000))
    }
}

/// Configuration loaded from .exemplarrc.toml or ~/.config/exemplar/config.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Embedding configuration
    #[serde(default)]
    pub embeddings: EmbeddingConfig,

    /// Index configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Retry configuration
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Load configuration from files
    ///
    /// Precedence (highest to lowest):
    /// 1. .exemplarrc.toml in current directory
    /// 2. ~/.config/exemplar/config.toml
    pub fn load() -> Self {
        if let Some(config) = Self::try_load(&PathBuf::from(".exemplarrc.toml")) {
            return config;
        }

        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("exemplar").join("config.toml");
            if let Some(config) = Self::try_load(&config_path) {
                return config;
            }
        }

        Self::default()
    }

    /// Load configuration from an explicit path, failing on any problem.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn try_load(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match Self::parse(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Get the embedding configuration
    pub fn embeddings(&self) -> &EmbeddingConfig {
        &self.embeddings
    }

    /// Get the index configuration
    pub fn index(&self) -> &IndexConfig {
        &self.index
    }

    /// Get the retrieval configuration
    pub fn retrieval(&self) -> &RetrievalConfig {
        &self.retrieval
    }

    /// Get the retry configuration
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.embeddings().provider(), EmbeddingProviderType::Builtin);
        assert_eq!(config.embeddings().batch_size(), 32);
        assert_eq!(config.index().metric(), DistanceMetric::Cosine);
        assert_eq!(config.retrieval().strategy(), StrategyKind::Nearest);
        assert_eq!(config.retrieval().k(), 5);
        assert_eq!(config.retrieval().fetch_k(), 20);
        assert!((config.retrieval().lambda() - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.retry().max_attempts(), 3);
    }

    #[test]
    fn test_parse_sections() {
        let config = Config::parse(
            r#"
[embeddings]
provider = "hash"
dimension = 64

[index]
metric = "euclidean"
batch_size = 8

[retrieval]
strategy = "mmr"
k = 3
lambda = 0.7

[retry]
max_attempts = 5
initial_delay_ms = 10
"#,
        )
        .unwrap();

        assert_eq!(config.embeddings().provider(), EmbeddingProviderType::Hash);
        assert_eq!(config.embeddings().dimension(), 64);
        assert_eq!(config.index().metric(), DistanceMetric::Euclidean);
        assert_eq!(config.index().batch_size(), 8);
        assert_eq!(config.retrieval().strategy(), StrategyKind::Diversity);
        assert_eq!(config.retrieval().k(), 3);
        assert_eq!(config.retry().max_attempts(), 5);
        assert_eq!(config.retry().initial_delay(), Duration::from_millis(10));
    }

    #[test]
    fn test_zero_batch_size_falls_back() {
        let config = Config::parse("[index]\nbatch_size = 0\n").unwrap();
        assert_eq!(config.index().batch_size(), 32);
    }

    #[test]
    fn test_load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[index\nmetric = ").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }
}
