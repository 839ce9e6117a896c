// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subcommand implementations for the exemplar binary

pub mod index;
pub mod info;
pub mod retrieve;

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use exemplar::config::Config;
use exemplar::corpus::{corpus_fingerprint, load_corpus};
use exemplar::embedding::{create_provider, EmbeddingProvider};
use exemplar::utils::resolve_index_file;

use crate::cli::OutputFormat;

/// Output settings shared by all subcommands
#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub format: OutputFormat,
    pub compact: bool,
}

impl OutputOptions {
    pub fn is_text(&self) -> bool {
        self.format == OutputFormat::Text
    }

    pub fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let rendered = if self.compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        };
        println!("{}", rendered);
        Ok(())
    }
}

/// Builds the configured embedding provider, wrapped with retries
pub fn load_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider = create_provider(config.embeddings(), config.retry())
        .context("Failed to initialize embedding provider")?;
    Ok(Arc::from(provider))
}

/// Fingerprints a corpus file the same way the index builder does
pub fn corpus_hash(corpus: &Path) -> Result<String> {
    let records = load_corpus(corpus)
        .with_context(|| format!("Failed to load corpus {}", corpus.display()))?;
    Ok(corpus_fingerprint(&records))
}

/// Resolves the index database path from the flag, config and working directory
pub fn index_file(config: &Config, explicit: Option<&Path>) -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("Cannot determine current directory")?;
    Ok(resolve_index_file(explicit, config.index().path(), cwd))
}
