// SPDX-License-Identifier: MIT OR Apache-2.0

//! `exemplar info`: describe a persisted index

use anyhow::{bail, Context, Result};
use colored::Colorize;
use serde_json::json;
use std::path::Path;

use exemplar::config::Config;
use exemplar::index::IndexStore;

use super::{corpus_hash, index_file, OutputOptions};

pub fn run(
    config: &Config,
    index: Option<&Path>,
    corpus: Option<&Path>,
    output: OutputOptions,
) -> Result<()> {
    let path = index_file(config, index)?;
    if !path.exists() {
        bail!(
            "No index found at {}. Run 'exemplar index --corpus <file>' first.",
            path.display()
        );
    }

    let store = IndexStore::open(&path)
        .with_context(|| format!("Failed to open index at {}", path.display()))?;
    let version = store
        .version()?
        .with_context(|| format!("Index at {} is empty", path.display()))?;
    let stored = store.count_entries()?;
    if let Some(corpus) = corpus {
        version.ensure_corpus(&corpus_hash(corpus)?)?;
    }

    if !output.is_text() {
        return output.print_json(&json!({
            "path": path,
            "version": version,
            "stored_entries": stored,
        }));
    }

    println!("{} {}", "Index:".bold(), path.display());
    println!("  schema version: {}", version.schema_version);
    println!("  model:          {}", version.model_id.cyan());
    println!("  dimension:      {}", version.dimension);
    println!("  metric:         {}", version.metric);
    println!("  corpus hash:    {}", version.corpus_hash);
    println!("  entries:        {} ({} stored)", version.entry_count, stored);
    println!("  built at:       {}", version.built_at);
    Ok(())
}
