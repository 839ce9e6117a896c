// SPDX-License-Identifier: MIT OR Apache-2.0

//! `exemplar index`: embed a corpus and persist the index

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

use exemplar::config::Config;
use exemplar::corpus::load_corpus;
use exemplar::index::{IndexBuilder, IndexStore, VectorIndex};
use exemplar::output::{colorize_detail, colorize_id, colorize_query, colorize_score, use_colors};
use exemplar::retriever::{Retriever, Strategy};

use super::{index_file, load_provider, OutputOptions};

/// Number of results shown for `--test-query`
const TEST_QUERY_K: usize = 3;

/// Run the index command
pub fn run(
    config: &Config,
    corpus: &Path,
    index: Option<&Path>,
    test_query: Option<&str>,
    output: OutputOptions,
) -> Result<()> {
    let records = load_corpus(corpus)
        .with_context(|| format!("Failed to load corpus {}", corpus.display()))?;
    let provider = load_provider(config)?;

    let pb = if output.is_text() {
        let pb = ProgressBar::new(records.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{bar:40.cyan/blue}] {pos}/{len} exemplars | Embedding")?
                .progress_chars("##."),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let builder = IndexBuilder::new(provider.as_ref())
        .with_batch_size(config.index().batch_size())
        .with_metric(config.index().metric())
        .with_progress(pb);

    let vector_index = Arc::new(VectorIndex::new());
    let snapshot = vector_index
        .build(&builder, &records)
        .context("Failed to build index")?;

    let path = index_file(config, index)?;
    let mut store = IndexStore::open(&path)
        .with_context(|| format!("Failed to open index at {}", path.display()))?;
    store
        .save_snapshot(&snapshot)
        .with_context(|| format!("Failed to save index to {}", path.display()))?;

    let version = snapshot.version();
    let test_results = match test_query {
        Some(query) => {
            let retriever = Retriever::new(vector_index.clone(), provider.clone());
            Some(
                retriever
                    .retrieve(query, &Strategy::Nearest, TEST_QUERY_K)
                    .context("Test query failed")?,
            )
        }
        None => None,
    };

    if !output.is_text() {
        return output.print_json(&json!({
            "path": path,
            "version": version,
            "test_query": test_query,
            "test_results": test_results,
        }));
    }

    println!(
        "{} Indexed {} exemplars ({} dimensions, model {}, {} metric)",
        "✓".green(),
        version.entry_count.to_string().cyan(),
        version.dimension,
        version.model_id,
        version.metric
    );
    println!("  {} {}", "index:".dimmed(), path.display());
    println!("  {} {}", "corpus:".dimmed(), version.corpus_hash);

    if let (Some(query), Some(results)) = (test_query, test_results) {
        let use_color = use_colors();
        println!();
        println!("Test query: {}", colorize_query(query, use_color));
        for (i, candidate) in results.iter().enumerate() {
            println!(
                "  {}. {} (distance {})",
                i + 1,
                colorize_id(&candidate.id, use_color),
                colorize_score(candidate.distance, use_color)
            );
            println!("     {}", colorize_detail(&candidate.query_text, use_color));
        }
    }

    Ok(())
}
