// SPDX-License-Identifier: MIT OR Apache-2.0

//! `exemplar retrieve`: select exemplars for a query

use anyhow::{bail, Context, Result};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use exemplar::config::{Config, RetrievalConfig};
use exemplar::format::ExemplarFormatter;
use exemplar::index::{IndexStore, VectorIndex};
use exemplar::output::{colorize_detail, colorize_id, colorize_query, colorize_score, use_colors};
use exemplar::retriever::{HybridParams, MmrParams, Retriever, Strategy, StrategyKind};

use super::{corpus_hash, index_file, load_provider, OutputOptions};
use crate::cli::CliStrategy;

/// Arguments of the retrieve command
#[derive(Debug)]
pub struct RetrieveArgs {
    pub query: String,
    pub index: Option<PathBuf>,
    pub corpus: Option<PathBuf>,
    pub strategy: Option<CliStrategy>,
    pub k: Option<usize>,
    pub fetch_k: Option<usize>,
    pub lambda: Option<f32>,
    pub keyword_weight: Option<f32>,
    pub prompt: bool,
    pub max_examples: Option<usize>,
}

/// Combines command-line flags with configured defaults
fn resolve_strategy(defaults: &RetrievalConfig, args: &RetrieveArgs) -> Strategy {
    let kind = match args.strategy {
        Some(CliStrategy::Nearest) => StrategyKind::Nearest,
        Some(CliStrategy::Diversity) => StrategyKind::Diversity,
        Some(CliStrategy::Hybrid) => StrategyKind::Hybrid,
        None => defaults.strategy(),
    };

    match kind {
        StrategyKind::Nearest => Strategy::Nearest,
        StrategyKind::Diversity => Strategy::Diversity(MmrParams::new(
            args.fetch_k.unwrap_or(defaults.fetch_k()),
            args.lambda.unwrap_or(defaults.lambda()),
        )),
        StrategyKind::Hybrid => Strategy::Hybrid(HybridParams::new(
            args.keyword_weight.unwrap_or(defaults.keyword_weight()),
        )),
    }
}

/// Run the retrieve command
pub fn run(config: &Config, args: RetrieveArgs, output: OutputOptions) -> Result<()> {
    let path = index_file(config, args.index.as_deref())?;
    if !path.exists() {
        bail!(
            "No index found at {}. Run 'exemplar index --corpus <file>' first.",
            path.display()
        );
    }

    let store = IndexStore::open(&path)
        .with_context(|| format!("Failed to open index at {}", path.display()))?;
    let snapshot = store
        .load_snapshot()
        .with_context(|| format!("Failed to load index from {}", path.display()))?;

    let provider = load_provider(config)?;
    let strategy = resolve_strategy(config.retrieval(), &args);
    let k = args.k.unwrap_or(config.retrieval().k());

    let mut retriever = Retriever::new(Arc::new(VectorIndex::from_snapshot(snapshot)), provider);
    if let Some(corpus) = args.corpus.as_deref() {
        retriever = retriever.with_expected_corpus(corpus_hash(corpus)?);
    }
    let exemplars = retriever.retrieve(&args.query, &strategy, k)?;

    if args.prompt {
        let max_examples = args
            .max_examples
            .unwrap_or(config.retrieval().max_examples());
        let block = ExemplarFormatter::new(max_examples).format(&exemplars);
        if output.is_text() {
            print!("{}", block);
            return Ok(());
        }
        return output.print_json(&json!({ "query": args.query, "prompt": block }));
    }

    if !output.is_text() {
        return output.print_json(&json!({
            "query": args.query,
            "strategy": strategy.kind(),
            "k": k,
            "exemplars": exemplars,
        }));
    }

    let use_color = use_colors();
    if exemplars.is_empty() {
        println!("No exemplars found");
        return Ok(());
    }
    for (i, exemplar) in exemplars.iter().enumerate() {
        let mut header = format!(
            "{}. {}  distance {}",
            i + 1,
            colorize_id(&exemplar.id, use_color),
            colorize_score(exemplar.distance, use_color)
        );
        if let Some(score) = exemplar.score {
            header.push_str(&format!("  score {}", colorize_score(score, use_color)));
        }
        println!("{}", header);
        println!("   {}", colorize_query(&exemplar.query_text, use_color));
        println!("   {}", colorize_detail(&exemplar.output.to_string(), use_color));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(strategy: Option<CliStrategy>) -> RetrieveArgs {
        RetrieveArgs {
            query: "deploy".to_string(),
            index: None,
            corpus: None,
            strategy,
            k: None,
            fetch_k: None,
            lambda: Some(0.9),
            keyword_weight: None,
            prompt: false,
            max_examples: None,
        }
    }

    #[test]
    fn flags_override_configured_strategy() {
        let defaults = RetrievalConfig::default();
        assert_eq!(
            resolve_strategy(&defaults, &args(Some(CliStrategy::Diversity))),
            Strategy::Diversity(MmrParams::new(20, 0.9))
        );
        assert_eq!(resolve_strategy(&defaults, &args(None)), Strategy::Nearest);
        assert_eq!(
            resolve_strategy(&defaults, &args(Some(CliStrategy::Hybrid))),
            Strategy::Hybrid(HybridParams::new(0.3))
        );
    }
}
