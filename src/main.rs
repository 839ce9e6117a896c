// SPDX-License-Identifier: MIT OR Apache-2.0

//! exemplar - Few-shot exemplar retrieval tool
//!
//! Indexes a corpus of (query, structured output) pairs with sentence
//! embeddings and retrieves the best exemplars for a new query.

mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands};
use commands::retrieve::RetrieveArgs;
use commands::OutputOptions;
use exemplar::config::Config;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Initialize tracing with EXEMPLAR_LOG env var (e.g., EXEMPLAR_LOG=debug exemplar retrieve "query")
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("EXEMPLAR_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output = OutputOptions {
        format: cli.format,
        compact: cli.compact,
    };

    let config = match cli.config.as_deref() {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::load(),
    };

    match cli.command {
        Commands::Index {
            corpus,
            index,
            test_query,
        } => {
            commands::index::run(
                &config,
                &corpus,
                index.as_deref(),
                test_query.as_deref(),
                output,
            )?;
        }
        Commands::Retrieve {
            query,
            index,
            corpus,
            strategy,
            k,
            fetch_k,
            lambda,
            keyword_weight,
            prompt,
            max_examples,
        } => {
            commands::retrieve::run(
                &config,
                RetrieveArgs {
                    query,
                    index,
                    corpus,
                    strategy,
                    k,
                    fetch_k,
                    lambda,
                    keyword_weight,
                    prompt,
                    max_examples,
                },
                output,
            )?;
        }
        Commands::Info { index, corpus } => {
            commands::info::run(&config, index.as_deref(), corpus.as_deref(), output)?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "exemplar", &mut std::io::stdout());
        }
    }

    Ok(())
}
