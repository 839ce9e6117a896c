// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// exemplar - Few-shot exemplar retrieval
///
/// Builds a vector index over (query, output) pairs and retrieves the
/// examples most useful for prompting a generator on a new query.
#[derive(Parser, Debug)]
#[command(name = "exemplar")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to .exemplarrc.toml, then ~/.config/exemplar/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Compact JSON output (no pretty formatting)
    #[arg(long, global = true)]
    pub compact: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Retrieval strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliStrategy {
    /// k nearest neighbors
    Nearest,
    /// Maximal marginal relevance
    #[value(alias = "mmr")]
    Diversity,
    /// Semantic score fused with keyword overlap
    Hybrid,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the exemplar index from a corpus file
    #[command(alias = "i")]
    Index {
        /// Corpus file (JSON array or JSON Lines)
        #[arg(short, long)]
        corpus: PathBuf,

        /// Index database path (defaults to .exemplar/index.sqlite)
        #[arg(long)]
        index: Option<PathBuf>,

        /// Run a nearest-neighbor query against the fresh index
        #[arg(long)]
        test_query: Option<String>,
    },

    /// Retrieve exemplars for a query
    #[command(alias = "r")]
    Retrieve {
        /// Query text
        query: String,

        /// Index database path (defaults to .exemplar/index.sqlite)
        #[arg(long)]
        index: Option<PathBuf>,

        /// Fail if the index was not built from this corpus file
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// Retrieval strategy
        #[arg(short, long, value_enum, help_heading = "Strategy")]
        strategy: Option<CliStrategy>,

        /// Number of exemplars to return
        #[arg(short = 'k', long = "top-k", help_heading = "Strategy")]
        k: Option<usize>,

        /// Candidate pool size for diversity selection
        #[arg(long, help_heading = "Strategy")]
        fetch_k: Option<usize>,

        /// Relevance/diversity tradeoff for diversity selection (0.0-1.0)
        #[arg(long, help_heading = "Strategy")]
        lambda: Option<f32>,

        /// Keyword weight for hybrid retrieval (0.0-1.0)
        #[arg(long, help_heading = "Strategy")]
        keyword_weight: Option<f32>,

        /// Print a few-shot prompt block instead of the exemplar list
        #[arg(long, help_heading = "Output")]
        prompt: bool,

        /// Maximum examples in the prompt block
        #[arg(long, help_heading = "Output")]
        max_examples: Option<usize>,
    },

    /// Show the version of a built index
    Info {
        /// Index database path (defaults to .exemplar/index.sqlite)
        #[arg(long)]
        index: Option<PathBuf>,

        /// Check that the index is current for this corpus file
        #[arg(long)]
        corpus: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_retrieve_flags() {
        let cli = Cli::try_parse_from([
            "exemplar",
            "retrieve",
            "deploy a slice",
            "-s",
            "mmr",
            "-k",
            "2",
            "--lambda",
            "0.7",
            "--corpus",
            "intents.json",
        ])
        .unwrap();
        match cli.command {
            Commands::Retrieve {
                query,
                corpus,
                strategy,
                k,
                lambda,
                ..
            } => {
                assert_eq!(query, "deploy a slice");
                assert_eq!(corpus, Some(PathBuf::from("intents.json")));
                assert_eq!(strategy, Some(CliStrategy::Diversity));
                assert_eq!(k, Some(2));
                assert_eq!(lambda, Some(0.7));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
