// SPDX-License-Identifier: MIT OR Apache-2.0

//! exemplar - Few-shot exemplar retrieval library
//!
//! Builds a vector index over a corpus of (query, structured output) pairs
//! and retrieves the exemplars most useful for conditioning a generator on a
//! new query, by nearest neighbors, maximal marginal relevance, or a hybrid
//! of semantic and keyword scores.

pub mod config;
pub mod corpus;
pub mod embedding;
pub mod errors;
pub mod format;
pub mod index;
pub mod output;
pub mod retriever;
pub mod utils;

pub use errors::{EmbeddingError, Error, Result};
pub use format::{format_for_prompt, ExemplarFormatter};
pub use index::{Candidate, IndexBuilder, IndexSnapshot, IndexStore, VectorIndex};
pub use retriever::{ExemplarList, Retriever, Strategy, StrategyKind};
