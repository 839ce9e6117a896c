// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hybrid retrieval combining embedding similarity and keyword overlap.
//!
//! Fetches `2k` nearest candidates and reranks them by
//! `(1 - w) * semantic + w * keyword`, where `semantic = 1 / (1 + distance)`
//! and `keyword` is the fraction of query tokens found in the candidate's
//! query text.

use std::collections::HashSet;

use super::{check_unit_interval, ExemplarList};
use crate::errors::Result;
use crate::index::{Candidate, IndexSnapshot};

/// Parameters for hybrid retrieval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridParams {
    /// Weight for keyword overlap (0.0-1.0); the semantic score gets the rest
    pub keyword_weight: f32,
}

impl Default for HybridParams {
    fn default() -> Self {
        Self {
            keyword_weight: 0.3,
        }
    }
}

impl HybridParams {
    pub fn new(keyword_weight: f32) -> Self {
        Self { keyword_weight }
    }

    pub fn validate(&self) -> Result<()> {
        check_unit_interval("keyword_weight", self.keyword_weight)
    }
}

/// Fetches `2k` candidates from `snapshot` and reranks them.
pub fn select(
    snapshot: &IndexSnapshot,
    query_text: &str,
    query_vector: &[f32],
    k: usize,
    params: &HybridParams,
) -> Result<ExemplarList> {
    let pool = snapshot.nearest(query_vector, k.saturating_mul(2))?;
    Ok(HybridScorer::new(*params).rerank(query_text, pool, k))
}

/// Reranks nearest-neighbor candidates with keyword overlap
pub struct HybridScorer {
    params: HybridParams,
}

impl HybridScorer {
    pub fn new(params: HybridParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &HybridParams {
        &self.params
    }

    /// Map a distance to `(0, 1]`
    fn semantic_score(distance: f32) -> f32 {
        1.0 / (1.0 + distance)
    }

    /// Fraction of query tokens present in `candidate_text`
    fn keyword_score(query_tokens: &HashSet<String>, candidate_text: &str) -> f32 {
        if query_tokens.is_empty() {
            return 0.0;
        }
        let candidate_tokens = tokenize(candidate_text);
        let overlap = query_tokens.intersection(&candidate_tokens).count();
        overlap as f32 / query_tokens.len() as f32
    }

    fn combine_scores(&self, semantic: f32, keyword: f32) -> f32 {
        let w = self.params.keyword_weight;
        (1.0 - w) * semantic + w * keyword
    }

    /// Scores `candidates` (ordered by ascending distance) and keeps the best `k`.
    ///
    /// The sort is stable, so equal scores keep nearest-neighbor order.
    pub fn rerank(&self, query: &str, candidates: Vec<Candidate>, k: usize) -> ExemplarList {
        let query_tokens = tokenize(query);

        let mut scored: Vec<Candidate> = candidates
            .into_iter()
            .map(|mut candidate| {
                let semantic = Self::semantic_score(candidate.distance);
                let keyword = Self::keyword_score(&query_tokens, &candidate.query_text);
                candidate.score = Some(self.combine_scores(semantic, keyword));
                candidate
            })
            .collect();

        // Sort by hybrid score (descending)
        scored.sort_by(|a, b| {
            let a = a.score.unwrap_or(f32::NEG_INFINITY);
            let b = b.score.unwrap_or(f32::NEG_INFINITY);
            b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal)
        });

        scored.truncate(k);
        scored
    }
}

/// Lowercased, whitespace-separated token set
pub fn tokenize(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}
