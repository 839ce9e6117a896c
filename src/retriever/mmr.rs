// SPDX-License-Identifier: MIT OR Apache-2.0

//! Maximal marginal relevance selection.
//!
//! Fetches `fetch_k` nearest candidates, then greedily picks the candidate
//! maximizing `lambda * relevance + (1 - lambda) * (1 - max_sim_to_selected)`.
//! Relevance is derived from the candidate's query distance, so `lambda = 1`
//! keeps the nearest-neighbor order.

use super::{check_unit_interval, ExemplarList};
use crate::errors::{Error, Result};
use crate::index::{Candidate, DistanceMetric, IndexSnapshot};

/// Parameters for diversity selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MmrParams {
    /// Size of the nearest-neighbor pool to select from
    pub fetch_k: usize,
    /// Relevance/diversity tradeoff in `[0, 1]`; 1 is pure relevance
    pub lambda: f32,
}

impl Default for MmrParams {
    fn default() -> Self {
        Self {
            fetch_k: 20,
            lambda: 0.5,
        }
    }
}

impl MmrParams {
    pub fn new(fetch_k: usize, lambda: f32) -> Self {
        Self { fetch_k, lambda }
    }

    pub fn validate(&self, k: usize) -> Result<()> {
        if self.fetch_k < k {
            return Err(Error::InvalidRequest(format!(
                "fetch_k ({}) must be at least k ({})",
                self.fetch_k, k
            )));
        }
        check_unit_interval("lambda", self.lambda)
    }
}

/// Fetches the candidate pool from `snapshot` and runs MMR over it.
pub fn select(
    snapshot: &IndexSnapshot,
    query_vector: &[f32],
    k: usize,
    params: &MmrParams,
) -> Result<ExemplarList> {
    let pool = snapshot.nearest(query_vector, params.fetch_k)?;
    Ok(select_from_pool(pool, k, params.lambda, snapshot.metric()))
}

/// Greedy MMR over a pool already ordered by ascending distance.
///
/// A pool no larger than `k` is returned as is. Ties go to the candidate
/// nearer the query, and a NaN score never wins.
pub fn select_from_pool(
    pool: Vec<Candidate>,
    k: usize,
    lambda: f32,
    metric: DistanceMetric,
) -> ExemplarList {
    if pool.len() <= k {
        return pool;
    }

    let relevance: Vec<f32> = pool
        .iter()
        .map(|c| metric.similarity_from_distance(c.distance))
        .collect();
    // Highest similarity of each candidate to anything selected so far
    let mut max_sim = vec![f32::NEG_INFINITY; pool.len()];
    let mut selected = vec![false; pool.len()];
    let mut picks: Vec<(usize, f32)> = Vec::with_capacity(k);

    while picks.len() < k {
        let mut best: Option<(usize, f32)> = None;
        for idx in 0..pool.len() {
            if selected[idx] {
                continue;
            }
            let diversity = if picks.is_empty() {
                1.0
            } else {
                1.0 - max_sim[idx]
            };
            let mut score = lambda * relevance[idx] + (1.0 - lambda) * diversity;
            if score.is_nan() {
                score = f32::NEG_INFINITY;
            }
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((idx, score)),
            }
        }

        let Some((chosen, score)) = best else {
            break;
        };
        selected[chosen] = true;
        picks.push((chosen, score));

        for idx in 0..pool.len() {
            if selected[idx] {
                continue;
            }
            let sim = metric.similarity(&pool[idx].embedding, &pool[chosen].embedding);
            if sim > max_sim[idx] {
                max_sim[idx] = sim;
            }
        }
    }

    let mut slots: Vec<Option<Candidate>> = pool.into_iter().map(Some).collect();
    picks
        .into_iter()
        .filter_map(|(idx, score)| {
            slots[idx].take().map(|mut candidate| {
                candidate.score = Some(score);
                candidate
            })
        })
        .collect()
}
