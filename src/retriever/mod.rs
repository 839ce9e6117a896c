// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exemplar retrieval.
//!
//! The [`Retriever`] embeds a query once, takes the current index snapshot
//! and hands both to [`select`], which dispatches over the closed set of
//! selection strategies:
//!
//! - [`Strategy::Nearest`]: the k nearest entries by distance.
//! - [`Strategy::Diversity`]: maximal marginal relevance over a larger pool.
//! - [`Strategy::Hybrid`]: semantic score fused with query token overlap.

pub mod hybrid;
pub mod mmr;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::errors::{Error, Result};
use crate::index::{Candidate, IndexSnapshot, VectorIndex};

pub use hybrid::{HybridParams, HybridScorer};
pub use mmr::MmrParams;

/// Ordered exemplars; position 0 is the most preferred.
pub type ExemplarList = Vec<Candidate>;

/// Strategy name, as used in configuration and on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Plain k-nearest-neighbor
    #[default]
    #[serde(alias = "topk")]
    Nearest,
    /// Maximal marginal relevance
    #[serde(alias = "mmr")]
    Diversity,
    /// Semantic + keyword fusion
    Hybrid,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::Nearest => write!(f, "nearest"),
            StrategyKind::Diversity => write!(f, "diversity"),
            StrategyKind::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nearest" | "topk" | "top-k" | "n" => Ok(StrategyKind::Nearest),
            "diversity" | "mmr" | "d" => Ok(StrategyKind::Diversity),
            "hybrid" | "h" => Ok(StrategyKind::Hybrid),
            _ => Err(format!("Unknown retrieval strategy: {}", s)),
        }
    }
}

/// Selection strategy with its parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Strategy {
    Nearest,
    Diversity(MmrParams),
    Hybrid(HybridParams),
}

impl Strategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Nearest => StrategyKind::Nearest,
            Strategy::Diversity(_) => StrategyKind::Diversity,
            Strategy::Hybrid(_) => StrategyKind::Hybrid,
        }
    }

    /// Builds a strategy from its name and a loose parameter map.
    ///
    /// Recognized keys: `fetch_k` and `lambda` (alias `lambda_mult`) for
    /// diversity, `keyword_weight` for hybrid. Missing keys take defaults;
    /// keys the strategy does not understand are rejected.
    pub fn from_params(name: &str, params: &HashMap<String, f64>) -> Result<Self> {
        let kind: StrategyKind = name.parse().map_err(Error::InvalidRequest)?;

        let allowed: &[&str] = match kind {
            StrategyKind::Nearest => &[],
            StrategyKind::Diversity => &["fetch_k", "lambda", "lambda_mult"],
            StrategyKind::Hybrid => &["keyword_weight"],
        };
        let mut unknown: Vec<&str> = params
            .keys()
            .map(String::as_str)
            .filter(|key| !allowed.contains(key))
            .collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            return Err(Error::InvalidRequest(format!(
                "unknown parameter(s) for {} strategy: {}",
                kind,
                unknown.join(", ")
            )));
        }

        Ok(match kind {
            StrategyKind::Nearest => Strategy::Nearest,
            StrategyKind::Diversity => {
                let defaults = MmrParams::default();
                let fetch_k = match params.get("fetch_k") {
                    Some(&raw) => count_param("fetch_k", raw)?,
                    None => defaults.fetch_k,
                };
                let lambda = params
                    .get("lambda")
                    .or_else(|| params.get("lambda_mult"))
                    .map(|&v| v as f32)
                    .unwrap_or(defaults.lambda);
                Strategy::Diversity(MmrParams::new(fetch_k, lambda))
            }
            StrategyKind::Hybrid => {
                let keyword_weight = params
                    .get("keyword_weight")
                    .map(|&v| v as f32)
                    .unwrap_or(HybridParams::default().keyword_weight);
                Strategy::Hybrid(HybridParams::new(keyword_weight))
            }
        })
    }

    /// Checks `k` and the strategy parameters.
    pub fn validate(&self, k: usize) -> Result<()> {
        if k == 0 {
            return Err(Error::InvalidRequest("k must be at least 1".to_string()));
        }
        match self {
            Strategy::Nearest => Ok(()),
            Strategy::Diversity(params) => params.validate(k),
            Strategy::Hybrid(params) => params.validate(),
        }
    }
}

fn count_param(name: &str, raw: f64) -> Result<usize> {
    if !raw.is_finite() || raw < 0.0 || raw.fract() != 0.0 {
        return Err(Error::InvalidRequest(format!(
            "{} must be a non-negative integer, got {}",
            name, raw
        )));
    }
    Ok(raw as usize)
}

pub(crate) fn check_unit_interval(name: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::InvalidRequest(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

/// Applies `strategy` to the snapshot for an already-embedded query.
///
/// This is the single dispatch point over strategies. It performs no
/// embedding calls and mutates nothing, so it can run concurrently.
pub fn select(
    strategy: &Strategy,
    query_text: &str,
    query_vector: &[f32],
    snapshot: &IndexSnapshot,
    k: usize,
) -> Result<ExemplarList> {
    strategy.validate(k)?;
    match strategy {
        Strategy::Nearest => snapshot.nearest(query_vector, k),
        Strategy::Diversity(params) => mmr::select(snapshot, query_vector, k, params),
        Strategy::Hybrid(params) => hybrid::select(snapshot, query_text, query_vector, k, params),
    }
}

/// Entry point for exemplar retrieval.
pub struct Retriever {
    index: Arc<VectorIndex>,
    provider: Arc<dyn EmbeddingProvider>,
    expected_corpus: Option<String>,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            index,
            provider,
            expected_corpus: None,
        }
    }

    /// Refuses to answer from an index built over a corpus other than the one
    /// with this fingerprint (see [`crate::corpus::corpus_fingerprint`]).
    pub fn with_expected_corpus(mut self, corpus_hash: impl Into<String>) -> Self {
        self.expected_corpus = Some(corpus_hash.into());
        self
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Retrieves up to `k` exemplars for `query` using `strategy`.
    ///
    /// The index snapshot is taken once, so a concurrent rebuild cannot mix
    /// old and new entries within one call.
    pub fn retrieve(&self, query: &str, strategy: &Strategy, k: usize) -> Result<ExemplarList> {
        strategy.validate(k)?;
        let snapshot = self.index.snapshot()?;
        snapshot
            .version()
            .ensure_compatible(self.provider.model_id(), self.expected_corpus.as_deref())?;

        let query_vector = self.provider.embed(query)?;
        let exemplars = select(strategy, query, &query_vector, &snapshot, k)?;
        debug!(
            "retrieved {} exemplars with {} strategy (k={})",
            exemplars.len(),
            strategy.kind(),
            k
        );
        Ok(exemplars)
    }

    /// Retrieves by strategy name with a loose parameter map.
    pub fn retrieve_with_params(
        &self,
        query: &str,
        strategy: &str,
        k: usize,
        params: &HashMap<String, f64>,
    ) -> Result<ExemplarList> {
        let strategy = Strategy::from_params(strategy, params)?;
        self.retrieve(query, &strategy, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{corpus_fingerprint, CorpusRecord};
    use crate::embedding::HashingProvider;
    use crate::index::IndexBuilder;
    use serde_json::json;

    fn scenario_retriever() -> Retriever {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingProvider::new(384));
        let records = vec![
            CorpusRecord::new("deploy a 5ms slice", json!("A")),
            CorpusRecord::new("deploy a 5ms slice for robots", json!("B")),
            CorpusRecord::new("stream 4k video", json!("C")),
        ];
        let index = Arc::new(VectorIndex::new());
        index
            .build(&IndexBuilder::new(provider.as_ref()), &records)
            .unwrap();
        Retriever::new(index, provider)
    }

    fn outputs(list: &ExemplarList) -> Vec<String> {
        list.iter()
            .map(|c| c.output.as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn test_strategy_kind_parsing() {
        assert_eq!("nearest".parse::<StrategyKind>().unwrap(), StrategyKind::Nearest);
        assert_eq!("topk".parse::<StrategyKind>().unwrap(), StrategyKind::Nearest);
        assert_eq!("MMR".parse::<StrategyKind>().unwrap(), StrategyKind::Diversity);
        assert_eq!("h".parse::<StrategyKind>().unwrap(), StrategyKind::Hybrid);
        assert!("random".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_from_params() {
        let mut params = HashMap::new();
        params.insert("fetch_k".to_string(), 8.0);
        params.insert("lambda".to_string(), 0.25);
        assert_eq!(
            Strategy::from_params("diversity", &params).unwrap(),
            Strategy::Diversity(MmrParams::new(8, 0.25))
        );

        assert_eq!(
            Strategy::from_params("hybrid", &HashMap::new()).unwrap(),
            Strategy::Hybrid(HybridParams::default())
        );

        assert!(matches!(
            Strategy::from_params("nearest", &params),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            Strategy::from_params("bogus", &HashMap::new()),
            Err(Error::InvalidRequest(_))
        ));

        let mut fractional = HashMap::new();
        fractional.insert("fetch_k".to_string(), 2.5);
        assert!(matches!(
            Strategy::from_params("mmr", &fractional),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_validate() {
        assert!(matches!(Strategy::Nearest.validate(0), Err(Error::InvalidRequest(_))));
        assert!(Strategy::Nearest.validate(1).is_ok());
        assert!(matches!(
            Strategy::Diversity(MmrParams::new(2, 0.5)).validate(3),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            Strategy::Diversity(MmrParams::new(5, 1.5)).validate(3),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            Strategy::Hybrid(HybridParams::new(-0.1)).validate(3),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            Strategy::Hybrid(HybridParams::new(f32::NAN)).validate(3),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_nearest_scenario() {
        let retriever = scenario_retriever();
        let result = retriever
            .retrieve("deploy an ultra low latency slice", &Strategy::Nearest, 2)
            .unwrap();
        let mut got = outputs(&result);
        got.sort();
        assert_eq!(got, vec!["A", "B"]);
    }

    #[test]
    fn test_retrieve_is_deterministic() {
        let retriever = scenario_retriever();
        let first = retriever.retrieve("deploy slice", &Strategy::Nearest, 3).unwrap();
        let second = retriever.retrieve("deploy slice", &Strategy::Nearest, 3).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_k_zero_is_invalid() {
        let retriever = scenario_retriever();
        let err = retriever.retrieve("deploy", &Strategy::Nearest, 0).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_fetch_k_below_k_is_invalid() {
        let retriever = scenario_retriever();
        let err = retriever
            .retrieve("deploy", &Strategy::Diversity(MmrParams::new(1, 0.5)), 2)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_unknown_strategy_name_is_invalid() {
        let retriever = scenario_retriever();
        let err = retriever
            .retrieve_with_params("deploy", "semantic-ish", 2, &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_query_before_build_is_not_ready() {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingProvider::new(8));
        let retriever = Retriever::new(Arc::new(VectorIndex::new()), provider);
        let err = retriever.retrieve("deploy", &Strategy::Nearest, 1).unwrap_err();
        assert!(matches!(err, Error::IndexNotReady));
    }

    #[test]
    fn test_model_mismatch_is_stale() {
        let retriever = scenario_retriever();
        let other: Arc<dyn EmbeddingProvider> = Arc::new(HashingProvider::new(64));
        let mismatched = Retriever::new(retriever.index().clone(), other);
        let err = mismatched.retrieve("deploy", &Strategy::Nearest, 1).unwrap_err();
        assert!(matches!(err, Error::StaleIndex(_)));
    }

    #[test]
    fn test_corpus_change_is_stale() {
        let retriever = scenario_retriever();
        let index = retriever.index().clone();
        let provider = retriever.provider().clone();

        let edited = vec![
            CorpusRecord::new("deploy a 5ms slice", json!("A")),
            CorpusRecord::new("stream 4k video", json!("C2")),
        ];
        let stale = Retriever::new(index.clone(), provider.clone())
            .with_expected_corpus(corpus_fingerprint(&edited));
        let err = stale.retrieve("deploy", &Strategy::Nearest, 1).unwrap_err();
        assert!(matches!(err, Error::StaleIndex(_)));

        let current = index.snapshot().unwrap().version().corpus_hash.clone();
        let fresh = Retriever::new(index, provider).with_expected_corpus(current);
        assert_eq!(fresh.retrieve("deploy", &Strategy::Nearest, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_length_is_min_of_k_and_corpus() {
        let retriever = scenario_retriever();
        for strategy in [
            Strategy::Nearest,
            Strategy::Diversity(MmrParams::new(10, 0.5)),
            Strategy::Hybrid(HybridParams::new(0.5)),
        ] {
            assert_eq!(retriever.retrieve("deploy", &strategy, 2).unwrap().len(), 2);
            assert_eq!(retriever.retrieve("deploy", &strategy, 10).unwrap().len(), 3);
        }
    }
}
