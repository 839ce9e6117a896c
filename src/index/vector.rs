// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory vector index.
//!
//! An [`IndexSnapshot`] is immutable once constructed. [`VectorIndex`] holds
//! the current snapshot behind a lock and replaces it wholesale on rebuild,
//! so a reader always sees one complete snapshot.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use super::builder::IndexBuilder;
use super::metric::DistanceMetric;
use crate::corpus::CorpusRecord;
use crate::errors::{Error, Result};

/// An embedded corpus entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusEntry {
    /// Opaque identifier
    pub id: String,
    /// Query text that was embedded
    pub query_text: String,
    /// Structured output, passed through untouched
    pub output: Value,
    /// Embedding of `query_text`
    pub embedding: Vec<f32>,
}

/// Identity of a built index: which model, metric and corpus produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexVersion {
    pub schema_version: u32,
    pub model_id: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub corpus_hash: String,
    pub entry_count: usize,
    /// Unix timestamp (seconds) of the build
    pub built_at: i64,
}

impl IndexVersion {
    /// Rejects an index built with a different model or from a different corpus.
    pub fn ensure_compatible(&self, model_id: &str, corpus_hash: Option<&str>) -> Result<()> {
        if self.model_id != model_id {
            return Err(Error::StaleIndex(format!(
                "index was built with model '{}' but the provider is '{}'; rebuild the index",
                self.model_id, model_id
            )));
        }
        match corpus_hash {
            Some(hash) => self.ensure_corpus(hash),
            None => Ok(()),
        }
    }

    /// Rejects an index whose corpus fingerprint differs from `corpus_hash`.
    pub fn ensure_corpus(&self, corpus_hash: &str) -> Result<()> {
        if self.corpus_hash != corpus_hash {
            return Err(Error::StaleIndex(format!(
                "index corpus {} does not match corpus {}; rebuild the index",
                self.corpus_hash, corpus_hash
            )));
        }
        Ok(())
    }
}

/// A corpus entry projected for one retrieval call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub id: String,
    pub query_text: String,
    pub output: Value,
    /// Distance to the query under the index metric
    pub distance: f32,
    /// Position in the nearest-neighbor ordering (0 = nearest)
    pub rank: usize,
    /// Score assigned by the selection policy, if it computes one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

/// Immutable set of embedded entries plus the version that describes them.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    version: IndexVersion,
    entries: Vec<CorpusEntry>,
}

impl IndexSnapshot {
    /// Validates and assembles a snapshot.
    ///
    /// Fails on an empty entry list, duplicate ids, or any embedding whose
    /// length differs from `version.dimension` or holds non-finite values.
    pub fn new(version: IndexVersion, entries: Vec<CorpusEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::IndexBuild("corpus is empty".to_string()));
        }
        if version.dimension == 0 {
            return Err(Error::IndexBuild("embedding dimension is zero".to_string()));
        }

        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.id.as_str()) {
                return Err(Error::IndexBuild(format!("duplicate entry id '{}'", entry.id)));
            }
            if entry.embedding.len() != version.dimension {
                return Err(Error::IndexBuild(format!(
                    "entry '{}' has dimension {} but the index expects {}",
                    entry.id,
                    entry.embedding.len(),
                    version.dimension
                )));
            }
            if entry.embedding.iter().any(|v| !v.is_finite()) {
                return Err(Error::IndexBuild(format!(
                    "entry '{}' has a non-finite embedding value",
                    entry.id
                )));
            }
        }

        let version = IndexVersion {
            entry_count: entries.len(),
            ..version
        };

        Ok(Self { version, entries })
    }

    pub fn version(&self) -> &IndexVersion {
        &self.version
    }

    pub fn entries(&self) -> &[CorpusEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.version.dimension
    }

    pub fn metric(&self) -> DistanceMetric {
        self.version.metric
    }

    /// Returns up to `n` entries nearest to `vector`, by ascending distance.
    ///
    /// Equal distances keep insertion order. Asking for more entries than
    /// the index holds returns all of them.
    pub fn nearest(&self, vector: &[f32], n: usize) -> Result<Vec<Candidate>> {
        if vector.len() != self.dimension() {
            return Err(Error::InvalidRequest(format!(
                "query vector has dimension {} but the index expects {}",
                vector.len(),
                self.dimension()
            )));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidRequest(
                "query vector contains non-finite values".to_string(),
            ));
        }

        let metric = self.metric();
        let distances: Vec<f32> = self
            .entries
            .par_iter()
            .map(|entry| metric.distance(vector, &entry.embedding))
            .collect();

        let by_distance = |a: &usize, b: &usize| -> Ordering {
            distances[*a].total_cmp(&distances[*b]).then(a.cmp(b))
        };

        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        let n = n.min(order.len());
        if n == 0 {
            return Ok(Vec::new());
        }
        if n < order.len() {
            order.select_nth_unstable_by(n - 1, by_distance);
            order.truncate(n);
        }
        order.sort_unstable_by(by_distance);

        Ok(order
            .into_iter()
            .enumerate()
            .map(|(rank, idx)| {
                let entry = &self.entries[idx];
                Candidate {
                    id: entry.id.clone(),
                    query_text: entry.query_text.clone(),
                    output: entry.output.clone(),
                    distance: distances[idx],
                    rank,
                    score: None,
                    embedding: entry.embedding.clone(),
                }
            })
            .collect())
    }
}

/// Vector index handle shared by concurrent readers.
///
/// Queries never observe a partially built index: a rebuild assembles a new
/// snapshot off to the side and swaps it in only on success.
#[derive(Debug, Default)]
pub struct VectorIndex {
    current: RwLock<Option<Arc<IndexSnapshot>>>,
}

impl VectorIndex {
    /// Creates an index with no snapshot; queries fail until one is built or installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an index serving `snapshot`.
    pub fn from_snapshot(snapshot: IndexSnapshot) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(snapshot))),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.read_slot().is_some()
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Result<Arc<IndexSnapshot>> {
        self.read_slot().ok_or(Error::IndexNotReady)
    }

    /// Replaces the current snapshot, returning the previous one.
    pub fn install(&self, snapshot: IndexSnapshot) -> Option<Arc<IndexSnapshot>> {
        let next = Arc::new(snapshot);
        debug!(
            "installing index snapshot: {} entries, corpus {}",
            next.len(),
            next.version().corpus_hash
        );
        let mut slot = self.current.write().unwrap_or_else(|e| e.into_inner());
        slot.replace(next)
    }

    /// Embeds `records` with `builder` and swaps the result in.
    ///
    /// On failure the previous snapshot (if any) stays in place.
    pub fn build(
        &self,
        builder: &IndexBuilder<'_>,
        records: &[CorpusRecord],
    ) -> Result<Arc<IndexSnapshot>> {
        let snapshot = builder.build(records)?;
        self.install(snapshot);
        info!("vector index rebuilt from {} records", records.len());
        self.snapshot()
    }

    /// Returns up to `n` entries nearest to `vector`.
    pub fn query(&self, vector: &[f32], n: usize) -> Result<Vec<Candidate>> {
        self.snapshot()?.nearest(vector, n)
    }

    fn read_slot(&self) -> Option<Arc<IndexSnapshot>> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
