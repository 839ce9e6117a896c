// SPDX-License-Identifier: MIT OR Apache-2.0

//! Index builder: embeds a corpus in fixed-size batches

use indicatif::ProgressBar;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use super::metric::DistanceMetric;
use super::vector::{CorpusEntry, IndexSnapshot, IndexVersion};
use super::SCHEMA_VERSION;
use crate::corpus::{corpus_fingerprint, CorpusRecord};
use crate::embedding::EmbeddingProvider;
use crate::errors::{Error, Result};

/// Builds a fresh [`IndexSnapshot`] from a full corpus.
///
/// The build is all-or-nothing: the first embedding failure aborts it and
/// nothing is returned.
pub struct IndexBuilder<'a> {
    provider: &'a dyn EmbeddingProvider,
    batch_size: usize,
    metric: DistanceMetric,
    progress: ProgressBar,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(provider: &'a dyn EmbeddingProvider) -> Self {
        Self {
            provider,
            batch_size: provider.batch_size().max(1),
            metric: DistanceMetric::default(),
            progress: ProgressBar::hidden(),
        }
    }

    /// Set number of corpus entries embedded per provider call
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set distance metric recorded in the index
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Report progress on the given bar (hidden by default)
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Embeds every record and assembles a validated snapshot.
    pub fn build(&self, records: &[CorpusRecord]) -> Result<IndexSnapshot> {
        self.progress.set_length(records.len() as u64);
        let result = self.build_inner(records);
        self.progress.finish_and_clear();
        result
    }

    fn build_inner(&self, records: &[CorpusRecord]) -> Result<IndexSnapshot> {
        if records.is_empty() {
            return Err(Error::IndexBuild("corpus is empty".to_string()));
        }
        if let Some(position) = records.iter().position(|r| r.query.trim().is_empty()) {
            return Err(Error::IndexBuild(format!(
                "record {} has an empty query",
                position
            )));
        }

        let mut entries: Vec<CorpusEntry> = Vec::with_capacity(records.len());
        let mut dimension: Option<usize> = None;

        for (batch_idx, chunk) in records.chunks(self.batch_size).enumerate() {
            let start = batch_idx * self.batch_size;
            let texts: Vec<String> = chunk.iter().map(|r| r.query.clone()).collect();

            let vectors = self.provider.embed_batch(&texts).map_err(|e| {
                Error::IndexBuild(format!(
                    "embedding batch {} (records {}..{}) failed: {}",
                    batch_idx,
                    start,
                    start + chunk.len(),
                    e
                ))
            })?;

            if vectors.len() != chunk.len() {
                return Err(Error::IndexBuild(format!(
                    "embedding batch {} returned {} vectors for {} records",
                    batch_idx,
                    vectors.len(),
                    chunk.len()
                )));
            }

            for (offset, (record, embedding)) in chunk.iter().zip(vectors).enumerate() {
                let position = start + offset;
                let expected = *dimension.get_or_insert(embedding.len());
                if embedding.len() != expected {
                    return Err(Error::IndexBuild(format!(
                        "dimension mismatch at record {}: got {}, expected {}",
                        position,
                        embedding.len(),
                        expected
                    )));
                }
                entries.push(CorpusEntry {
                    id: record.resolved_id(position),
                    query_text: record.query.clone(),
                    output: record.output.clone(),
                    embedding,
                });
            }

            debug!(
                "embedded batch {} ({} records, {} total)",
                batch_idx,
                chunk.len(),
                entries.len()
            );
            self.progress.inc(chunk.len() as u64);
        }

        let dimension = dimension.unwrap_or(0);
        let version = IndexVersion {
            schema_version: SCHEMA_VERSION,
            model_id: self.provider.model_id().to_string(),
            dimension,
            metric: self.metric,
            corpus_hash: corpus_fingerprint(records),
            entry_count: entries.len(),
            built_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs() as i64,
        };

        let snapshot = IndexSnapshot::new(version, entries)?;
        info!(
            "built index: {} entries, dimension {}, metric {}, model {}",
            snapshot.len(),
            snapshot.dimension(),
            snapshot.metric(),
            snapshot.version().model_id
        );
        Ok(snapshot)
    }
}
