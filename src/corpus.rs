// SPDX-License-Identifier: MIT OR Apache-2.0

//! Corpus loading.
//!
//! A corpus is a list of (query, output) records. The output is an opaque
//! JSON tree that is stored and echoed back untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::errors::{Error, Result};

/// One labeled example as read from a corpus file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusRecord {
    /// Optional caller-supplied identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Natural-language query
    #[serde(alias = "user_intent", alias = "query_text")]
    pub query: String,
    /// Structured output payload
    #[serde(alias = "tmf921_intent")]
    pub output: Value,
}

impl CorpusRecord {
    pub fn new(query: impl Into<String>, output: Value) -> Self {
        Self {
            id: None,
            query: query.into(),
            output,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Identifier used in the index: the record id or `entry_{position}`.
    pub fn resolved_id(&self, position: usize) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("entry_{}", position))
    }
}

/// Loads a corpus from a JSON array file or a JSON Lines (`.jsonl`) file.
pub fn load_corpus(path: impl AsRef<Path>) -> Result<Vec<CorpusRecord>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Corpus(format!("failed to read {}: {}", path.display(), e)))?;

    let is_jsonl = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jsonl"));

    if is_jsonl {
        parse_jsonl(&content)
    } else {
        serde_json::from_str(&content)
            .map_err(|e| Error::Corpus(format!("failed to parse {}: {}", path.display(), e)))
    }
}

fn parse_jsonl(content: &str) -> Result<Vec<CorpusRecord>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line)
                .map_err(|e| Error::Corpus(format!("line {}: {}", idx + 1, e)))
        })
        .collect()
}

/// Stable fingerprint of a corpus, used to detect stale indices.
pub fn corpus_fingerprint(records: &[CorpusRecord]) -> String {
    let mut hasher = blake3::Hasher::new();
    for (position, record) in records.iter().enumerate() {
        hasher.update(record.resolved_id(position).as_bytes());
        hasher.update(&[0]);
        hasher.update(record.query.as_bytes());
        hasher.update(&[0]);
        hasher.update(record.output.to_string().as_bytes());
        hasher.update(&[0xff]);
    }
    hasher.finalize().to_hex()[..32].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_load_json_array_with_aliases() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("train.json");
        std::fs::write(
            &path,
            r#"[
                {"user_intent": "deploy a 5ms slice", "tmf921_intent": {"name": "A"}},
                {"id": "custom", "query": "stream 4k video", "output": {"name": "C"}}
            ]"#,
        )
        .unwrap();

        let records = load_corpus(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].query, "deploy a 5ms slice");
        assert_eq!(records[0].output, json!({"name": "A"}));
        assert_eq!(records[0].resolved_id(0), "entry_0");
        assert_eq!(records[1].resolved_id(1), "custom");
    }

    #[test]
    fn test_load_jsonl_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("train.jsonl");
        std::fs::write(
            &path,
            "{\"query\": \"a\", \"output\": 1}\n\n{\"query\": \"b\", \"output\": [2]}\n",
        )
        .unwrap();

        let records = load_corpus(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].output, json!([2]));
    }

    #[test]
    fn test_load_reports_bad_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("train.jsonl");
        std::fs::write(&path, "{\"query\": \"a\", \"output\": 1}\nnot json\n").unwrap();

        let err = load_corpus(&path).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = vec![CorpusRecord::new("deploy", json!({"x": 1}))];
        let b = vec![CorpusRecord::new("deploy", json!({"x": 2}))];
        assert_eq!(corpus_fingerprint(&a), corpus_fingerprint(&a.clone()));
        assert_ne!(corpus_fingerprint(&a), corpus_fingerprint(&b));
        assert_eq!(corpus_fingerprint(&a).len(), 32);
    }
}
