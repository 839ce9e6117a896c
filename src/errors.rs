// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for exemplar retrieval.
//!
//! The library reports failures through [`Error`]; it never substitutes a
//! fallback result. Embedding failures carry an [`EmbeddingError`] so callers
//! can tell retryable provider trouble from bad input.

use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by an embedding provider.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EmbeddingError {
    /// Network, rate-limit or process hiccup; retrying may succeed.
    #[error("transient embedding failure: {0}")]
    Transient(String),

    /// The provider did not answer in time.
    #[error("embedding provider timed out after {0:?}")]
    Timeout(Duration),

    /// The provider rejected the input itself.
    #[error("embedding provider rejected input: {0}")]
    InvalidInput(String),

    /// The provider failed in a way that retrying will not fix.
    #[error("embedding provider failed: {0}")]
    Provider(String),
}

impl EmbeddingError {
    /// Whether a retry with backoff may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EmbeddingError::Transient(_) | EmbeddingError::Timeout(_))
    }
}

/// Errors produced by index construction and retrieval.
#[derive(Debug, Error)]
pub enum Error {
    /// Building the index failed; nothing was committed.
    #[error("index build failed: {0}")]
    IndexBuild(String),

    /// A query arrived before any index was built or loaded.
    #[error("index is not ready; build or load an index before querying")]
    IndexNotReady,

    /// Embedding the query failed.
    #[error(transparent)]
    EmbeddingProvider(#[from] EmbeddingError),

    /// The request parameters are out of range.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The persisted index does not match the current model or corpus.
    #[error("stale index: {0}")]
    StaleIndex(String),

    /// The corpus file could not be read or parsed.
    #[error("corpus error: {0}")]
    Corpus(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("index storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::EmbeddingProvider(err) => err.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(EmbeddingError::Transient("rate limited".into()).is_retryable());
        assert!(EmbeddingError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!EmbeddingError::InvalidInput("empty".into()).is_retryable());
        assert!(!EmbeddingError::Provider("model missing".into()).is_retryable());
    }

    #[test]
    fn test_error_wraps_embedding_failure() {
        let err: Error = EmbeddingError::Transient("503".into()).into();
        assert!(err.is_retryable());
        assert!(!Error::IndexNotReady.is_retryable());
        assert!(!Error::InvalidRequest("k must be at least 1".into()).is_retryable());
    }
}
