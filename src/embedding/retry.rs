// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry wrapper for embedding providers.

use backon::{BlockingRetryable, ExponentialBuilder};
use std::time::Duration;
use tracing::warn;

use super::provider::EmbeddingProvider;
use crate::errors::EmbeddingError;

/// Wraps an embedding provider with bounded exponential backoff.
///
/// Only errors for which [`EmbeddingError::is_retryable`] holds are retried;
/// anything else is returned after the first attempt.
pub struct RetryingProvider {
    inner: Box<dyn EmbeddingProvider>,
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl RetryingProvider {
    /// Creates a new retry wrapper with default settings.
    ///
    /// Default settings:
    /// - Max attempts: 3
    /// - Initial delay: 500 milliseconds
    /// - Max delay: 10 seconds
    pub fn new(inner: Box<dyn EmbeddingProvider>) -> Self {
        Self {
            inner,
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }

    /// Sets the total number of attempts, including the first call.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the initial delay between retries.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay between retries.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
    }
}

impl EmbeddingProvider for RetryingProvider {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn batch_size(&self) -> usize {
        self.inner.batch_size()
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        (|| self.inner.embed_batch(texts))
            .retry(self.backoff())
            .sleep(std::thread::sleep)
            .when(EmbeddingError::is_retryable)
            .notify(|err: &EmbeddingError, delay: Duration| {
                warn!("embedding call failed ({}); retrying in {:?}", err, delay);
            })
            .call()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FlakyProvider {
        calls: Arc<AtomicUsize>,
        failures: usize,
        error: EmbeddingError,
    }

    impl EmbeddingProvider for FlakyProvider {
        fn model_id(&self) -> &str {
            "flaky"
        }

        fn batch_size(&self) -> usize {
            4
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(self.error.clone());
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn wrap(failures: usize, error: EmbeddingError, attempts: u32) -> (RetryingProvider, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = RetryingProvider::new(Box::new(FlakyProvider {
            calls: calls.clone(),
            failures,
            error,
        }))
        .with_max_attempts(attempts)
        .with_initial_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(2));
        (provider, calls)
    }

    #[test]
    fn test_retries_transient_until_success() {
        let (provider, calls) = wrap(2, EmbeddingError::Transient("429".into()), 3);
        let vector = provider.embed("query").unwrap();
        assert_eq!(vector, vec![1.0, 0.0]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let (provider, calls) = wrap(10, EmbeddingError::Timeout(Duration::from_secs(1)), 3);
        let err = provider.embed("query").unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_does_not_retry_invalid_input() {
        let (provider, calls) = wrap(10, EmbeddingError::InvalidInput("empty".into()), 5);
        let err = provider.embed("").unwrap_err();
        assert_eq!(err, EmbeddingError::InvalidInput("empty".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_builder_settings() {
        let (provider, _) = wrap(0, EmbeddingError::Transient(String::new()), 0);
        assert_eq!(provider.max_attempts, 1);
        assert_eq!(provider.model_id(), "flaky");
        assert_eq!(provider.batch_size(), 4);
    }
}
