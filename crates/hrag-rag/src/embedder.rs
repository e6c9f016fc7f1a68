//! Dense query embedding with bounded retries

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use hrag_core::{DenseVector, EmbeddingProvider, EmbeddingTask, Error, Result, RetryPolicy};

/// Default upper bound for a single embedding attempt.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Wraps an [`EmbeddingProvider`] with the retry policy used for queries.
///
/// Only transient failures (rate limiting, 5xx, network, timeouts) are
/// retried. Anything else is returned after the first attempt.
#[derive(Clone)]
pub struct DenseEmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    retry: RetryPolicy,
    attempt_timeout: Duration,
}

impl DenseEmbeddingClient {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            retry: RetryPolicy::default(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    /// Embed a query for retrieval.
    pub async fn embed_query(&self, text: &str) -> Result<DenseVector> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.attempt(text).await {
                Ok(vector) => {
                    debug!(attempt, dimension = vector.len(), "query embedded");
                    return Ok(vector);
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "embedding attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!(attempts = attempt, error = %e, "embedding retries exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn attempt(&self, text: &str) -> Result<DenseVector> {
        let vector = tokio::time::timeout(
            self.attempt_timeout,
            self.provider.embed(text, EmbeddingTask::RetrievalQuery),
        )
        .await
        .map_err(|_| {
            Error::Timeout(format!(
                "embedding did not complete within {:?}",
                self.attempt_timeout
            ))
        })??;

        let expected = self.provider.dimension();
        if vector.len() != expected {
            return Err(Error::Embedding(format!(
                "expected {} dimensions, got {}",
                expected,
                vector.len()
            )));
        }
        Ok(vector)
    }
}
