//! Dense embedding provider trait and types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{DenseVector, Result};

/// How the embedded text will be used. Providers that distinguish queries
/// from documents produce better-aligned vectors when told.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmbeddingTask {
    RetrievalQuery,
    RetrievalDocument,
}

impl EmbeddingTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingTask::RetrievalQuery => "RETRIEVAL_QUERY",
            EmbeddingTask::RetrievalDocument => "RETRIEVAL_DOCUMENT",
        }
    }
}

/// Trait for dense embedding providers (e.g., Gemini, OpenAI, etc.)
///
/// One call to [`EmbeddingProvider::embed`] is one attempt against the
/// provider. Retrying is layered on top by the caller.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<DenseVector>;

    /// Length of every vector this provider returns.
    fn dimension(&self) -> usize;

    /// Get the model ID being used
    fn model_id(&self) -> &str;
}
