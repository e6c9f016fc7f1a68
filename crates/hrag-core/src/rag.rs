//! RAG (Retrieval-Augmented Generation) engine trait and types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Degradation, QueryError, QueryOutcome, QueryRequest, Result, SourceRecord};

/// The top-ranked chunks, concatenated for the prompt and listed for
/// attribution. `sources[i]` is the i-th block of `context`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextBundle {
    pub context: String,
    pub sources: Vec<SourceRecord>,
}

impl ContextBundle {
    /// True when there is nothing worth sending to the model.
    pub fn is_empty(&self) -> bool {
        self.context.trim().is_empty()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }
}

/// Result from RAG retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RAGResult {
    pub bundle: ContextBundle,
    pub degradations: Vec<Degradation>,
}

/// Trait for RAG engines
///
/// `retrieve` stops after context assembly; `query` also generates the
/// answer. Both reject blank input before doing any I/O.
#[async_trait]
pub trait RAGEngine: Send + Sync {
    /// Retrieve, fuse and assemble context for a question
    async fn retrieve(&self, query: &str) -> std::result::Result<RAGResult, QueryError>;

    /// Answer a request end to end
    async fn query(&self, request: &QueryRequest) -> std::result::Result<QueryOutcome, QueryError>;

    /// Get statistics about the RAG engine
    async fn stats(&self) -> Result<serde_json::Value>;
}
