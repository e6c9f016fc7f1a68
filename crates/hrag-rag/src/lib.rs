//! Hybrid retrieval-augmented generation engine
//!
//! This crate provides the query pipeline: dense embedding with retries,
//! sparse encoding, the Qdrant index adapter, reciprocal-rank fusion,
//! context assembly, grounded answer generation and Recall@k evaluation.

mod answer;
mod context;
mod embedder;
mod engine;
mod eval;
mod fusion;
mod gateway;
mod qdrant;
mod sparse;

#[cfg(test)]
mod tests;

pub use answer::{AnswerGenerator, GeneratedAnswer, build_prompt};
pub use context::{CHUNK_SEPARATOR, DEFAULT_TOP_K, assemble};
pub use embedder::{DEFAULT_ATTEMPT_TIMEOUT, DenseEmbeddingClient};
pub use engine::HybridRagEngine;
pub use eval::{
    EvalDataset, EvalQuery, Qrels, RecallReport, parse_qrels, parse_queries, recall_at_k,
};
pub use fusion::{DEFAULT_RRF_K, fuse, fuse_scored};
pub use gateway::{FusedRetrieval, PayloadLookup, Retrieval, RetrievalGateway, merge_payloads};
pub use qdrant::{QdrantConfig, QdrantIndex};
#[cfg(feature = "splade")]
pub use sparse::SpladeSparseEncoder;
pub use sparse::{
    DEFAULT_BM25_MODEL, SPLADE_MODEL, SPLADE_VOCABULARY_SIZE, ServerBm25Encoder, SparseStrategy,
};

// Re-export core types for convenience
pub use hrag_core::{
    ContextBundle, Degradation, Error, FusionMode, QueryError, QueryOutcome, QueryRequest,
    QueryResponse, RAGEngine, RAGResult, Result, RetrievalConfig, RetryPolicy,
};
