//! Core traits and types for hrag
//!
//! This crate defines the domain types, error taxonomy and provider-facing
//! interfaces shared across the workspace: embedding providers, sparse
//! encoders, vector indexes, generative models and the RAG engine itself.
//! Everything external sits behind a trait so tests can substitute fakes.

pub mod embedding;
pub mod error;
pub mod llm;
pub mod rag;
pub mod sparse;
pub mod types;
pub mod vector_store;

pub use embedding::{EmbeddingProvider, EmbeddingTask};
pub use error::{Error, QueryError, Result};
pub use llm::{GenerationConfig, GenerationResult, LLMProvider};
pub use rag::{ContextBundle, RAGEngine, RAGResult};
pub use sparse::SparseEncoder;
pub use types::*;
pub use vector_store::{CollectionInfo, FusedSearch, VectorIndex};
