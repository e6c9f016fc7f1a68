//! Gemini integration for hrag
//!
//! This crate provides the Gemini implementation of the EmbeddingProvider
//! and LLMProvider traits.

mod client;
mod config;


pub use client::GeminiClient;
pub use config::{
    GeminiConfig, DEFAULT_API_URL, DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_GENERATION_MODEL,
};

// Re-export core types for convenience
pub use hrag_core::{
    EmbeddingProvider, EmbeddingTask, Error, GenerationConfig, GenerationResult, LLMProvider,
    Result,
};
