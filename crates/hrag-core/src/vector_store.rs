//! Vector index trait and types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Result, ScoredChunk, SparseQuery};

/// A single-round-trip hybrid query fused by the index.
#[derive(Debug, Clone)]
pub struct FusedSearch<'a> {
    pub dense: &'a [f32],
    pub sparse: &'a SparseQuery,
    pub dense_limit: usize,
    pub sparse_limit: usize,
    pub limit: usize,
}

/// Summary of the collection backing the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub points_count: Option<u64>,
    /// Whether the named dense vector is declared.
    pub has_dense_vector: bool,
    /// Whether the named sparse vector is declared.
    pub has_sparse_vector: bool,
}

impl CollectionInfo {
    pub fn supports_hybrid(&self) -> bool {
        self.has_dense_vector && self.has_sparse_vector
    }
}

/// Trait for vector indexes holding one dense and one sparse named vector
/// per chunk (e.g., Qdrant).
///
/// Every search returns hits in descending score order, with payloads.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Nearest neighbours of a dense vector in the dense vector space.
    async fn search_dense(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredChunk>>;

    /// Best lexical matches in the sparse vector space.
    async fn search_sparse(&self, query: &SparseQuery, limit: usize) -> Result<Vec<ScoredChunk>>;

    /// Both searches as prefetches, fused with reciprocal-rank fusion by the index.
    async fn search_fused(&self, request: &FusedSearch<'_>) -> Result<Vec<ScoredChunk>>;

    /// Check that the index is reachable
    async fn health_check(&self) -> Result<()>;

    /// Describe the backing collection
    async fn collection_info(&self) -> Result<CollectionInfo>;
}
