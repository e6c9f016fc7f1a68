//! Retrieval gateway: dense and sparse searches against one index

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use hrag_core::{
    ChunkId, ChunkPayload, Degradation, Error, FusedSearch, Result, ScoredChunk,
    SparseEncoder, SparseQuery, VectorIndex,
};

use crate::embedder::DenseEmbeddingClient;

/// Chunk text by identifier, built from the hits of both channels.
pub type PayloadLookup = HashMap<ChunkId, ChunkPayload>;

/// Both ranked hit lists for one query.
#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    pub dense_hits: Vec<ScoredChunk>,
    pub sparse_hits: Vec<ScoredChunk>,
    pub payloads: PayloadLookup,
    /// Set when the sparse channel was lost and only dense hits remain.
    pub degradation: Option<Degradation>,
}

impl Retrieval {
    /// Identifier rankings in channel order (dense, then sparse).
    pub fn rank_lists(&self) -> Vec<Vec<ChunkId>> {
        vec![ids(&self.dense_hits), ids(&self.sparse_hits)]
    }
}

/// A ranking already fused by the index.
#[derive(Debug, Clone, Default)]
pub struct FusedRetrieval {
    pub ranking: Vec<ChunkId>,
    pub payloads: PayloadLookup,
    pub degradation: Option<Degradation>,
}

fn ids(hits: &[ScoredChunk]) -> Vec<ChunkId> {
    hits.iter().map(|hit| hit.id.clone()).collect()
}

/// Build the payload lookup. Dense payloads win: a sparse payload is only
/// used for identifiers the dense hits did not already provide text for.
pub fn merge_payloads(dense: &[ScoredChunk], sparse: &[ScoredChunk]) -> PayloadLookup {
    let mut lookup = PayloadLookup::with_capacity(dense.len() + sparse.len());
    for hit in dense.iter().chain(sparse) {
        if let Some(payload) = &hit.payload {
            lookup
                .entry(hit.id.clone())
                .or_insert_with(|| payload.clone());
        }
    }
    lookup
}

async fn bounded<T>(limit: Duration, what: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| Error::Timeout(format!("{} did not complete within {:?}", what, limit)))?
}

/// Runs the dense and sparse channels of a hybrid query.
///
/// The dense channel is mandatory: any failure there fails retrieval. The
/// sparse channel is best effort: a failure is logged, recorded as a
/// [`Degradation`], and the query continues with dense hits only.
pub struct RetrievalGateway {
    embedder: DenseEmbeddingClient,
    encoder: Arc<dyn SparseEncoder>,
    index: Arc<dyn VectorIndex>,
    search_timeout: Duration,
}

impl RetrievalGateway {
    pub fn new(
        embedder: DenseEmbeddingClient,
        encoder: Arc<dyn SparseEncoder>,
        index: Arc<dyn VectorIndex>,
        search_timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            encoder,
            index,
            search_timeout,
        }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn embedder(&self) -> &DenseEmbeddingClient {
        &self.embedder
    }

    pub fn encoder(&self) -> &Arc<dyn SparseEncoder> {
        &self.encoder
    }

    /// Issue both searches concurrently and collect their hits.
    ///
    /// A `sparse_limit` of zero disables the sparse channel.
    pub async fn retrieve(
        &self,
        query: &str,
        dense_limit: usize,
        sparse_limit: usize,
    ) -> Result<Retrieval> {
        let started = Instant::now();
        let (dense, sparse) = tokio::join!(
            self.dense_path(query, dense_limit),
            self.sparse_path(query, sparse_limit)
        );

        let dense_hits = dense?;
        let (sparse_hits, degradation) = match sparse {
            Ok(hits) => (hits, None),
            Err(e) => {
                warn!(encoder = self.encoder.name(), error = %e, "sparse retrieval failed, continuing with dense results only");
                (
                    Vec::new(),
                    Some(Degradation::SparseUnavailable {
                        reason: e.to_string(),
                    }),
                )
            }
        };

        debug!(
            dense = dense_hits.len(),
            sparse = sparse_hits.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "hybrid retrieval complete"
        );

        let payloads = merge_payloads(&dense_hits, &sparse_hits);
        Ok(Retrieval {
            dense_hits,
            sparse_hits,
            payloads,
            degradation,
        })
    }

    /// Let the index fuse both channels in a single prefetch query.
    ///
    /// If the sparse query cannot be built or the fused query fails, the
    /// ranking falls back to a plain dense search.
    pub async fn retrieve_fused(
        &self,
        query: &str,
        dense_limit: usize,
        sparse_limit: usize,
        limit: usize,
    ) -> Result<FusedRetrieval> {
        let vector = self.embedder.embed_query(query).await?;

        let fused = match self.encode(query).await {
            Ok(sparse) => {
                let request = FusedSearch {
                    dense: &vector,
                    sparse: &sparse,
                    dense_limit,
                    sparse_limit,
                    limit,
                };
                bounded(self.search_timeout, "fused search", self.index.search_fused(&request)).await
            }
            Err(e) => Err(e),
        };

        match fused {
            Ok(hits) => Ok(FusedRetrieval {
                ranking: ids(&hits),
                payloads: merge_payloads(&hits, &[]),
                degradation: None,
            }),
            Err(e) => {
                warn!(error = %e, "server-fused query failed, falling back to dense search");
                let hits = self.search_dense(&vector, dense_limit).await?;
                Ok(FusedRetrieval {
                    ranking: ids(&hits),
                    payloads: merge_payloads(&hits, &[]),
                    degradation: Some(Degradation::SparseUnavailable {
                        reason: e.to_string(),
                    }),
                })
            }
        }
    }

    async fn dense_path(&self, query: &str, limit: usize) -> Result<Vec<ScoredChunk>> {
        let vector = self.embedder.embed_query(query).await?;
        self.search_dense(&vector, limit).await
    }

    async fn search_dense(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
        bounded(self.search_timeout, "dense search", self.index.search_dense(vector, limit)).await
    }

    /// Model inference is CPU bound, so it runs off the async workers.
    async fn encode(&self, query: &str) -> Result<SparseQuery> {
        let encoder = self.encoder.clone();
        let text = query.to_string();
        tokio::task::spawn_blocking(move || encoder.encode(&text))
            .await
            .map_err(|e| Error::SparseEncoder(format!("encoder task failed: {}", e)))?
    }

    async fn sparse_path(&self, query: &str, limit: usize) -> Result<Vec<ScoredChunk>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let sparse = self.encode(query).await?;
        bounded(self.search_timeout, "sparse search", self.index.search_sparse(&sparse, limit)).await
    }
}
