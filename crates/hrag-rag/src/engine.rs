//! Hybrid RAG engine implementation

use async_trait::async_trait;
use serde_json::json;
use std::time::Instant;
use tracing::{debug, info};

use hrag_core::{
    ContextBundle, Degradation, FusionMode, QueryError, QueryOutcome, QueryRequest,
    QueryResponse, RAGEngine, RAGResult, Result, RetrievalConfig,
};

use crate::answer::AnswerGenerator;
use crate::context::assemble;
use crate::fusion::fuse;
use crate::gateway::RetrievalGateway;

/// Hybrid dense + sparse RAG engine.
///
/// Owns the retrieval gateway and the answer generator; both hold
/// process-lifetime clients shared through `Arc`.
pub struct HybridRagEngine {
    gateway: RetrievalGateway,
    generator: AnswerGenerator,
    config: RetrievalConfig,
}

impl HybridRagEngine {
    /// Create a new hybrid RAG engine
    pub fn new(
        gateway: RetrievalGateway,
        generator: AnswerGenerator,
        config: RetrievalConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            gateway,
            generator,
            config,
        })
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    fn validate_query(query: &str) -> std::result::Result<&str, QueryError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(QueryError::InvalidInput("query must not be empty".to_string()));
        }
        Ok(query)
    }

    async fn assemble_context(&self, query: &str) -> std::result::Result<RAGResult, QueryError> {
        let started = Instant::now();
        let mut degradations = Vec::new();

        let bundle = match self.config.fusion_mode {
            FusionMode::Client => {
                let retrieval = self
                    .gateway
                    .retrieve(query, self.config.dense_limit, self.config.sparse_limit)
                    .await
                    .map_err(QueryError::Retrieval)?;
                degradations.extend(retrieval.degradation.clone());

                let fused = fuse(&retrieval.rank_lists(), self.config.rrf_k);
                assemble(&fused, &retrieval.payloads, self.config.top_k)
            }
            FusionMode::Server => {
                let retrieval = self
                    .gateway
                    .retrieve_fused(
                        query,
                        self.config.dense_limit,
                        self.config.sparse_limit,
                        self.config.top_k,
                    )
                    .await
                    .map_err(QueryError::Retrieval)?;
                degradations.extend(retrieval.degradation);

                assemble(&retrieval.ranking, &retrieval.payloads, self.config.top_k)
            }
        };

        debug!(
            chunks = bundle.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "context assembled"
        );

        Ok(RAGResult {
            bundle,
            degradations,
        })
    }
}

#[async_trait]
impl RAGEngine for HybridRagEngine {
    async fn retrieve(&self, query: &str) -> std::result::Result<RAGResult, QueryError> {
        let query = Self::validate_query(query)?;
        self.assemble_context(query).await
    }

    async fn query(&self, request: &QueryRequest) -> std::result::Result<QueryOutcome, QueryError> {
        let query = Self::validate_query(&request.query)?;
        let RAGResult {
            bundle,
            mut degradations,
        } = self.assemble_context(query).await?;

        if bundle.is_empty() {
            info!("no usable context retrieved, skipping generation");
            degradations.push(Degradation::NoContext);
            return Ok(QueryOutcome {
                response: QueryResponse::insufficient_information(),
                degradations,
            });
        }

        let answer = self.generator.answer(query, &bundle).await;
        degradations.extend(answer.degradation);

        let ContextBundle { sources, .. } = bundle;
        Ok(QueryOutcome {
            response: QueryResponse {
                answer: answer.text,
                sources,
                query: Some(query.to_string()),
            },
            degradations,
        })
    }

    async fn stats(&self) -> Result<serde_json::Value> {
        let collection = self.gateway.index().collection_info().await?;

        Ok(json!({
            "collection": collection,
            "embedding_model": self.gateway.embedder().model_id(),
            "embedding_dimension": self.gateway.embedder().dimension(),
            "sparse_encoder": self.gateway.encoder().name(),
            "generation_model": self.generator.model_id(),
            "retrieval": {
                "dense_limit": self.config.dense_limit,
                "sparse_limit": self.config.sparse_limit,
                "top_k": self.config.top_k,
                "rrf_k": self.config.rrf_k,
                "fusion_mode": self.config.fusion_mode,
                "search_timeout_secs": self.config.search_timeout.as_secs_f64(),
            },
        }))
    }
}
