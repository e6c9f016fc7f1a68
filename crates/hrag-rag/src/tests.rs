//! End-to-end engine tests against in-memory fakes

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use hrag_core::{
    ChunkId, ChunkPayload, CollectionInfo, DenseVector, EmbeddingProvider, EmbeddingTask, Error,
    FusedSearch, GenerationConfig, GenerationResult, LLMProvider, Result, ScoredChunk,
    SparseEncoder, SparseQuery, VectorIndex, INSUFFICIENT_INFORMATION,
};

use crate::*;

const DIMENSION: usize = 4;

#[derive(Default)]
struct FakeEmbedder {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    async fn embed(&self, _text: &str, _task: EmbeddingTask) -> Result<DenseVector> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Upstream {
                status: 401,
                message: "API key not valid".to_string(),
            });
        }
        Ok(vec![0.1; DIMENSION])
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn model_id(&self) -> &str {
        "fake-embedding"
    }
}

#[derive(Default)]
struct FakeEncoder {
    calls: AtomicUsize,
    fail: bool,
}

impl SparseEncoder for FakeEncoder {
    fn encode(&self, text: &str) -> Result<SparseQuery> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::SparseEncoder("model not loaded".to_string()));
        }
        Ok(SparseQuery::Text {
            text: text.to_string(),
            model: "fake".to_string(),
        })
    }

    fn name(&self) -> &str {
        "fake"
    }
}

#[derive(Default)]
struct FakeIndex {
    dense: Vec<ScoredChunk>,
    sparse: Option<Vec<ScoredChunk>>,
    fused: Option<Vec<ScoredChunk>>,
    dense_delay: Option<Duration>,
    sparse_delay: Option<Duration>,
    calls: AtomicUsize,
}

async fn stall(delay: Option<Duration>) {
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl VectorIndex for FakeIndex {
    async fn search_dense(&self, _vector: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        stall(self.dense_delay).await;
        Ok(self.dense.iter().take(limit).cloned().collect())
    }

    async fn search_sparse(&self, _query: &SparseQuery, limit: usize) -> Result<Vec<ScoredChunk>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        stall(self.sparse_delay).await;
        match &self.sparse {
            Some(hits) => Ok(hits.iter().take(limit).cloned().collect()),
            None => Err(Error::VectorStore("sparse vector 'sparse' not found".to_string())),
        }
    }

    async fn search_fused(&self, request: &FusedSearch<'_>) -> Result<Vec<ScoredChunk>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.fused {
            Some(hits) => Ok(hits.iter().take(request.limit).cloned().collect()),
            None => Err(Error::VectorStore("prefetch failed".to_string())),
        }
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn collection_info(&self) -> Result<CollectionInfo> {
        Ok(CollectionInfo {
            name: "hospital-rag-data".to_string(),
            points_count: Some(self.dense.len() as u64),
            has_dense_vector: true,
            has_sparse_vector: true,
        })
    }
}

enum Reply {
    Text(&'static str),
    Fail,
}

struct FakeLlm {
    reply: Reply,
    prompts: Mutex<Vec<String>>,
}

impl FakeLlm {
    fn new(reply: Reply) -> Self {
        Self {
            reply,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LLMProvider for FakeLlm {
    async fn generate(&self, prompt: &str) -> Result<GenerationResult> {
        self.generate_with_config(prompt, &GenerationConfig::default()).await
    }

    async fn generate_with_config(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<GenerationResult> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.reply {
            Reply::Text(text) => Ok(GenerationResult {
                text: text.to_string(),
                model_id: config.model_id.clone(),
                tokens_used: None,
            }),
            Reply::Fail => Err(Error::Upstream {
                status: 503,
                message: "model overloaded".to_string(),
            }),
        }
    }

    fn model_id(&self) -> &str {
        "fake-llm"
    }
}

fn hit(id: u64, text: &str) -> ScoredChunk {
    ScoredChunk {
        id: ChunkId::Num(id),
        score: 0.5,
        payload: Some(ChunkPayload::new(text)),
    }
}

fn hospital_hits(ids: &[u64]) -> Vec<ScoredChunk> {
    ids.iter()
        .map(|id| hit(*id, &format!("chunk {}", id)))
        .collect()
}

struct Fixture {
    embedder: Arc<FakeEmbedder>,
    encoder: Arc<FakeEncoder>,
    index: Arc<FakeIndex>,
    llm: Arc<FakeLlm>,
}

impl Fixture {
    fn new(embedder: FakeEmbedder, encoder: FakeEncoder, index: FakeIndex, llm: FakeLlm) -> Self {
        Self {
            embedder: Arc::new(embedder),
            encoder: Arc::new(encoder),
            index: Arc::new(index),
            llm: Arc::new(llm),
        }
    }

    fn engine(&self, config: RetrievalConfig) -> HybridRagEngine {
        self.engine_with_timeout(config, Duration::from_secs(1))
    }

    fn engine_with_timeout(&self, config: RetrievalConfig, search_timeout: Duration) -> HybridRagEngine {
        let embedder =
            DenseEmbeddingClient::new(self.embedder.clone()).with_retry(RetryPolicy::none());
        let gateway = RetrievalGateway::new(
            embedder,
            self.encoder.clone(),
            self.index.clone(),
            search_timeout,
        );
        HybridRagEngine::new(gateway, AnswerGenerator::new(self.llm.clone()), config).unwrap()
    }
}

fn ids_of(outcome: &QueryOutcome) -> Vec<ChunkId> {
    outcome.response.sources.iter().map(|s| s.id.clone()).collect()
}

#[tokio::test]
async fn test_fused_sources_follow_rrf_order() {
    let fixture = Fixture::new(
        FakeEmbedder::default(),
        FakeEncoder::default(),
        FakeIndex {
            dense: hospital_hits(&[1, 2, 3]),
            sparse: Some(hospital_hits(&[2, 4, 1])),
            ..Default::default()
        },
        FakeLlm::new(Reply::Text("Visiting hours are 4pm to 7pm.")),
    );
    let config = RetrievalConfig {
        top_k: 3,
        ..RetrievalConfig::default()
    };

    let outcome = fixture
        .engine(config)
        .query(&QueryRequest::new("visiting hours"))
        .await
        .unwrap();

    assert_eq!(ids_of(&outcome), vec![ChunkId::Num(2), ChunkId::Num(1), ChunkId::Num(4)]);
    assert_eq!(outcome.response.answer, "Visiting hours are 4pm to 7pm.");
    assert_eq!(outcome.response.query.as_deref(), Some("visiting hours"));
    assert!(!outcome.is_degraded());

    let prompts = fixture.llm.prompts.lock().unwrap();
    assert!(prompts[0].contains("chunk 2\n\nchunk 1\n\nchunk 4"));
}

#[tokio::test]
async fn test_sparse_failure_degrades_to_dense_only() {
    let fixture = Fixture::new(
        FakeEmbedder::default(),
        FakeEncoder::default(),
        FakeIndex {
            dense: hospital_hits(&[7, 8, 9]),
            sparse: None,
            ..Default::default()
        },
        FakeLlm::new(Reply::Text("The cardiology ward is on floor 3.")),
    );

    let outcome = fixture
        .engine(RetrievalConfig::default())
        .query(&QueryRequest::new("where is cardiology"))
        .await
        .unwrap();

    assert_eq!(ids_of(&outcome), vec![ChunkId::Num(7), ChunkId::Num(8), ChunkId::Num(9)]);
    assert_eq!(outcome.response.answer, "The cardiology ward is on floor 3.");
    assert!(matches!(
        outcome.degradations.as_slice(),
        [Degradation::SparseUnavailable { .. }]
    ));
}

#[tokio::test]
async fn test_sparse_encoder_failure_degrades_to_dense_only() {
    let fixture = Fixture::new(
        FakeEmbedder::default(),
        FakeEncoder {
            fail: true,
            ..Default::default()
        },
        FakeIndex {
            dense: hospital_hits(&[5]),
            sparse: Some(hospital_hits(&[6])),
            ..Default::default()
        },
        FakeLlm::new(Reply::Text("Yes.")),
    );

    let outcome = fixture
        .engine(RetrievalConfig::default())
        .query(&QueryRequest::new("is parking free"))
        .await
        .unwrap();

    assert_eq!(ids_of(&outcome), vec![ChunkId::Num(5)]);
    assert_eq!(outcome.degradations.len(), 1);
}

#[tokio::test]
async fn test_slow_sparse_search_degrades_to_dense_only() {
    let fixture = Fixture::new(
        FakeEmbedder::default(),
        FakeEncoder::default(),
        FakeIndex {
            dense: hospital_hits(&[3, 1]),
            sparse: Some(hospital_hits(&[9])),
            sparse_delay: Some(Duration::from_millis(500)),
            ..Default::default()
        },
        FakeLlm::new(Reply::Text("Radiology opens at 8am.")),
    );

    let outcome = fixture
        .engine_with_timeout(RetrievalConfig::default(), Duration::from_millis(10))
        .query(&QueryRequest::new("radiology opening time"))
        .await
        .unwrap();

    assert_eq!(ids_of(&outcome), vec![ChunkId::Num(3), ChunkId::Num(1)]);
    assert_eq!(outcome.response.answer, "Radiology opens at 8am.");
    match outcome.degradations.as_slice() {
        [Degradation::SparseUnavailable { reason }] => {
            assert!(reason.contains("sparse search"), "{}", reason)
        }
        other => panic!("unexpected degradations: {:?}", other),
    }
}

#[tokio::test]
async fn test_slow_dense_search_is_fatal() {
    let fixture = Fixture::new(
        FakeEmbedder::default(),
        FakeEncoder::default(),
        FakeIndex {
            dense: hospital_hits(&[1]),
            sparse: Some(hospital_hits(&[2])),
            dense_delay: Some(Duration::from_millis(500)),
            ..Default::default()
        },
        FakeLlm::new(Reply::Text("unused")),
    );

    let err = fixture
        .engine_with_timeout(RetrievalConfig::default(), Duration::from_millis(10))
        .query(&QueryRequest::new("icu visiting rules"))
        .await
        .unwrap_err();

    assert!(matches!(err, QueryError::Retrieval(Error::Timeout(_))));
    assert_eq!(err.kind(), "retrieval_failed");
    assert_eq!(fixture.llm.calls(), 0);
}

#[tokio::test]
async fn test_no_hits_returns_fixed_answer() {
    let fixture = Fixture::new(
        FakeEmbedder::default(),
        FakeEncoder::default(),
        FakeIndex {
            sparse: Some(Vec::new()),
            ..Default::default()
        },
        FakeLlm::new(Reply::Text("should not be called")),
    );

    let outcome = fixture
        .engine(RetrievalConfig::default())
        .query(&QueryRequest::new("what is the helipad frequency"))
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(&outcome.response).unwrap(),
        serde_json::json!({
            "answer": "I don't have enough information to answer that.",
            "sources": []
        })
    );
    assert_eq!(outcome.degradations, vec![Degradation::NoContext]);
    assert_eq!(fixture.llm.calls(), 0);
}

#[tokio::test]
async fn test_hits_without_text_count_as_no_context() {
    let fixture = Fixture::new(
        FakeEmbedder::default(),
        FakeEncoder::default(),
        FakeIndex {
            dense: vec![
                ScoredChunk {
                    id: ChunkId::Num(1),
                    score: 0.9,
                    payload: None,
                },
                hit(2, "  \n "),
            ],
            sparse: Some(Vec::new()),
            ..Default::default()
        },
        FakeLlm::new(Reply::Text("should not be called")),
    );

    let outcome = fixture
        .engine(RetrievalConfig::default())
        .query(&QueryRequest::new("pharmacy hours"))
        .await
        .unwrap();

    assert_eq!(outcome.response, QueryResponse::insufficient_information());
    assert_eq!(fixture.llm.calls(), 0);
}

#[tokio::test]
async fn test_generation_failure_keeps_sources() {
    let fixture = Fixture::new(
        FakeEmbedder::default(),
        FakeEncoder::default(),
        FakeIndex {
            dense: hospital_hits(&[1, 2]),
            sparse: Some(hospital_hits(&[2])),
            ..Default::default()
        },
        FakeLlm::new(Reply::Fail),
    );

    let outcome = fixture
        .engine(RetrievalConfig::default())
        .query(&QueryRequest::new("blood bank timings"))
        .await
        .unwrap();

    assert_eq!(outcome.response.answer, INSUFFICIENT_INFORMATION);
    assert_eq!(ids_of(&outcome), vec![ChunkId::Num(2), ChunkId::Num(1)]);
    assert!(matches!(
        outcome.degradations.as_slice(),
        [Degradation::GenerationFailed { .. }]
    ));
}

#[tokio::test]
async fn test_empty_model_output_uses_refusal() {
    let fixture = Fixture::new(
        FakeEmbedder::default(),
        FakeEncoder::default(),
        FakeIndex {
            dense: hospital_hits(&[1]),
            sparse: Some(Vec::new()),
            ..Default::default()
        },
        FakeLlm::new(Reply::Text("   ")),
    );

    let outcome = fixture
        .engine(RetrievalConfig::default())
        .query(&QueryRequest::new("ambulance number"))
        .await
        .unwrap();

    assert_eq!(outcome.response.answer, INSUFFICIENT_INFORMATION);
    assert_eq!(outcome.response.sources.len(), 1);
}

#[tokio::test]
async fn test_blank_query_touches_nothing() {
    let fixture = Fixture::new(
        FakeEmbedder::default(),
        FakeEncoder::default(),
        FakeIndex {
            dense: hospital_hits(&[1]),
            ..Default::default()
        },
        FakeLlm::new(Reply::Text("unused")),
    );
    let engine = fixture.engine(RetrievalConfig::default());

    for blank in ["", "   ", "\n\t"] {
        let err = engine.query(&QueryRequest::new(blank)).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
        assert!(engine.retrieve(blank).await.is_err());
    }

    assert_eq!(fixture.embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(fixture.encoder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(fixture.index.calls.load(Ordering::SeqCst), 0);
    assert_eq!(fixture.llm.calls(), 0);
}

#[tokio::test]
async fn test_dense_failure_is_fatal() {
    let fixture = Fixture::new(
        FakeEmbedder {
            fail: true,
            ..Default::default()
        },
        FakeEncoder::default(),
        FakeIndex {
            sparse: Some(hospital_hits(&[1])),
            ..Default::default()
        },
        FakeLlm::new(Reply::Text("unused")),
    );

    let err = fixture
        .engine(RetrievalConfig::default())
        .query(&QueryRequest::new("icu visiting rules"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "retrieval_failed");
    assert_eq!(fixture.llm.calls(), 0);
}

#[tokio::test]
async fn test_dense_payload_wins_in_context() {
    let fixture = Fixture::new(
        FakeEmbedder::default(),
        FakeEncoder::default(),
        FakeIndex {
            dense: vec![hit(1, "dense copy")],
            sparse: Some(vec![hit(1, "sparse copy")]),
            ..Default::default()
        },
        FakeLlm::new(Reply::Text("ok")),
    );

    let result = fixture
        .engine(RetrievalConfig::default())
        .retrieve("anything")
        .await
        .unwrap();

    assert_eq!(result.bundle.context, "dense copy");
}

#[tokio::test]
async fn test_server_fusion_uses_index_order() {
    let fixture = Fixture::new(
        FakeEmbedder::default(),
        FakeEncoder::default(),
        FakeIndex {
            dense: hospital_hits(&[1, 2, 3]),
            fused: Some(hospital_hits(&[3, 1])),
            ..Default::default()
        },
        FakeLlm::new(Reply::Text("ok")),
    );
    let config = RetrievalConfig {
        fusion_mode: FusionMode::Server,
        ..RetrievalConfig::default()
    };

    let outcome = fixture
        .engine(config)
        .query(&QueryRequest::new("discharge process"))
        .await
        .unwrap();

    assert_eq!(ids_of(&outcome), vec![ChunkId::Num(3), ChunkId::Num(1)]);
    assert!(!outcome.is_degraded());
}

#[tokio::test]
async fn test_server_fusion_falls_back_to_dense() {
    let fixture = Fixture::new(
        FakeEmbedder::default(),
        FakeEncoder::default(),
        FakeIndex {
            dense: hospital_hits(&[4, 5]),
            fused: None,
            ..Default::default()
        },
        FakeLlm::new(Reply::Text("ok")),
    );
    let config = RetrievalConfig {
        fusion_mode: FusionMode::Server,
        ..RetrievalConfig::default()
    };

    let outcome = fixture
        .engine(config)
        .query(&QueryRequest::new("discharge process"))
        .await
        .unwrap();

    assert_eq!(ids_of(&outcome), vec![ChunkId::Num(4), ChunkId::Num(5)]);
    assert!(matches!(
        outcome.degradations.as_slice(),
        [Degradation::SparseUnavailable { .. }]
    ));
}

#[tokio::test]
async fn test_stats_reports_collection_and_config() {
    let fixture = Fixture::new(
        FakeEmbedder::default(),
        FakeEncoder::default(),
        FakeIndex {
            dense: hospital_hits(&[1, 2]),
            ..Default::default()
        },
        FakeLlm::new(Reply::Text("ok")),
    );

    let stats = fixture
        .engine(RetrievalConfig::default())
        .stats()
        .await
        .unwrap();

    assert_eq!(stats["collection"]["points_count"], 2);
    assert_eq!(stats["retrieval"]["top_k"], 6);
    assert_eq!(stats["retrieval"]["fusion_mode"], "client");
    assert_eq!(stats["sparse_encoder"], "fake");
    assert_eq!(stats["embedding_dimension"], DIMENSION);
}

#[tokio::test]
async fn test_recall_compares_dense_only_with_hybrid() {
    let fixture = Fixture::new(
        FakeEmbedder::default(),
        FakeEncoder::default(),
        FakeIndex {
            dense: hospital_hits(&[1, 2, 3, 4]),
            sparse: Some(hospital_hits(&[9])),
            ..Default::default()
        },
        FakeLlm::new(Reply::Text("unused")),
    );
    let hybrid_config = RetrievalConfig {
        dense_limit: 3,
        top_k: 3,
        ..RetrievalConfig::default()
    };
    let dense_config = RetrievalConfig {
        sparse_limit: 0,
        ..hybrid_config.clone()
    };

    let queries = parse_queries(std::io::Cursor::new(concat!(
        "{\"_id\": \"q0\", \"text\": \"helipad location\"}\n",
        "{\"_id\": \"q1\", \"text\": \"visiting hours\"}\n",
        "{\"_id\": \"q2\", \"text\": \"unjudged question\"}\n",
    )))
    .unwrap();
    let qrels = parse_qrels(std::io::Cursor::new("q0 0 9 1\nq1 0 2 1\n")).unwrap();
    let dataset = EvalDataset::new(queries, qrels);

    let dense = recall_at_k(&fixture.engine(dense_config), "dense", &dataset, 3).await;
    let hybrid = recall_at_k(&fixture.engine(hybrid_config), "hybrid", &dataset, 3).await;

    assert_eq!((dense.hits, dense.evaluated, dense.failed), (1, 2, 0));
    assert!((dense.recall - 0.5).abs() < 1e-12);
    assert_eq!((hybrid.hits, hybrid.evaluated), (2, 2));
    assert!((hybrid.recall - 1.0).abs() < 1e-12);
    assert_eq!(fixture.llm.calls(), 0);
}

#[tokio::test]
async fn test_recall_counts_failed_queries_as_misses() {
    let fixture = Fixture::new(
        FakeEmbedder {
            fail: true,
            ..Default::default()
        },
        FakeEncoder::default(),
        FakeIndex::default(),
        FakeLlm::new(Reply::Text("unused")),
    );
    let dataset = EvalDataset::new(
        vec![EvalQuery {
            id: "q0".to_string(),
            text: "pharmacy".to_string(),
        }],
        parse_qrels(std::io::Cursor::new("q0 0 1 1\n")).unwrap(),
    );

    let report = recall_at_k(&fixture.engine(RetrievalConfig::default()), "dense", &dataset, 5).await;

    assert_eq!(report.failed, 1);
    assert_eq!(report.hits, 0);
    assert_eq!(report.recall, 0.0);
}

#[test]
fn test_engine_rejects_invalid_config() {
    let fixture = Fixture::new(
        FakeEmbedder::default(),
        FakeEncoder::default(),
        FakeIndex::default(),
        FakeLlm::new(Reply::Text("ok")),
    );
    let gateway = RetrievalGateway::new(
        DenseEmbeddingClient::new(fixture.embedder.clone()),
        fixture.encoder.clone(),
        fixture.index.clone(),
        Duration::from_secs(1),
    );
    let config = RetrievalConfig {
        top_k: 0,
        ..RetrievalConfig::default()
    };

    assert!(HybridRagEngine::new(gateway, AnswerGenerator::new(fixture.llm.clone()), config).is_err());
}
