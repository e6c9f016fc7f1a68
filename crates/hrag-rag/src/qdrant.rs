//! Qdrant-backed vector index

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    self, point_id::PointIdOptions, value::Kind, vector_input::Variant, vectors_config,
    Fusion, PrefetchQueryBuilder, Query, QueryPointsBuilder, ScoredPoint, VectorInput,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use hrag_core::{
    ChunkId, ChunkPayload, CollectionInfo, Error, FusedSearch, Result, ScoredChunk, SparseQuery,
    VectorIndex,
};

pub const DEFAULT_COLLECTION_NAME: &str = "hospital-rag-data";
pub const DEFAULT_DENSE_VECTOR_NAME: &str = "dense";
pub const DEFAULT_SPARSE_VECTOR_NAME: &str = "sparse";
pub const DEFAULT_TEXT_FIELD: &str = "text";

/// Connection and schema settings for the Qdrant collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    pub url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub collection_name: String,
    pub dense_vector_name: String,
    pub sparse_vector_name: String,
    /// Payload field holding the chunk text.
    pub text_field: String,
    pub timeout: Duration,
}

impl QdrantConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
            dense_vector_name: DEFAULT_DENSE_VECTOR_NAME.to_string(),
            sparse_vector_name: DEFAULT_SPARSE_VECTOR_NAME.to_string(),
            text_field: DEFAULT_TEXT_FIELD.to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let url = env::var("QDRANT_URL").map_err(|_| {
            Error::Configuration("QDRANT_URL environment variable not found".to_string())
        })?;

        let mut config = Self::new(url);
        config.api_key = env::var("QDRANT_API_KEY").ok().filter(|k| !k.trim().is_empty());
        if let Ok(name) = env::var("COLLECTION_NAME") {
            config.collection_name = name;
        }
        if let Ok(name) = env::var("DENSE_VECTOR_NAME") {
            config.dense_vector_name = name;
        }
        if let Ok(name) = env::var("SPARSE_VECTOR_NAME") {
            config.sparse_vector_name = name;
        }
        if let Ok(field) = env::var("PAYLOAD_TEXT_FIELD") {
            config.text_field = field;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.url)
            .map_err(|e| Error::Configuration(format!("invalid QDRANT_URL '{}': {}", self.url, e)))?;
        for (label, value) in [
            ("collection name", &self.collection_name),
            ("dense vector name", &self.dense_vector_name),
            ("sparse vector name", &self.sparse_vector_name),
            ("payload text field", &self.text_field),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Configuration(format!("{} cannot be empty", label)));
            }
        }
        Ok(())
    }
}

/// [`VectorIndex`] over a Qdrant collection with named dense and sparse vectors
pub struct QdrantIndex {
    client: Qdrant,
    config: QdrantConfig,
}

impl QdrantIndex {
    pub fn new(config: QdrantConfig) -> Result<Self> {
        config.validate()?;
        let client = Qdrant::from_url(&config.url)
            .api_key(config.api_key.clone())
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::VectorStore(format!("failed to build Qdrant client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &QdrantConfig {
        &self.config
    }

    fn sparse_input(query: &SparseQuery) -> VectorInput {
        let variant = match query {
            SparseQuery::Vector(vector) => Variant::Sparse(qdrant::SparseVector {
                indices: vector.indices().to_vec(),
                values: vector.values().to_vec(),
                ..Default::default()
            }),
            SparseQuery::Text { text, model } => Variant::Document(qdrant::Document {
                text: text.clone(),
                model: model.clone(),
                ..Default::default()
            }),
        };
        VectorInput {
            variant: Some(variant),
        }
    }

    fn dense_input(vector: &[f32]) -> VectorInput {
        VectorInput {
            variant: Some(Variant::Dense(qdrant::DenseVector {
                data: vector.to_vec(),
                ..Default::default()
            })),
        }
    }

    async fn run(&self, request: QueryPointsBuilder) -> Result<Vec<ScoredChunk>> {
        let response = self
            .client
            .query(request)
            .await
            .map_err(|e| Error::VectorStore(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|point| scored_chunk(point, &self.config.text_field))
            .collect())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn search_dense(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
        let request = QueryPointsBuilder::new(&self.config.collection_name)
            .query(Query::new_nearest(Self::dense_input(vector)))
            .using(&self.config.dense_vector_name)
            .limit(limit as u64)
            .with_payload(true);

        let hits = self.run(request).await?;
        debug!(hits = hits.len(), limit, "dense search");
        Ok(hits)
    }

    async fn search_sparse(&self, query: &SparseQuery, limit: usize) -> Result<Vec<ScoredChunk>> {
        let request = QueryPointsBuilder::new(&self.config.collection_name)
            .query(Query::new_nearest(Self::sparse_input(query)))
            .using(&self.config.sparse_vector_name)
            .limit(limit as u64)
            .with_payload(true);

        let hits = self.run(request).await?;
        debug!(hits = hits.len(), limit, "sparse search");
        Ok(hits)
    }

    async fn search_fused(&self, request: &FusedSearch<'_>) -> Result<Vec<ScoredChunk>> {
        let dense = PrefetchQueryBuilder::default()
            .query(Query::new_nearest(Self::dense_input(request.dense)))
            .using(&self.config.dense_vector_name)
            .limit(request.dense_limit as u64);
        let sparse = PrefetchQueryBuilder::default()
            .query(Query::new_nearest(Self::sparse_input(request.sparse)))
            .using(&self.config.sparse_vector_name)
            .limit(request.sparse_limit as u64);

        let query = QueryPointsBuilder::new(&self.config.collection_name)
            .add_prefetch(dense)
            .add_prefetch(sparse)
            .query(Query::new_fusion(Fusion::Rrf))
            .limit(request.limit as u64)
            .with_payload(true);

        let hits = self.run(query).await?;
        debug!(hits = hits.len(), limit = request.limit, "server-fused search");
        Ok(hits)
    }

    async fn health_check(&self) -> Result<()> {
        self.client
            .health_check()
            .await
            .map(|_| ())
            .map_err(|e| Error::VectorStore(format!("Qdrant is unreachable: {}", e)))
    }

    async fn collection_info(&self) -> Result<CollectionInfo> {
        let response = self
            .client
            .collection_info(self.config.collection_name.clone())
            .await
            .map_err(|e| Error::VectorStore(e.to_string()))?;

        let info = response.result.ok_or_else(|| {
            Error::VectorStore(format!(
                "collection '{}' returned no info",
                self.config.collection_name
            ))
        })?;

        let params = info.config.and_then(|c| c.params);
        let has_dense_vector = params
            .as_ref()
            .and_then(|p| p.vectors_config.as_ref())
            .and_then(|v| v.config.as_ref())
            .is_some_and(|config| match config {
                vectors_config::Config::ParamsMap(named) => {
                    named.map.contains_key(&self.config.dense_vector_name)
                }
                vectors_config::Config::Params(_) => false,
            });
        let has_sparse_vector = params
            .as_ref()
            .and_then(|p| p.sparse_vectors_config.as_ref())
            .is_some_and(|sparse| sparse.map.contains_key(&self.config.sparse_vector_name));

        Ok(CollectionInfo {
            name: self.config.collection_name.clone(),
            points_count: info.points_count,
            has_dense_vector,
            has_sparse_vector,
        })
    }
}

/// Convert a Qdrant point into a hit. Points without an id are skipped;
/// points without a string text field keep their id but carry no payload.
fn scored_chunk(point: ScoredPoint, text_field: &str) -> Option<ScoredChunk> {
    let id = point.id.and_then(|id| id.point_id_options).map(|options| match options {
        PointIdOptions::Num(n) => ChunkId::Num(n),
        PointIdOptions::Uuid(s) => ChunkId::Uuid(s),
    })?;

    let mut fields = point.payload;
    let text = match fields.remove(text_field).and_then(|v| v.kind) {
        Some(Kind::StringValue(s)) => Some(s),
        _ => None,
    };

    let payload = text.map(|text| ChunkPayload {
        text,
        metadata: if fields.is_empty() {
            serde_json::Value::Null
        } else {
            payload_to_json(fields)
        },
    });

    Some(ScoredChunk {
        id,
        score: point.score,
        payload,
    })
}

fn payload_to_json(fields: HashMap<String, qdrant::Value>) -> serde_json::Value {
    serde_json::Value::Object(
        fields
            .into_iter()
            .map(|(key, value)| (key, value_to_json(value)))
            .collect(),
    )
}

fn value_to_json(value: qdrant::Value) -> serde_json::Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::IntegerValue(i)) => serde_json::Value::from(i),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(value_to_json).collect())
        }
        Some(Kind::StructValue(st)) => payload_to_json(st.fields),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrant_client::qdrant::{PointId, Value};

    fn point(id: PointIdOptions, payload: Vec<(&str, Value)>) -> ScoredPoint {
        ScoredPoint {
            id: Some(PointId {
                point_id_options: Some(id),
            }),
            payload: payload
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            score: 0.75,
            ..Default::default()
        }
    }

    #[test]
    fn test_point_with_text_becomes_payload() {
        let chunk = scored_chunk(
            point(
                PointIdOptions::Num(12),
                vec![
                    ("text", Value::from("OPD runs Monday to Saturday.")),
                    ("page", Value::from(3_i64)),
                ],
            ),
            "text",
        )
        .unwrap();

        assert_eq!(chunk.id, ChunkId::Num(12));
        assert_eq!(chunk.score, 0.75);
        let payload = chunk.payload.unwrap();
        assert_eq!(payload.text, "OPD runs Monday to Saturday.");
        assert_eq!(payload.metadata, serde_json::json!({"page": 3}));
    }

    #[test]
    fn test_point_without_text_keeps_id_only() {
        let chunk = scored_chunk(
            point(
                PointIdOptions::Uuid("0b7c3c5e-1a5e-4a53-9c55-d1f0a3a3c0de".to_string()),
                vec![("title", Value::from("Cardiology"))],
            ),
            "text",
        )
        .unwrap();

        assert_eq!(
            chunk.id,
            ChunkId::from("0b7c3c5e-1a5e-4a53-9c55-d1f0a3a3c0de")
        );
        assert!(chunk.payload.is_none());
    }

    #[test]
    fn test_point_without_id_is_skipped() {
        let p = ScoredPoint {
            score: 0.1,
            ..Default::default()
        };
        assert!(scored_chunk(p, "text").is_none());
    }

    #[test]
    fn test_config_validation() {
        assert!(QdrantConfig::new("http://localhost:6334").validate().is_ok());
        assert!(QdrantConfig::new("localhost 6334").validate().is_err());

        let mut config = QdrantConfig::new("http://localhost:6334");
        config.sparse_vector_name = " ".to_string();
        assert!(config.validate().is_err());
    }
}
