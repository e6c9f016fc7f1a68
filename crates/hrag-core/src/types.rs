//! Common types used across the hybrid retrieval system

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::{Error, Result};

/// Answer returned whenever the context cannot support an answer, including
/// when generation itself is unavailable.
pub const INSUFFICIENT_INFORMATION: &str = "I don't have enough information to answer that.";

/// Stable identifier of an indexed chunk.
///
/// Integer and UUID identifiers are both valid point ids in the index. The
/// serialized form is the bare number or string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkId {
    Num(u64),
    Uuid(String),
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkId::Num(n) => write!(f, "{}", n),
            ChunkId::Uuid(s) => f.write_str(s),
        }
    }
}

impl From<u64> for ChunkId {
    fn from(n: u64) -> Self {
        ChunkId::Num(n)
    }
}

impl From<&str> for ChunkId {
    fn from(s: &str) -> Self {
        ChunkId::Uuid(s.to_string())
    }
}

impl From<String> for ChunkId {
    fn from(s: String) -> Self {
        ChunkId::Uuid(s)
    }
}

/// Dense embedding of a query or chunk.
pub type DenseVector = Vec<f32>;

/// Payload stored with a chunk: the original text plus any other fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub text: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl ChunkPayload {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: serde_json::Value::Null,
        }
    }

    /// A payload is usable only if it carries some non-whitespace text.
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Sparse term-weight vector.
///
/// Indices are unique and weights are finite and non-negative. Entries are
/// kept sorted by index so two vectors with the same terms compare equal no
/// matter the order they were produced in.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SparseVector {
    indices: Vec<u32>,
    values: Vec<f32>,
}

impl SparseVector {
    /// Create a sparse vector, validating the invariants.
    pub fn new(indices: Vec<u32>, values: Vec<f32>) -> Result<Self> {
        if indices.len() != values.len() {
            return Err(Error::SparseEncoder(format!(
                "indices length ({}) != values length ({})",
                indices.len(),
                values.len()
            )));
        }

        if let Some(bad) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(Error::SparseEncoder(format!(
                "weights must be finite and non-negative, got {}",
                bad
            )));
        }

        let mut entries: Vec<(u32, f32)> = indices.into_iter().zip(values).collect();
        entries.sort_by_key(|(index, _)| *index);

        if let Some(pair) = entries.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(Error::SparseEncoder(format!(
                "duplicate index {}",
                pair[0].0
            )));
        }

        let (indices, values) = entries.into_iter().unzip();
        Ok(Self { indices, values })
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Number of non-zero entries.
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn into_parts(self) -> (Vec<u32>, Vec<f32>) {
        (self.indices, self.values)
    }
}

/// What the sparse channel sends to the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SparseQuery {
    /// Term weights computed locally.
    Vector(SparseVector),
    /// Raw text scored by the index itself with the named lexical model.
    Text { text: String, model: String },
}

/// One hit reported by a retrieval channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub id: ChunkId,
    pub score: f32,
    pub payload: Option<ChunkPayload>,
}

/// Caller-facing attribution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: ChunkId,
    pub text: String,
}

/// Inbound request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into() }
    }
}

/// Outbound response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<SourceRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl QueryResponse {
    /// The fixed response used when retrieval produced no usable context.
    pub fn insufficient_information() -> Self {
        Self {
            answer: INSUFFICIENT_INFORMATION.to_string(),
            sources: Vec::new(),
            query: None,
        }
    }
}

/// A non-fatal condition encountered while serving a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// The sparse channel failed; results come from the dense channel only.
    SparseUnavailable { reason: String },
    /// No hit carried usable text; generation was skipped.
    NoContext,
    /// The model failed or returned nothing; the refusal phrase was used.
    GenerationFailed { reason: String },
}

/// A response plus everything that went wrong without failing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub response: QueryResponse,
    pub degradations: Vec<Degradation>,
}

impl QueryOutcome {
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }
}

/// Where the dense and sparse rankings are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMode {
    /// Two searches, fused locally with reciprocal-rank fusion.
    #[default]
    Client,
    /// One prefetch query fused by the index.
    Server,
}

/// Retrieval tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidates requested from the dense channel.
    pub dense_limit: usize,
    /// Candidates requested from the sparse channel.
    pub sparse_limit: usize,
    /// Chunks kept for the context.
    pub top_k: usize,
    /// RRF smoothing constant.
    pub rrf_k: u32,
    pub fusion_mode: FusionMode,
    /// Upper bound for each index call.
    pub search_timeout: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            dense_limit: 20,
            sparse_limit: 50,
            top_k: 6,
            rrf_k: 60,
            fusion_mode: FusionMode::Client,
            search_timeout: Duration::from_secs(10),
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(Error::Configuration("top_k must be at least 1".to_string()));
        }
        if self.dense_limit == 0 {
            return Err(Error::Configuration("dense_limit must be at least 1".to_string()));
        }
        if self.search_timeout.is_zero() {
            return Err(Error::Configuration("search_timeout cannot be zero".to_string()));
        }
        Ok(())
    }
}

/// Exponential backoff for calls to rate-limited providers.
///
/// The wait after failed attempt `n` (1-based) is
/// `multiplier * 2^(n-1)`, clamped to `[min_delay, max_delay]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub multiplier: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            multiplier: Duration::from_secs(1),
            min_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// A policy that tries once and never sleeps.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            multiplier: Duration::ZERO,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay to wait after the given failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let raw = 2u32
            .checked_pow(exponent)
            .and_then(|factor| self.multiplier.checked_mul(factor))
            .unwrap_or(self.max_delay);
        raw.max(self.min_delay).min(self.max_delay)
    }

    /// Full wait schedule between attempts.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts).map(|attempt| self.delay_after(attempt)).collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Configuration("max_attempts must be at least 1".to_string()));
        }
        if self.min_delay > self.max_delay {
            return Err(Error::Configuration(
                "min_delay cannot exceed max_delay".to_string(),
            ));
        }
        Ok(())
    }
}
