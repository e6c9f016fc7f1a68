//! Sparse encoders for the lexical channel

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

#[cfg(feature = "splade")]
use std::sync::Mutex;

#[cfg(feature = "splade")]
use fastembed::{SparseInitOptions, SparseModel, SparseTextEmbedding};
#[cfg(feature = "splade")]
use tracing::info;

use hrag_core::{Error, Result, SparseEncoder, SparseQuery, SparseVector};

/// Model id of the learned sparse encoder the collection is indexed with.
pub const SPLADE_MODEL: &str = "prithivida/Splade_PP_en_v1";

/// Size of the BERT WordPiece vocabulary SPLADE weights are defined over.
pub const SPLADE_VOCABULARY_SIZE: usize = 30_522;

/// Server-side BM25 model understood by Qdrant.
pub const DEFAULT_BM25_MODEL: &str = "qdrant/bm25";

/// Turn raw SPLADE output into a validated sparse vector.
///
/// Zero weights are dropped. Every index must fall inside the WordPiece
/// vocabulary, otherwise the query could not address the indexed vectors.
#[cfg_attr(not(feature = "splade"), allow(dead_code))]
fn splade_vector(indices: Vec<usize>, values: Vec<f32>) -> Result<SparseVector> {
    if indices.len() != values.len() {
        return Err(Error::SparseEncoder(format!(
            "model returned {} indices for {} weights",
            indices.len(),
            values.len()
        )));
    }

    let mut kept_indices = Vec::with_capacity(indices.len());
    let mut kept_values = Vec::with_capacity(values.len());
    for (index, value) in indices.into_iter().zip(values) {
        if value == 0.0 {
            continue;
        }
        if index >= SPLADE_VOCABULARY_SIZE {
            return Err(Error::SparseEncoder(format!(
                "index {} is outside the {}-term vocabulary",
                index, SPLADE_VOCABULARY_SIZE
            )));
        }
        kept_indices.push(index as u32);
        kept_values.push(value);
    }

    if kept_indices.is_empty() {
        return Err(Error::SparseEncoder("no active terms".to_string()));
    }
    SparseVector::new(kept_indices, kept_values)
}

/// Local learned sparse model (SPLADE++ through fastembed).
///
/// The ONNX model is loaded once at startup and shared behind an `Arc`.
/// Inference needs exclusive access to the session, hence the mutex.
#[cfg(feature = "splade")]
pub struct SpladeSparseEncoder {
    model: Mutex<SparseTextEmbedding>,
}

#[cfg(feature = "splade")]
impl SpladeSparseEncoder {
    /// Load the model, downloading it into `cache_dir` on first use.
    pub fn load(cache_dir: Option<PathBuf>) -> Result<Self> {
        let mut options =
            SparseInitOptions::new(SparseModel::SPLADEPPV1).with_show_download_progress(false);
        if let Some(dir) = cache_dir {
            options = options.with_cache_dir(dir);
        }

        let model = SparseTextEmbedding::try_new(options).map_err(|e| {
            Error::Configuration(format!("failed to load {}: {}", SPLADE_MODEL, e))
        })?;
        info!(model = SPLADE_MODEL, "sparse model loaded");

        Ok(Self {
            model: Mutex::new(model),
        })
    }

    /// Encode text into a validated sparse vector.
    pub fn encode_vector(&self, text: &str) -> Result<SparseVector> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::SparseEncoder("cannot encode empty text".to_string()));
        }

        let mut model = self
            .model
            .lock()
            .map_err(|_| Error::SparseEncoder("sparse model lock poisoned".to_string()))?;
        let mut output = model
            .embed(vec![text], None)
            .map_err(|e| Error::SparseEncoder(e.to_string()))?;
        let embedding = output
            .pop()
            .ok_or_else(|| Error::SparseEncoder("model returned no embedding".to_string()))?;

        splade_vector(embedding.indices, embedding.values)
    }
}

#[cfg(feature = "splade")]
impl SparseEncoder for SpladeSparseEncoder {
    fn encode(&self, text: &str) -> Result<SparseQuery> {
        self.encode_vector(text).map(SparseQuery::Vector)
    }

    fn name(&self) -> &str {
        "splade"
    }
}

/// Delegates lexical scoring to the index: the raw query text is sent
/// tagged with a server-side model name.
#[derive(Debug, Clone)]
pub struct ServerBm25Encoder {
    model: String,
}

impl Default for ServerBm25Encoder {
    fn default() -> Self {
        Self::new(DEFAULT_BM25_MODEL)
    }
}

impl ServerBm25Encoder {
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into() }
    }
}

impl SparseEncoder for ServerBm25Encoder {
    fn encode(&self, text: &str) -> Result<SparseQuery> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::SparseEncoder("cannot score empty text".to_string()));
        }
        Ok(SparseQuery::Text {
            text: text.to_string(),
            model: self.model.clone(),
        })
    }

    fn name(&self) -> &str {
        "bm25"
    }
}

/// Which sparse encoder a deployment uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SparseStrategy {
    #[default]
    Splade,
    Bm25,
}

impl SparseStrategy {
    /// Build the encoder once for the process lifetime.
    ///
    /// `model_cache` is only used by the local model.
    pub fn build(self, model_cache: Option<PathBuf>) -> Result<Arc<dyn SparseEncoder>> {
        match self {
            #[cfg(feature = "splade")]
            SparseStrategy::Splade => Ok(Arc::new(SpladeSparseEncoder::load(model_cache)?)),
            #[cfg(not(feature = "splade"))]
            SparseStrategy::Splade => {
                let _ = model_cache;
                Err(Error::Configuration(
                    "built without the `splade` feature, use --sparse bm25".to_string(),
                ))
            }
            SparseStrategy::Bm25 => Ok(Arc::new(ServerBm25Encoder::default())),
        }
    }
}

impl FromStr for SparseStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "splade" | "local" => Ok(SparseStrategy::Splade),
            "bm25" | "server" => Ok(SparseStrategy::Bm25),
            other => Err(Error::Configuration(format!(
                "unknown sparse strategy '{}', expected 'splade' or 'bm25'",
                other
            ))),
        }
    }
}

impl fmt::Display for SparseStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SparseStrategy::Splade => f.write_str("splade"),
            SparseStrategy::Bm25 => f.write_str("bm25"),
        }
    }
}
