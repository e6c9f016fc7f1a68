//! Error types for hybrid retrieval

use thiserror::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by providers and adapters (embedding, index, encoder, model)
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Sparse encoder error: {0}")]
    SparseEncoder(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    #[error("Upstream returned status {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// Whether a retry has a chance of succeeding.
    ///
    /// Rate limiting (429) and server-side failures (5xx) are transient, as
    /// are connection-level problems and timeouts. Everything else is a
    /// property of the request and will fail the same way again.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Network(_) | Error::Timeout(_) => true,
            Error::Upstream { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Query-level failures that reach the caller.
///
/// Sparse-channel and generation failures never show up here; they are
/// reported as [`crate::Degradation`] entries alongside a normal response.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("invalid query: {0}")]
    InvalidInput(String),

    #[error("retrieval failed: {0}")]
    Retrieval(#[source] Error),
}

impl QueryError {
    /// Stable machine-readable kind, used in structured error output.
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::InvalidInput(_) => "invalid_input",
            QueryError::Retrieval(_) => "retrieval_failed",
        }
    }
}
