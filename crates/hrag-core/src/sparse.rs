//! Sparse encoder trait

use crate::{Result, SparseQuery};

/// Turns query text into something the sparse index can score.
///
/// Encoders are loaded once and shared across concurrent queries, so
/// `encode` takes `&self` and must be deterministic for a given input and
/// configuration.
pub trait SparseEncoder: Send + Sync {
    fn encode(&self, text: &str) -> Result<SparseQuery>;

    /// Short name used in logs and stats.
    fn name(&self) -> &str;
}
