//! Context assembly from a fused ranking

use hrag_core::{ChunkId, ContextBundle, SourceRecord};

use crate::gateway::PayloadLookup;

/// Separator between chunk texts in the prompt context.
pub const CHUNK_SEPARATOR: &str = "\n\n";

/// Default number of chunks kept for the prompt.
pub const DEFAULT_TOP_K: usize = 6;

/// Keep the first `top_k` identifiers of the fused ranking, then drop the
/// ones with no usable text. The bundle may end up smaller than `top_k`.
pub fn assemble(fused: &[ChunkId], payloads: &PayloadLookup, top_k: usize) -> ContextBundle {
    let sources: Vec<SourceRecord> = fused
        .iter()
        .take(top_k)
        .filter_map(|id| {
            payloads
                .get(id)
                .filter(|payload| payload.has_text())
                .map(|payload| SourceRecord {
                    id: id.clone(),
                    text: payload.text.clone(),
                })
        })
        .collect();

    let context = sources
        .iter()
        .map(|source| source.text.as_str())
        .collect::<Vec<_>>()
        .join(CHUNK_SEPARATOR);

    ContextBundle { context, sources }
}
