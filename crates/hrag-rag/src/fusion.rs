//! Reciprocal Rank Fusion: score = Σ 1/(k + rank + 1), rank 0-based.
//!
//! Dense cosine scores and sparse lexical scores are not comparable, so
//! lists are merged by position only.

use std::collections::{HashMap, HashSet};

use hrag_core::ChunkId;

/// Conventional smoothing constant.
pub const DEFAULT_RRF_K: u32 = 60;

struct Accumulated {
    id: ChunkId,
    ranks: Vec<usize>,
}

impl Accumulated {
    /// Sum of contributions, added best rank first so the float result
    /// does not depend on which list came first.
    fn score(&mut self, k: u32) -> f64 {
        self.ranks.sort_unstable();
        self.ranks
            .iter()
            .map(|rank| 1.0 / (f64::from(k) + *rank as f64 + 1.0))
            .sum()
    }
}

/// Fuse ranked lists and return `(id, score)` pairs, best first.
///
/// Ordering is total and independent of hashing:
/// 1. higher fused score,
/// 2. then better (smaller) rank in any single list,
/// 3. then smaller identifier.
///
/// Per-identifier contributions are summed in rank order, so permuting
/// `rank_lists` never changes the output, for any number of lists. An
/// identifier repeated inside one list only counts at its first position.
pub fn fuse_scored(rank_lists: &[Vec<ChunkId>], k: u32) -> Vec<(ChunkId, f64)> {
    let mut entries: Vec<Accumulated> = Vec::new();
    let mut slots: HashMap<&ChunkId, usize> = HashMap::new();

    for list in rank_lists {
        let mut seen: HashSet<&ChunkId> = HashSet::with_capacity(list.len());
        for (rank, id) in list.iter().enumerate() {
            if !seen.insert(id) {
                continue;
            }
            match slots.get(id) {
                Some(&slot) => entries[slot].ranks.push(rank),
                None => {
                    slots.insert(id, entries.len());
                    entries.push(Accumulated {
                        id: id.clone(),
                        ranks: vec![rank],
                    });
                }
            }
        }
    }

    let mut scored: Vec<(ChunkId, f64, usize)> = entries
        .into_iter()
        .map(|mut entry| {
            let score = entry.score(k);
            (entry.id, score, entry.ranks[0])
        })
        .collect();

    scored.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| a.2.cmp(&b.2))
            .then_with(|| a.0.cmp(&b.0))
    });

    scored.into_iter().map(|(id, score, _)| (id, score)).collect()
}

/// Fuse ranked lists into a single ranking of unique identifiers.
pub fn fuse(rank_lists: &[Vec<ChunkId>], k: u32) -> Vec<ChunkId> {
    fuse_scored(rank_lists, k).into_iter().map(|(id, _)| id).collect()
}
