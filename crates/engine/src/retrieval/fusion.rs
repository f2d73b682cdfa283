//! Reciprocal Rank Fusion (RRF) for combining search results
//!
//! Each list contributes `k0 / (rank + k0)` for an item at 1-indexed `rank`.
//! Contributions are summed per chunk id, so an item found by both searches
//! always outranks the same rank in a single list. When fusion is off or the
//! lexical list is empty, ranking falls back to raw vector similarity.
//!
//! Both paths share one total order: score descending, then file, path,
//! start offset and id ascending.

use super::{CanonicalLists, SearchResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// RRF fusion parameters
#[derive(Debug, Clone)]
pub struct RrfFusion {
    /// Smoothing constant k0 (typically 60)
    pub k0: f64,
}

impl Default for RrfFusion {
    fn default() -> Self {
        Self { k0: 60.0 }
    }
}

/// Result of fusion
#[derive(Debug, Clone)]
pub struct FusionResult {
    pub result: SearchResult,
    pub vector_rank: Option<usize>,
    pub lexical_rank: Option<usize>,
    pub rrf_score: f64,
}

/// Which ranking produced the final order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FusionMode {
    /// Reciprocal rank fusion of vector and lexical lists
    Rrf,
    /// Pure vector similarity
    Vector,
}

/// Ranked candidates plus the mode that ranked them
#[derive(Debug, Clone)]
pub struct FusionOutcome {
    pub ranked: Vec<SearchResult>,
    pub mode: FusionMode,
}

/// Deterministic ranking order shared by every ranking stage
pub fn rank_order(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.file.cmp(&b.file))
        .then_with(|| a.path.cmp(&b.path))
        .then_with(|| a.start.cmp(&b.start))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sort results into ranking order
pub fn sort_ranked(results: &mut [SearchResult]) {
    results.sort_by(rank_order);
}

impl RrfFusion {
    pub fn new(k0: f64) -> Self {
        Self { k0 }
    }

    /// Contribution of a single 1-indexed rank
    pub fn contribution(&self, rank: usize) -> f64 {
        self.k0 / (rank as f64 + self.k0)
    }

    /// Fuse vector and lexical results using RRF
    pub fn fuse(
        &self,
        vector_results: Vec<SearchResult>,
        lexical_results: Vec<SearchResult>,
    ) -> Vec<FusionResult> {
        // chunk id -> (record, vector_rank, lexical_rank)
        let mut chunk_map: HashMap<Uuid, (SearchResult, Option<usize>, Option<usize>)> =
            HashMap::new();

        for (rank, result) in vector_results.into_iter().enumerate() {
            chunk_map.insert(result.id, (result, Some(rank + 1), None));
        }

        for (rank, result) in lexical_results.into_iter().enumerate() {
            match chunk_map.get_mut(&result.id) {
                Some((existing, _, lexical_rank)) => {
                    *lexical_rank = Some(rank + 1);
                    if result.richness() > existing.richness() {
                        let poorer = std::mem::replace(existing, result);
                        existing.absorb(poorer);
                    } else {
                        existing.absorb(result);
                    }
                }
                None => {
                    chunk_map.insert(result.id, (result, None, Some(rank + 1)));
                }
            }
        }

        let mut results: Vec<FusionResult> = chunk_map
            .into_values()
            .map(|(mut result, vector_rank, lexical_rank)| {
                let rrf_score = vector_rank.map(|r| self.contribution(r)).unwrap_or(0.0)
                    + lexical_rank.map(|r| self.contribution(r)).unwrap_or(0.0);

                result.score = rrf_score;

                FusionResult {
                    result,
                    vector_rank,
                    lexical_rank,
                    rrf_score,
                }
            })
            .collect();

        results.sort_by(|a, b| rank_order(&a.result, &b.result));

        results
    }
}

/// Rank canonical lists, falling back to pure vector order when fusion is
/// disabled or there is nothing lexical to fuse
pub fn rank(lists: CanonicalLists, use_fusion: bool, k0: f64) -> FusionOutcome {
    if use_fusion && !lists.lexical.is_empty() {
        let fused = RrfFusion::new(k0).fuse(lists.vector, lists.lexical);
        let both = fused
            .iter()
            .filter(|f| f.vector_rank.is_some() && f.lexical_rank.is_some())
            .count();
        debug!(candidates = fused.len(), in_both = both, "RRF fusion complete");

        return FusionOutcome {
            ranked: fused.into_iter().map(|f| f.result).collect(),
            mode: FusionMode::Rrf,
        };
    }

    let mut ranked = lists.vector;
    for result in &mut ranked {
        result.score = result.sim;
    }
    sort_ranked(&mut ranked);
    debug!(candidates = ranked.len(), "Pure vector ranking");

    FusionOutcome {
        ranked,
        mode: FusionMode::Vector,
    }
}
