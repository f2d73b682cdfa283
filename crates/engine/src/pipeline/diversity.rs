//! Per-file diversity and near-duplicate pruning
//!
//! Two passes, applied in this order when both are enabled:
//! - File round-robin: one item per file per round, at most `per_file_cap`
//!   items per file
//! - Overlap pruning: drop items whose word-Jaccard similarity to any
//!   higher-ranked kept item exceeds the threshold

use crate::retrieval::SearchResult;
use contextforge_common::config::DedupeMode;
use contextforge_common::text;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

/// Words shorter than this many characters (plus one) are ignored
const MIN_WORD_LEN: usize = 2;

#[derive(Debug, Clone, Default)]
pub struct DiversityOutcome {
    pub kept: Vec<SearchResult>,
    /// Dropped by the per-file cap
    pub capped: usize,
    /// Dropped as near-duplicates
    pub pruned: usize,
}

/// Interleave files round-robin, taking at most `per_file_cap` per file.
///
/// Files are visited in order of their best-ranked item; within a file the
/// ranked order is kept.
pub fn round_robin_by_file(ranked: Vec<SearchResult>, per_file_cap: usize) -> Vec<SearchResult> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<VecDeque<SearchResult>> = Vec::new();

    for result in ranked {
        let slot = match index.get(&result.file) {
            Some(&slot) => slot,
            None => {
                index.insert(result.file.clone(), groups.len());
                groups.push(VecDeque::new());
                groups.len() - 1
            }
        };
        if groups[slot].len() < per_file_cap {
            groups[slot].push_back(result);
        }
    }

    let mut out = Vec::new();
    loop {
        let mut drew = false;
        for group in &mut groups {
            if let Some(result) = group.pop_front() {
                out.push(result);
                drew = true;
            }
        }
        if !drew {
            break;
        }
    }
    out
}

/// Jaccard similarity of the lowercased word sets (words longer than two
/// characters). Two texts with no such words have similarity 0.
pub fn word_jaccard(a: &str, b: &str) -> f64 {
    jaccard(&text::word_set(a, MIN_WORD_LEN), &text::word_set(b, MIN_WORD_LEN))
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Keep items whose similarity to every kept item is at most `threshold`
pub fn prune_near_duplicates(ranked: Vec<SearchResult>, threshold: f64) -> Vec<SearchResult> {
    let mut kept: Vec<SearchResult> = Vec::new();
    let mut kept_words: Vec<HashSet<String>> = Vec::new();

    for result in ranked {
        let words = text::word_set(&result.content, MIN_WORD_LEN);
        if kept_words.iter().all(|k| jaccard(k, &words) <= threshold) {
            kept_words.push(words);
            kept.push(result);
        }
    }
    kept
}

/// Apply the passes enabled by `mode`
pub fn diversify(
    ranked: Vec<SearchResult>,
    mode: DedupeMode,
    per_file_cap: usize,
    overlap_threshold: f64,
) -> DiversityOutcome {
    let before = ranked.len();

    let capped_list = if mode.caps_files() {
        round_robin_by_file(ranked, per_file_cap)
    } else {
        ranked
    };
    let capped = before - capped_list.len();

    let after_cap = capped_list.len();
    let kept = if mode.prunes_overlap() {
        prune_near_duplicates(capped_list, overlap_threshold)
    } else {
        capped_list
    };
    let pruned = after_cap - kept.len();

    debug!(mode = %mode, before, capped, pruned, kept = kept.len(), "Diversity filter");

    DiversityOutcome {
        kept,
        capped,
        pruned,
    }
}
