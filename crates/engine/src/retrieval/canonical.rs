//! Normalizes raw backend lists into one schema before fusion

use super::{SearchResult, SearchType};
use std::collections::HashSet;

/// Vector and lexical lists in canonical form, each in backend rank order
#[derive(Debug, Clone, Default)]
pub struct CanonicalLists {
    pub vector: Vec<SearchResult>,
    pub lexical: Vec<SearchResult>,
}

/// Annotate search types, set `score = sim` on vector results and drop
/// repeated ids inside a list (first occurrence keeps its rank).
/// Non-finite signals are zeroed so sorting stays total.
pub fn canonicalize(vector: Vec<SearchResult>, lexical: Vec<SearchResult>) -> CanonicalLists {
    let vector = normalize(vector, SearchType::Vector, |r| {
        r.score = r.sim;
    });
    let lexical = normalize(lexical, SearchType::Lexical, |_| {});

    CanonicalLists { vector, lexical }
}

fn normalize(
    results: Vec<SearchResult>,
    search_type: SearchType,
    set_score: impl Fn(&mut SearchResult),
) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert(r.id))
        .map(|mut r| {
            r.search_type = search_type;
            if !r.sim.is_finite() {
                r.sim = 0.0;
            }
            if !r.score.is_finite() {
                r.score = 0.0;
            }
            set_score(&mut r);
            r
        })
        .collect()
}
