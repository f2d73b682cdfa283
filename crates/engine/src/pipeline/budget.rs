//! Greedy, order-preserving token budgeting

use crate::diagnostics::BudgetExceededNotice;
use crate::retrieval::SearchResult;
use contextforge_common::metrics;
use tracing::debug;

/// Token cost estimation strategy
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;
}

/// Characters divided by a fixed ratio (4 by default)
#[derive(Debug, Clone, Copy)]
pub struct CharRatioEstimator {
    chars_per_token: usize,
}

impl CharRatioEstimator {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(4)
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count() / self.chars_per_token
    }
}

/// Token cost of one candidate: the index estimate when present
pub fn cost_of(result: &SearchResult, estimator: &dyn TokenEstimator) -> usize {
    result
        .token_estimate
        .unwrap_or_else(|| estimator.estimate(&result.content))
}

/// Candidates that fit, with their costs
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub selected: Vec<(SearchResult, usize)>,
    pub used_tokens: usize,
    pub notice: Option<BudgetExceededNotice>,
}

/// Walk `ranked` in order and keep items while they fit in `budget`.
///
/// Stops at the first item that does not fit; never skips ahead to a
/// cheaper one.
pub fn select_within_budget(
    ranked: Vec<SearchResult>,
    budget: usize,
    estimator: &dyn TokenEstimator,
) -> Selection {
    let total = ranked.len();
    let mut remaining = budget;
    let mut selection = Selection::default();

    for (index, result) in ranked.into_iter().enumerate() {
        let cost = cost_of(&result, estimator);
        if cost > remaining {
            selection.notice = Some(BudgetExceededNotice {
                dropped_candidates: total - index,
                remaining_tokens: remaining,
                next_cost: cost,
            });
            metrics::record_budget_exhausted();
            break;
        }
        remaining -= cost;
        selection.used_tokens += cost;
        selection.selected.push((result, cost));
    }

    debug!(
        selected = selection.selected.len(),
        used_tokens = selection.used_tokens,
        budget,
        exhausted = selection.notice.is_some(),
        "Budget selection"
    );

    selection
}
