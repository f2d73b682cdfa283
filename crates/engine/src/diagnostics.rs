//! Non-fatal diagnostics carried in bundle metadata

use contextforge_common::errors::{AppError, Stage};
use contextforge_common::metrics;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A non-critical feature failed or was unavailable; the pipeline continued
/// with the best partial data it had
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradedFeatureWarning {
    pub stage: Stage,
    pub message: String,
}

impl DegradedFeatureWarning {
    /// Log, count and return a warning for `stage`
    pub fn record(stage: Stage, message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(stage = %stage, message = %message, "Degraded feature");
        metrics::record_degradation(stage.as_str());
        Self { stage, message }
    }

    /// Warning for a collaborator error swallowed at a stage boundary
    pub fn from_error(stage: Stage, feature: &str, err: &AppError) -> Self {
        Self::record(stage, format!("{} unavailable: {}", feature, err))
    }
}

/// Budgeting stopped before the ranked list was exhausted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetExceededNotice {
    /// Ranked candidates left out because the budget ran out
    pub dropped_candidates: usize,

    /// Evidence tokens still unused when selection stopped
    pub remaining_tokens: usize,

    /// Cost of the first candidate that did not fit
    pub next_cost: usize,
}
