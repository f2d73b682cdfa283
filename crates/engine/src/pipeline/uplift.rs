//! Confidence-gated score uplift for anchor chunks
//!
//! Under low confidence, anchors that overlap the query's scope get a small
//! boost of `0.02 + 0.05 * stability` and the list is re-sorted with the
//! shared ranking order.

use crate::diagnostics::DegradedFeatureWarning;
use crate::retrieval::{sort_ranked, SearchResult};
use contextforge_common::errors::{Result, Stage};
use contextforge_common::text;
use tracing::debug;

/// Decides whether a result falls inside the query's scope
pub trait ScopeMatcher: Send + Sync {
    fn overlaps(&self, query: &str, result: &SearchResult) -> Result<bool>;
}

/// Any query word longer than three characters appears in the content,
/// ignoring case
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringScopeMatcher;

impl ScopeMatcher for SubstringScopeMatcher {
    fn overlaps(&self, query: &str, result: &SearchResult) -> Result<bool> {
        let content = result.content.to_lowercase();
        Ok(text::word_set(query, 3)
            .iter()
            .any(|word| content.contains(word.as_str())))
    }
}

/// Boost applied to in-scope anchors
pub fn uplift_epsilon(stability: f64) -> f64 {
    0.02 + 0.05 * stability.clamp(0.0, 1.0)
}

#[derive(Debug, Clone)]
pub struct UpliftOutcome {
    pub ranked: Vec<SearchResult>,
    pub boosted: usize,
    pub warning: Option<DegradedFeatureWarning>,
}

/// Boost in-scope anchors and re-sort.
///
/// A matcher error leaves that item unboosted; the errors are reported as
/// one warning.
pub fn apply_anchor_uplift(
    mut ranked: Vec<SearchResult>,
    query: &str,
    stability: f64,
    matcher: &dyn ScopeMatcher,
) -> UpliftOutcome {
    let epsilon = uplift_epsilon(stability);
    let mut boosted = 0;
    let mut failures = 0;
    let mut first_error = None;

    for result in ranked.iter_mut().filter(|r| r.is_anchor) {
        match matcher.overlaps(query, result) {
            Ok(true) => {
                result.score += epsilon;
                boosted += 1;
            }
            Ok(false) => {}
            Err(e) => {
                failures += 1;
                first_error.get_or_insert(e);
            }
        }
    }

    sort_ranked(&mut ranked);

    let warning = first_error.map(|e| {
        DegradedFeatureWarning::record(
            Stage::AnchorUplift,
            format!(
                "anchor overlap scoring failed for {} anchors; left unboosted: {}",
                failures, e
            ),
        )
    });

    debug!(epsilon, boosted, failures, "Anchor uplift");

    UpliftOutcome {
        ranked,
        boosted,
        warning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::test_support::result;
    use contextforge_common::errors::AppError;
    use uuid::Uuid;

    fn anchor(id: u128, file: &str, content: &str, score: f64) -> SearchResult {
        SearchResult {
            content: content.to_string(),
            is_anchor: true,
            anchor_key: Some(format!("Anchor {}", id)),
            score,
            ..result(id, file, "A", score)
        }
    }

    struct FailingMatcher;

    impl ScopeMatcher for FailingMatcher {
        fn overlaps(&self, _query: &str, _result: &SearchResult) -> Result<bool> {
            Err(AppError::Internal {
                message: "scorer offline".to_string(),
            })
        }
    }

    #[test]
    fn test_epsilon_follows_stability() {
        assert!((uplift_epsilon(0.0) - 0.02).abs() < 1e-12);
        assert!((uplift_epsilon(1.0) - 0.07).abs() < 1e-12);
        assert!((uplift_epsilon(0.5) - 0.045).abs() < 1e-12);
        // Clamped
        assert!((uplift_epsilon(7.0) - 0.07).abs() < 1e-12);
        assert!((uplift_epsilon(-1.0) - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_substring_matcher_ignores_short_words_and_case() {
        let matcher = SubstringScopeMatcher;
        let hit = anchor(1, "a.md", "Notes on MEMORY consolidation", 0.1);
        assert!(matcher.overlaps("agent memory", &hit).unwrap());
        // "on" and "the" are too short to count
        assert!(!matcher.overlaps("on the", &hit).unwrap());
    }

    #[test]
    fn test_substring_matcher_handles_non_ascii_queries() {
        let matcher = SubstringScopeMatcher;
        let hit = anchor(1, "ru.md", "Как агент хранит ПАМЯТЬ", 0.1);
        assert!(matcher.overlaps("память агента", &hit).unwrap());

        let cafe = anchor(2, "fr.md", "Le résumé du café", 0.1);
        assert!(matcher.overlaps("Résumé", &cafe).unwrap());
        assert!(!matcher.overlaps("resume", &cafe).unwrap());
    }

    #[test]
    fn test_in_scope_anchor_overtakes_close_neighbour() {
        let ranked = vec![
            result(1, "a.md", "A", 0.50),
            anchor(2, "b.md", "memory layout overview", 0.48),
            anchor(3, "c.md", "unrelated topic", 0.47),
        ];

        let outcome = apply_anchor_uplift(ranked, "memory", 1.0, &SubstringScopeMatcher);

        assert_eq!(outcome.boosted, 1);
        assert_eq!(outcome.ranked[0].id, Uuid::from_u128(2));
        assert!((outcome.ranked[0].score - 0.55).abs() < 1e-12);
        assert_eq!(outcome.ranked[2].id, Uuid::from_u128(3));
        assert!(outcome.warning.is_none());
    }

    #[test]
    fn test_non_anchors_are_never_boosted() {
        let mut plain = result(1, "a.md", "A", 0.2);
        plain.content = "memory".to_string();
        let outcome = apply_anchor_uplift(vec![plain], "memory", 1.0, &SubstringScopeMatcher);
        assert_eq!(outcome.boosted, 0);
        assert_eq!(outcome.ranked[0].score, 0.2);
    }

    #[test]
    fn test_matcher_failure_degrades() {
        let ranked = vec![anchor(1, "a.md", "memory", 0.3)];
        let outcome = apply_anchor_uplift(ranked, "memory", 0.5, &FailingMatcher);

        assert_eq!(outcome.boosted, 0);
        assert_eq!(outcome.ranked[0].score, 0.3);
        let warning = outcome.warning.unwrap();
        assert_eq!(warning.stage, Stage::AnchorUplift);
        assert!(warning.message.contains("scorer offline"));
    }
}
