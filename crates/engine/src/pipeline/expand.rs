//! Low-confidence query expansion with mined anchor terms
//!
//! Expansion never fails the request. Mining errors, timeouts and empty
//! results all leave the query unchanged and record a warning.

use crate::deadline::Deadline;
use crate::diagnostics::DegradedFeatureWarning;
use crate::retrieval::RetrievalBackend;
use contextforge_common::config::{ExpandMode, RehydrateConfig};
use contextforge_common::errors::Stage;
use tracing::debug;

/// Candidates requested from the backend per accepted term
const MINING_OVERSAMPLE: usize = 3;

/// Query after the expansion stage
#[derive(Debug, Clone, PartialEq)]
pub struct Expansion {
    pub query: String,
    pub terms: Vec<String>,
    pub warning: Option<DegradedFeatureWarning>,
}

impl Expansion {
    /// The raw query, not expanded
    pub fn unchanged(query: &str) -> Self {
        Self {
            query: query.to_string(),
            terms: Vec::new(),
            warning: None,
        }
    }

    pub fn is_expanded(&self) -> bool {
        !self.terms.is_empty()
    }
}

/// The probe found nothing similar enough to trust
pub fn is_low_confidence(sim_top: f64, config: &RehydrateConfig) -> bool {
    sim_top < config.low_conf_sim
}

pub fn should_expand(sim_top: f64, config: &RehydrateConfig) -> bool {
    config.expand_query == ExpandMode::Auto && is_low_confidence(sim_top, config)
}

/// Keep up to `max_terms` mined terms not already present in the query.
///
/// Presence is a case-insensitive substring test, so "memory" is rejected
/// for a query containing "Memory-bank".
pub fn accept_terms(query: &str, candidates: &[String], max_terms: usize) -> Vec<String> {
    let haystack = query.to_lowercase();
    let mut accepted: Vec<String> = Vec::new();

    for candidate in candidates {
        if accepted.len() >= max_terms {
            break;
        }
        let term = candidate.trim().to_lowercase();
        if term.is_empty() || haystack.contains(&term) || accepted.contains(&term) {
            continue;
        }
        accepted.push(term);
    }

    accepted
}

/// Mine anchor terms and append the accepted ones to `query`
pub async fn expand_query(
    backend: &dyn RetrievalBackend,
    query: &str,
    max_terms: usize,
    deadline: &Deadline,
) -> Expansion {
    let limit = max_terms.saturating_mul(MINING_OVERSAMPLE);
    let mined = deadline
        .run("anchor term mining", backend.mine_anchor_terms(query, limit))
        .await;

    let candidates = match mined {
        Ok(candidates) => candidates,
        Err(e) => {
            return Expansion {
                warning: Some(DegradedFeatureWarning::from_error(
                    Stage::ExpandQuery,
                    "anchor term mining",
                    &e,
                )),
                ..Expansion::unchanged(query)
            };
        }
    };

    let terms = accept_terms(query, &candidates, max_terms);
    if terms.is_empty() {
        let message = if candidates.is_empty() {
            "anchor term mining returned no terms; using the original query".to_string()
        } else {
            format!(
                "all {} mined terms already present in the query; using the original query",
                candidates.len()
            )
        };
        return Expansion {
            warning: Some(DegradedFeatureWarning::record(Stage::ExpandQuery, message)),
            ..Expansion::unchanged(query)
        };
    }

    let expanded = format!("{} {}", query.trim_end(), terms.join(" "));
    debug!(terms = ?terms, query = %expanded, "Query expanded");

    Expansion {
        query: expanded,
        terms,
        warning: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{FixtureBackend, FixtureChunk};

    fn backend() -> FixtureBackend {
        FixtureBackend::new(vec![FixtureChunk::new(1, "a.md", "A", "agents remember")])
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_accept_terms_skips_present_and_duplicate_terms() {
        let accepted = accept_terms(
            "How do agents use Memory-banks?",
            &strings(&["memory", "Context", "context", "  ", "agents", "windows"]),
            6,
        );
        assert_eq!(accepted, vec!["context", "windows"]);
    }

    #[test]
    fn test_accept_terms_respects_limit() {
        let accepted = accept_terms("q", &strings(&["alpha", "beta", "gamma"]), 2);
        assert_eq!(accepted, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_confidence_gating() {
        let config = RehydrateConfig::default();
        assert!(should_expand(0.1, &config));
        assert!(!should_expand(0.9, &config));
        assert!(!should_expand(config.low_conf_sim, &config));

        let off = RehydrateConfig {
            expand_query: ExpandMode::Off,
            ..Default::default()
        };
        assert!(!should_expand(0.1, &off));
    }

    #[tokio::test]
    async fn test_expansion_appends_mined_terms() {
        let backend = backend().with_anchor_terms(&["memory", "context"]);
        let expansion = expand_query(&backend, "how do agents recall", 6, &Deadline::none()).await;

        assert!(expansion.is_expanded());
        assert_eq!(expansion.query, "how do agents recall memory context");
        assert!(expansion.warning.is_none());
    }

    #[tokio::test]
    async fn test_mining_failure_keeps_original_query() {
        let backend = backend().with_mining_failure();
        let expansion = expand_query(&backend, "agents recall", 6, &Deadline::none()).await;

        assert_eq!(expansion.query, "agents recall");
        assert!(!expansion.is_expanded());
        assert_eq!(expansion.warning.map(|w| w.stage), Some(Stage::ExpandQuery));
    }

    #[tokio::test]
    async fn test_empty_mining_result_warns() {
        let backend = backend().with_anchor_terms(&[]);
        let expansion = expand_query(&backend, "agents recall", 6, &Deadline::none()).await;
        assert!(!expansion.is_expanded());
        assert!(expansion.warning.unwrap().message.contains("no terms"));
    }
}
