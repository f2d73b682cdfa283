//! Confidence probe: one vector search on the raw query

use crate::deadline::Deadline;
use crate::retrieval::{RetrievalBackend, SearchResult};
use contextforge_common::errors::Result;
use tracing::debug;

/// Top similarity of the raw query plus the hits that produced it
#[derive(Debug, Clone, Default)]
pub struct ProbeOutcome {
    pub sim_top: f64,
    pub hits: Vec<SearchResult>,
}

impl ProbeOutcome {
    fn from_hits(hits: Vec<SearchResult>) -> Self {
        let sim_top = hits
            .iter()
            .map(|h| h.sim)
            .filter(|s| s.is_finite())
            .fold(None, |best: Option<f64>, s| Some(best.map_or(s, |b| b.max(s))))
            .unwrap_or(0.0);
        Self { sim_top, hits }
    }
}

/// Probe the corpus with the raw query
pub async fn probe_confidence(
    backend: &dyn RetrievalBackend,
    query: &str,
    k_vec: usize,
    deadline: &Deadline,
) -> Result<ProbeOutcome> {
    let hits = deadline
        .run("vector probe", backend.vector_search(query, k_vec))
        .await?;
    let outcome = ProbeOutcome::from_hits(hits);

    debug!(sim_top = outcome.sim_top, hits = outcome.hits.len(), "Confidence probe");
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::test_support::result;
    use crate::retrieval::{FixtureBackend, FixtureChunk};
    use std::time::Duration;

    #[test]
    fn test_no_hits_means_zero_confidence() {
        assert_eq!(ProbeOutcome::from_hits(vec![]).sim_top, 0.0);
    }

    #[test]
    fn test_sim_top_is_best_similarity() {
        let outcome = ProbeOutcome::from_hits(vec![
            result(1, "a.md", "A", 0.4),
            result(2, "b.md", "B", 0.7),
            result(3, "c.md", "C", f64::NAN),
        ]);
        assert_eq!(outcome.sim_top, 0.7);
        assert_eq!(outcome.hits.len(), 3);
    }

    #[tokio::test]
    async fn test_probe_reads_pinned_similarity() {
        let backend = FixtureBackend::new(vec![
            FixtureChunk::new(1, "a.md", "A", "anything").with_sim(0.9),
            FixtureChunk::new(2, "b.md", "B", "else").with_sim(0.1),
        ]);
        let outcome = probe_confidence(&backend, "query", 5, &Deadline::none())
            .await
            .unwrap();
        assert_eq!(outcome.sim_top, 0.9);
    }

    #[tokio::test]
    async fn test_probe_timeout_is_an_error() {
        let backend = FixtureBackend::new(vec![FixtureChunk::new(1, "a.md", "A", "x")])
            .with_vector_delay(Duration::from_secs(5));
        let deadline = Deadline::after(Some(Duration::from_millis(20)));
        let err = probe_confidence(&backend, "query", 5, &deadline)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }
}
