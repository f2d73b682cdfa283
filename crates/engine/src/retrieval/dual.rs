//! Dual retrieval issuing vector and lexical searches concurrently
//!
//! The vector leg is critical: its failure or timeout fails the request.
//! The lexical leg degrades to an empty list with a warning.

use super::{RetrievalBackend, SearchResult};
use crate::deadline::Deadline;
use crate::diagnostics::DegradedFeatureWarning;
use contextforge_common::errors::{Result, Stage};
use std::sync::Arc;
use tracing::debug;

/// Raw lists from both searches
#[derive(Debug, Clone, Default)]
pub struct DualResults {
    pub vector: Vec<SearchResult>,
    pub lexical: Vec<SearchResult>,
    pub warning: Option<DegradedFeatureWarning>,
}

/// Retriever running both searches against one backend
pub struct DualRetriever {
    backend: Arc<dyn RetrievalBackend>,
}

impl DualRetriever {
    pub fn new(backend: Arc<dyn RetrievalBackend>) -> Self {
        Self { backend }
    }

    /// Run both searches for `query`.
    ///
    /// `vector_hits` short-circuits the vector leg with results already
    /// fetched for the same query text. A `k_lex` of zero skips the lexical
    /// leg without a warning.
    pub async fn retrieve(
        &self,
        query: &str,
        k_vec: usize,
        k_lex: usize,
        deadline: &Deadline,
        vector_hits: Option<Vec<SearchResult>>,
    ) -> Result<DualResults> {
        let vector = async {
            match vector_hits {
                Some(hits) => Ok(hits),
                None => {
                    deadline
                        .run("vector search", self.backend.vector_search(query, k_vec))
                        .await
                }
            }
        };

        let lexical = async {
            if k_lex == 0 {
                return Ok(Vec::new());
            }
            deadline
                .run("lexical search", self.backend.lexical_search(query, k_lex))
                .await
        };

        // Execute both searches in parallel
        let (vector, lexical) = tokio::join!(vector, lexical);

        let vector = vector?;
        let (lexical, warning) = match lexical {
            Ok(hits) => (hits, None),
            Err(e) => (
                Vec::new(),
                Some(DegradedFeatureWarning::from_error(
                    Stage::Retrieve,
                    "lexical search",
                    &e,
                )),
            ),
        };

        debug!(
            vector_hits = vector.len(),
            lexical_hits = lexical.len(),
            degraded = warning.is_some(),
            "Dual retrieval complete"
        );

        Ok(DualResults {
            vector,
            lexical,
            warning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{FixtureBackend, FixtureChunk};
    use std::time::Duration;
    use tokio_test::assert_err;

    fn backend() -> FixtureBackend {
        FixtureBackend::new(vec![
            FixtureChunk::new(1, "a.md", "A", "token budget for context bundles"),
            FixtureChunk::new(2, "b.md", "B", "rank fusion of retrieval lists"),
        ])
    }

    #[tokio::test]
    async fn test_both_legs_return_results() {
        let retriever = DualRetriever::new(Arc::new(backend()));
        let results = retriever
            .retrieve("rank fusion", 10, 10, &Deadline::none(), None)
            .await
            .unwrap();

        assert_eq!(results.vector.len(), 2);
        assert_eq!(results.lexical.len(), 1);
        assert!(results.warning.is_none());
    }

    #[tokio::test]
    async fn test_lexical_failure_degrades() {
        let retriever = DualRetriever::new(Arc::new(backend().with_lexical_failure()));
        let results = retriever
            .retrieve("rank fusion", 10, 10, &Deadline::none(), None)
            .await
            .unwrap();

        assert!(results.lexical.is_empty());
        assert_eq!(results.vector.len(), 2);
        assert_eq!(results.warning.map(|w| w.stage), Some(Stage::Retrieve));
    }

    #[tokio::test]
    async fn test_lexical_timeout_degrades() {
        let retriever = DualRetriever::new(Arc::new(
            backend().with_lexical_delay(Duration::from_secs(5)),
        ));
        let deadline = Deadline::after(Some(Duration::from_millis(30)));
        let results = retriever
            .retrieve("rank fusion", 10, 10, &deadline, None)
            .await
            .unwrap();

        assert!(results.lexical.is_empty());
        assert!(results.warning.unwrap().message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_vector_failure_is_fatal() {
        let retriever = DualRetriever::new(Arc::new(backend().with_vector_failure()));
        assert_err!(
            retriever
                .retrieve("rank fusion", 10, 10, &Deadline::none(), None)
                .await
        );
    }

    #[tokio::test]
    async fn test_reused_vector_hits_skip_vector_search() {
        let retriever = DualRetriever::new(Arc::new(backend().with_vector_failure()));
        let reused = vec![];
        let results = retriever
            .retrieve("rank fusion", 10, 0, &Deadline::none(), Some(reused))
            .await
            .unwrap();
        assert!(results.vector.is_empty());
        assert!(results.lexical.is_empty());
        assert!(results.warning.is_none());
    }
}
