//! Dual-mode retrieval over the chunk corpus
//!
//! Provides:
//! - Vector search (semantic similarity via embeddings)
//! - Lexical search (BM25 / full-text rank)
//! - Anchor-term mining for query expansion
//! - Canonicalization and RRF fusion of the two result lists

mod bm25;
mod canonical;
mod dual;
mod fixture;
mod fusion;
mod store;

pub use bm25::Bm25Index;
pub use canonical::{canonicalize, CanonicalLists};
pub use dual::{DualResults, DualRetriever};
pub use fixture::{FixtureBackend, FixtureChunk};
pub use fusion::{rank, rank_order, sort_ranked, FusionMode, FusionOutcome, FusionResult, RrfFusion};
pub use store::StoreBackend;

use contextforge_common::errors::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Retrieved chunk with its ranking signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Chunk ID
    pub id: Uuid,

    /// Chunk content
    pub content: String,

    /// Source file the chunk was cut from
    pub file: String,

    /// Heading path or location inside the file
    pub path: String,

    /// Character offsets in the source file
    pub start: usize,
    pub end: usize,

    /// Chunk is a structurally significant anchor (e.g. a section heading)
    pub is_anchor: bool,

    /// Anchor label, when the chunk is an anchor
    pub anchor_key: Option<String>,

    /// Raw vector similarity (0.0 when only found lexically)
    pub sim: f64,

    /// Ranking score; its meaning depends on the stage that last set it
    pub score: f64,

    /// Which search produced this record
    pub search_type: SearchType,

    /// Precomputed token count from the index, when known
    pub token_estimate: Option<usize>,
}

/// Search that produced a result
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    /// Vector nearest-neighbor search
    Vector,
    /// Lexical relevance search
    Lexical,
}

impl SearchResult {
    /// Fill fields missing here from another record of the same chunk
    pub fn absorb(&mut self, other: SearchResult) {
        if self.content.is_empty() {
            self.content = other.content;
        }
        if self.file.is_empty() {
            self.file = other.file;
        }
        if self.path.is_empty() {
            self.path = other.path;
        }
        if self.anchor_key.is_none() {
            self.anchor_key = other.anchor_key;
        }
        if self.token_estimate.is_none() {
            self.token_estimate = other.token_estimate;
        }
        if self.start == 0 && self.end == 0 {
            self.start = other.start;
            self.end = other.end;
        }
        self.is_anchor |= other.is_anchor;
        self.sim = self.sim.max(other.sim);
    }

    /// Number of populated optional fields, used to pick the richer duplicate
    pub fn richness(&self) -> usize {
        [
            !self.content.is_empty(),
            !self.file.is_empty(),
            !self.path.is_empty(),
            self.anchor_key.is_some(),
            self.token_estimate.is_some(),
            self.end > self.start,
            self.search_type == SearchType::Vector,
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

/// Read-only access to an indexed chunk corpus
///
/// Implementations must be stateless per call and idempotent; the engine
/// may issue vector and lexical searches concurrently.
#[async_trait::async_trait]
pub trait RetrievalBackend: Send + Sync {
    /// Approximate nearest-neighbor search, ordered by similarity descending
    async fn vector_search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>>;

    /// Lexical relevance search, ordered by rank descending
    async fn lexical_search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>>;

    /// Candidate anchor terms, most relevant first
    async fn mine_anchor_terms(&self, query: &str, limit: usize) -> Result<Vec<String>>;

    /// Backend name for diagnostics
    fn name(&self) -> &str;
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_absorb_fills_gaps_and_keeps_best_sim() {
        let mut vector = result(1, "a.md", "A", 0.7);
        let mut lex = lexical(1, "a.md", "A", 0.4);
        lex.anchor_key = Some("Overview".to_string());
        lex.is_anchor = true;
        lex.token_estimate = Some(12);

        vector.absorb(lex);

        assert_eq!(vector.anchor_key.as_deref(), Some("Overview"));
        assert!(vector.is_anchor);
        assert_eq!(vector.token_estimate, Some(12));
        assert_eq!(vector.sim, 0.7);
        assert_eq!(vector.search_type, SearchType::Vector);
    }

    #[test]
    fn test_vector_record_is_richer_than_lexical_twin() {
        let vector = result(1, "a.md", "A", 0.7);
        let lex = lexical(1, "a.md", "A", 0.4);
        assert!(vector.richness() > lex.richness());
    }
}
