//! In-memory retrieval backend over a fixed corpus
//!
//! Used by tests and by offline runs against a JSON corpus. Vector search
//! uses cosine similarity of hashed bag-of-words embeddings unless a chunk
//! pins its similarity; lexical search is BM25. Faults and latency can be
//! injected per leg to exercise the degraded paths.

use super::{Bm25Index, RetrievalBackend, SearchResult, SearchType};
use contextforge_common::embeddings::{cosine_similarity, HashEmbedder};
use contextforge_common::errors::{AppError, Result};
use contextforge_common::text;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

const FIXTURE_EMBEDDING_DIMENSION: usize = 512;

/// One chunk of the fixture corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureChunk {
    pub id: Uuid,
    pub content: String,
    pub file: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub start: usize,
    #[serde(default)]
    pub end: usize,
    #[serde(default)]
    pub is_anchor: bool,
    #[serde(default)]
    pub anchor_key: Option<String>,
    #[serde(default)]
    pub token_count: Option<usize>,
    /// Similarity reported for every query instead of the computed one
    #[serde(default)]
    pub sim: Option<f64>,
}

impl FixtureChunk {
    pub fn new(id: u128, file: &str, path: &str, content: &str) -> Self {
        Self {
            id: Uuid::from_u128(id),
            content: content.to_string(),
            file: file.to_string(),
            path: path.to_string(),
            start: 0,
            end: content.chars().count(),
            is_anchor: false,
            anchor_key: None,
            token_count: None,
            sim: None,
        }
    }

    /// Mark as an anchor chunk
    pub fn anchor(mut self, key: &str) -> Self {
        self.is_anchor = true;
        self.anchor_key = Some(key.to_string());
        self
    }

    /// Pin the vector similarity
    pub fn with_sim(mut self, sim: f64) -> Self {
        self.sim = Some(sim);
        self
    }

    /// Precomputed token count
    pub fn with_tokens(mut self, tokens: usize) -> Self {
        self.token_count = Some(tokens);
        self
    }

    fn to_result(&self, sim: f64, score: f64, search_type: SearchType) -> SearchResult {
        SearchResult {
            id: self.id,
            content: self.content.clone(),
            file: self.file.clone(),
            path: self.path.clone(),
            start: self.start,
            end: self.end,
            is_anchor: self.is_anchor,
            anchor_key: self.anchor_key.clone(),
            sim,
            score,
            search_type,
            token_estimate: self.token_count,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Faults {
    fail_vector: bool,
    fail_lexical: bool,
    fail_mining: bool,
    vector_delay: Option<Duration>,
    lexical_delay: Option<Duration>,
    mining_delay: Option<Duration>,
}

/// Fixture-backed retrieval
pub struct FixtureBackend {
    chunks: Vec<FixtureChunk>,
    embedder: HashEmbedder,
    embeddings: Vec<Vec<f32>>,
    bm25: Bm25Index,
    anchor_terms: Option<Vec<String>>,
    faults: Faults,
}

impl FixtureBackend {
    pub fn new(chunks: Vec<FixtureChunk>) -> Self {
        let embedder = HashEmbedder::new(FIXTURE_EMBEDDING_DIMENSION);
        let embeddings = chunks.iter().map(|c| embedder.embed_sync(&c.content)).collect();
        let bm25 = Bm25Index::build(chunks.iter().map(|c| c.content.as_str()));

        Self {
            chunks,
            embedder,
            embeddings,
            bm25,
            anchor_terms: None,
            faults: Faults::default(),
        }
    }

    /// Load a corpus from a JSON array of chunks
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| AppError::Datastore {
            message: format!("failed to read fixture corpus {}: {}", path.display(), e),
        })?;
        let chunks: Vec<FixtureChunk> = serde_json::from_str(&raw)?;
        debug!(chunks = chunks.len(), path = %path.display(), "Fixture corpus loaded");
        Ok(Self::new(chunks))
    }

    /// Report these terms from anchor mining instead of computing them
    pub fn with_anchor_terms(mut self, terms: &[&str]) -> Self {
        self.anchor_terms = Some(terms.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn with_vector_failure(mut self) -> Self {
        self.faults.fail_vector = true;
        self
    }

    pub fn with_lexical_failure(mut self) -> Self {
        self.faults.fail_lexical = true;
        self
    }

    pub fn with_mining_failure(mut self) -> Self {
        self.faults.fail_mining = true;
        self
    }

    pub fn with_vector_delay(mut self, delay: Duration) -> Self {
        self.faults.vector_delay = Some(delay);
        self
    }

    pub fn with_lexical_delay(mut self, delay: Duration) -> Self {
        self.faults.lexical_delay = Some(delay);
        self
    }

    pub fn with_mining_delay(mut self, delay: Duration) -> Self {
        self.faults.mining_delay = Some(delay);
        self
    }

    async fn inject(&self, fail: bool, delay: Option<Duration>, operation: &str) -> Result<()> {
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(AppError::Datastore {
                message: format!("{} failed (injected)", operation),
            });
        }
        Ok(())
    }

    fn by_rank(results: &mut [SearchResult]) {
        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.file.cmp(&b.file))
                .then_with(|| a.path.cmp(&b.path))
                .then_with(|| a.start.cmp(&b.start))
                .then_with(|| a.id.cmp(&b.id))
        });
    }
}

#[async_trait::async_trait]
impl RetrievalBackend for FixtureBackend {
    async fn vector_search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        self.inject(self.faults.fail_vector, self.faults.vector_delay, "vector search")
            .await?;

        let query_embedding = self.embedder.embed_sync(query);
        let mut results: Vec<SearchResult> = self
            .chunks
            .iter()
            .zip(&self.embeddings)
            .map(|(chunk, embedding)| {
                let sim = chunk
                    .sim
                    .unwrap_or_else(|| cosine_similarity(&query_embedding, embedding));
                chunk.to_result(sim, sim, SearchType::Vector)
            })
            .collect();

        Self::by_rank(&mut results);
        results.truncate(k);
        Ok(results)
    }

    async fn lexical_search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        self.inject(self.faults.fail_lexical, self.faults.lexical_delay, "lexical search")
            .await?;

        let mut results: Vec<SearchResult> = self
            .bm25
            .search(query, k)
            .into_iter()
            .filter_map(|(doc, score)| {
                // Same squashing as ts_rank_cd on the store backend
                let normalized = score / (score + 1.0);
                self.chunks
                    .get(doc)
                    .map(|c| c.to_result(0.0, normalized, SearchType::Lexical))
            })
            .collect();

        Self::by_rank(&mut results);
        Ok(results)
    }

    async fn mine_anchor_terms(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        self.inject(self.faults.fail_mining, self.faults.mining_delay, "anchor mining")
            .await?;

        if let Some(terms) = &self.anchor_terms {
            return Ok(terms.iter().take(limit).cloned().collect());
        }

        let mut query_terms: Vec<String> = Bm25Index::terms(query).collect();
        query_terms.sort();
        query_terms.dedup();

        // term -> (relevance, frequency)
        let mut stats: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for (doc, chunk) in self.chunks.iter().enumerate() {
            if !chunk.is_anchor {
                continue;
            }
            let Some(key) = &chunk.anchor_key else {
                continue;
            };
            let relevance = self.bm25.score(&query_terms, doc);
            let terms: HashSet<String> = text::word_set(key, 3);
            for term in terms {
                let entry = stats.entry(term).or_insert((0.0, 0));
                entry.0 += relevance;
                entry.1 += 1;
            }
        }

        let mut ranked: Vec<(String, (f64, usize))> = stats.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1 .0
                .total_cmp(&a.1 .0)
                .then_with(|| b.1 .1.cmp(&a.1 .1))
                .then_with(|| a.0.cmp(&b.0))
        });

        Ok(ranked.into_iter().take(limit).map(|(term, _)| term).collect())
    }

    fn name(&self) -> &str {
        "fixture"
    }
}
