//! PostgreSQL retrieval backend (pgvector + full-text search)
//!
//! Expects a `chunks` table with:
//! - `embedding vector(N)` for cosine nearest-neighbor search
//! - `text_search_vector tsvector` for `ts_rank_cd` lexical search
//! - `file`, `path`, `start_offset`, `end_offset`, `is_anchor`, `anchor_key`,
//!   `token_count` chunk metadata

use super::{Bm25Index, RetrievalBackend, SearchResult, SearchType};
use contextforge_common::db::DbPool;
use contextforge_common::embeddings::Embedder;
use contextforge_common::errors::{AppError, Result};
use sea_orm::{DbBackend, FromQueryResult, Statement};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const VECTOR_SQL: &str = r#"
    SELECT
        c.id,
        c.content,
        c.file,
        c.path,
        c.start_offset,
        c.end_offset,
        c.is_anchor,
        c.anchor_key,
        c.token_count,
        (1 - (c.embedding <=> $1::vector))::float8 as score
    FROM chunks c
    WHERE c.embedding IS NOT NULL
    ORDER BY c.embedding <=> $1::vector, c.file, c.path, c.start_offset, c.id
    LIMIT $2
"#;

const LEXICAL_SQL: &str = r#"
    SELECT
        c.id,
        c.content,
        c.file,
        c.path,
        c.start_offset,
        c.end_offset,
        c.is_anchor,
        c.anchor_key,
        c.token_count,
        ts_rank_cd(c.text_search_vector, plainto_tsquery('english', $1), 32)::float8 as score
    FROM chunks c
    WHERE c.text_search_vector @@ plainto_tsquery('english', $1)
    ORDER BY score DESC, c.file, c.path, c.start_offset, c.id
    LIMIT $2
"#;

// Anchor keys are split into words; each word is weighted by the summed
// lexical relevance of the anchors carrying it
const MINING_SQL: &str = r#"
    SELECT
        t.term,
        SUM(ts_rank_cd(c.text_search_vector, plainto_tsquery('english', $1)))::float8 as relevance,
        COUNT(*)::int8 as freq
    FROM chunks c,
        LATERAL regexp_split_to_table(lower(c.anchor_key), '[^[:alnum:]_]+') AS t(term)
    WHERE c.is_anchor
      AND c.anchor_key IS NOT NULL
      AND length(t.term) > 3
    GROUP BY t.term
    ORDER BY relevance DESC, freq DESC, t.term
    LIMIT $2
"#;

/// Query result row
#[derive(Debug, FromQueryResult)]
struct ChunkRow {
    id: Uuid,
    content: String,
    file: String,
    path: Option<String>,
    start_offset: Option<i32>,
    end_offset: Option<i32>,
    is_anchor: bool,
    anchor_key: Option<String>,
    token_count: Option<i32>,
    score: f64,
}

impl ChunkRow {
    fn into_result(self, search_type: SearchType) -> SearchResult {
        let (sim, score) = match search_type {
            SearchType::Vector => (self.score, self.score),
            // Normalization flag 32 already maps the rank to rank/(rank+1)
            SearchType::Lexical => (0.0, self.score),
        };

        SearchResult {
            id: self.id,
            content: self.content,
            file: self.file,
            path: self.path.unwrap_or_default(),
            start: self.start_offset.map(|v| v.max(0) as usize).unwrap_or(0),
            end: self.end_offset.map(|v| v.max(0) as usize).unwrap_or(0),
            is_anchor: self.is_anchor,
            anchor_key: self.anchor_key,
            sim,
            score,
            search_type,
            token_estimate: self.token_count.map(|v| v.max(0) as usize),
        }
    }
}

#[derive(Debug, FromQueryResult)]
struct TermRow {
    term: String,
}

/// Retrieval backend over the shared chunk store
pub struct StoreBackend {
    db: Arc<DbPool>,
    embedder: Arc<dyn Embedder>,
}

impl StoreBackend {
    pub fn new(db: Arc<DbPool>, embedder: Arc<dyn Embedder>) -> Self {
        Self { db, embedder }
    }

    /// Format an embedding as a pgvector literal "[1.0,2.0,...]"
    fn vector_literal(embedding: &[f32]) -> String {
        format!(
            "[{}]",
            embedding
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join(",")
        )
    }

    /// Query text is searchable when it has at least one index term
    fn is_searchable(query: &str) -> bool {
        Bm25Index::terms(query).next().is_some()
    }
}

#[async_trait::async_trait]
impl RetrievalBackend for StoreBackend {
    async fn vector_search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Ok(vec![]);
        }

        let embedding = self.embedder.embed(query).await?;

        let rows = ChunkRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            VECTOR_SQL,
            vec![Self::vector_literal(&embedding).into(), (k as i64).into()],
        ))
        .all(self.db.read())
        .await
        .map_err(|e| AppError::Datastore {
            message: format!("Vector search failed: {}", e),
        })?;

        debug!(hits = rows.len(), model = self.embedder.model_name(), "Vector search");
        Ok(rows
            .into_iter()
            .map(|r| r.into_result(SearchType::Vector))
            .collect())
    }

    async fn lexical_search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 || !Self::is_searchable(query) {
            return Ok(vec![]);
        }

        let rows = ChunkRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            LEXICAL_SQL,
            vec![query.to_string().into(), (k as i64).into()],
        ))
        .all(self.db.read())
        .await
        .map_err(|e| AppError::Datastore {
            message: format!("Lexical search failed: {}", e),
        })?;

        debug!(hits = rows.len(), "Lexical search");
        Ok(rows
            .into_iter()
            .map(|r| r.into_result(SearchType::Lexical))
            .collect())
    }

    async fn mine_anchor_terms(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        if limit == 0 {
            return Ok(vec![]);
        }

        let rows = TermRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            MINING_SQL,
            vec![query.to_string().into(), (limit as i64).into()],
        ))
        .all(self.db.read())
        .await
        .map_err(|e| AppError::Datastore {
            message: format!("Anchor term mining failed: {}", e),
        })?;

        Ok(rows.into_iter().map(|r| r.term).collect())
    }

    fn name(&self) -> &str {
        "store"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(score: f64) -> ChunkRow {
        ChunkRow {
            id: Uuid::from_u128(9),
            content: "pgvector cosine search".to_string(),
            file: "db.md".to_string(),
            path: None,
            start_offset: Some(-4),
            end_offset: Some(120),
            is_anchor: true,
            anchor_key: Some("Vector Search".to_string()),
            token_count: Some(6),
            score,
        }
    }

    #[test]
    fn test_embedding_format() {
        let formatted = StoreBackend::vector_literal(&[0.1, 0.2, 0.3]);
        assert_eq!(formatted, "[0.1,0.2,0.3]");
    }

    #[test]
    fn test_vector_row_keeps_similarity() {
        let result = row(0.82).into_result(SearchType::Vector);
        assert_eq!(result.sim, 0.82);
        assert_eq!(result.score, 0.82);
        assert_eq!(result.start, 0);
        assert_eq!(result.end, 120);
        assert_eq!(result.path, "");
        assert_eq!(result.token_estimate, Some(6));
    }

    #[test]
    fn test_lexical_row_keeps_database_normalized_score() {
        let result = row(0.75).into_result(SearchType::Lexical);
        assert_eq!(result.sim, 0.0);
        assert_eq!(result.score, 0.75);
        assert_eq!(result.search_type, SearchType::Lexical);
    }

    #[test]
    fn test_query_without_terms_is_not_searchable() {
        assert!(!StoreBackend::is_searchable("a of to"));
        assert!(StoreBackend::is_searchable("fusion"));
        assert!(StoreBackend::is_searchable("память агента"));
        assert!(StoreBackend::is_searchable("café"));
    }
}
