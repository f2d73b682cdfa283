//! In-memory BM25 scoring for the fixture corpus
//!
//! Terms are lowercased alphanumeric words longer than two characters, the
//! same filter the full-text query preparation uses.

use contextforge_common::text;
use std::collections::HashMap;

const MIN_TERM_LEN: usize = 2;

/// BM25 index over a fixed set of documents
#[derive(Debug, Clone)]
pub struct Bm25Index {
    term_freqs: Vec<HashMap<String, usize>>,
    doc_lens: Vec<usize>,
    doc_freqs: HashMap<String, usize>,
    avg_doc_len: f64,
    k1: f64,
    b: f64,
}

impl Bm25Index {
    /// Build an index with the usual k1 = 1.2, b = 0.75
    pub fn build<'a>(docs: impl IntoIterator<Item = &'a str>) -> Self {
        Self::with_params(docs, 1.2, 0.75)
    }

    pub fn with_params<'a>(docs: impl IntoIterator<Item = &'a str>, k1: f64, b: f64) -> Self {
        let mut term_freqs = Vec::new();
        let mut doc_lens = Vec::new();
        let mut doc_freqs: HashMap<String, usize> = HashMap::new();

        for doc in docs {
            let mut tf: HashMap<String, usize> = HashMap::new();
            let mut len = 0;
            for term in Self::terms(doc) {
                *tf.entry(term).or_default() += 1;
                len += 1;
            }
            for term in tf.keys() {
                *doc_freqs.entry(term.clone()).or_default() += 1;
            }
            term_freqs.push(tf);
            doc_lens.push(len);
        }

        let avg_doc_len = if doc_lens.is_empty() {
            0.0
        } else {
            doc_lens.iter().sum::<usize>() as f64 / doc_lens.len() as f64
        };

        Self {
            term_freqs,
            doc_lens,
            doc_freqs,
            avg_doc_len,
            k1,
            b,
        }
    }

    /// Prepare text into index terms
    pub fn terms(text: &str) -> impl Iterator<Item = String> + '_ {
        text::words(text).filter(|w| w.chars().count() > MIN_TERM_LEN)
    }

    pub fn len(&self) -> usize {
        self.doc_lens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lens.is_empty()
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.len() as f64;
        let df = self.doc_freqs.get(term).copied().unwrap_or(0) as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// BM25 score of one document for already-prepared query terms
    pub fn score(&self, query_terms: &[String], doc: usize) -> f64 {
        let (Some(tf), Some(&len)) = (self.term_freqs.get(doc), self.doc_lens.get(doc)) else {
            return 0.0;
        };
        if self.avg_doc_len == 0.0 {
            return 0.0;
        }

        let norm = self.k1 * (1.0 - self.b + self.b * len as f64 / self.avg_doc_len);
        query_terms
            .iter()
            .filter_map(|term| tf.get(term).map(|&f| (term, f as f64)))
            .map(|(term, f)| self.idf(term) * f * (self.k1 + 1.0) / (f + norm))
            .sum()
    }

    /// Top documents with a positive score, best first, ties by document order
    pub fn search(&self, query: &str, limit: usize) -> Vec<(usize, f64)> {
        let mut query_terms: Vec<String> = Self::terms(query).collect();
        query_terms.sort();
        query_terms.dedup();
        if query_terms.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<(usize, f64)> = (0..self.len())
            .map(|doc| (doc, self.score(&query_terms, doc)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        hits.truncate(limit);
        hits
    }
}
