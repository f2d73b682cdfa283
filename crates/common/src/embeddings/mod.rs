//! Embedding service abstraction
//!
//! Provides a unified interface for query embedding:
//! - OpenAI-compatible endpoints (text-embedding-3-small, ada-002)
//! - Deterministic feature hashing for fixtures and offline runs

use crate::config::EmbeddingConfig;
use crate::errors::{AppError, Result};
use crate::text;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// OpenAI embedding client
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct OpenAIRequest {
    input: Vec<String>,
    model: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
}

impl OpenAIEmbedder {
    /// Create a new OpenAI embedder
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let model = model.unwrap_or_else(|| "text-embedding-3-small".to_string());
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        })
    }

    async fn make_request(&self, text: &str) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);

        let request = OpenAIRequest {
            input: vec![text.to_string()],
            model: self.model.clone(),
        };

        let response = self.client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::EmbeddingError {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::EmbeddingError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: OpenAIResponse = response.json().await.map_err(|e| {
            AppError::EmbeddingError {
                message: format!("Failed to parse response: {}", e),
            }
        })?;

        Ok(result.data.into_iter().map(|e| e.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.make_request(text).await?;
        embeddings.into_iter().next().ok_or_else(|| AppError::EmbeddingError {
            message: "Empty response".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Deterministic bag-of-words embedder using feature hashing
///
/// Each lowercased word is hashed (FNV-1a) into one of `dimension` buckets
/// with a hash-derived sign, and the result is L2-normalised so that the dot
/// product of two embeddings is their cosine similarity. Same text, same
/// vector, on every run and every platform.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn fnv1a(word: &str) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;
        word.bytes()
            .fold(OFFSET, |hash, b| (hash ^ u64::from(b)).wrapping_mul(PRIME))
    }

    /// Embed without going through the async trait
    pub fn embed_sync(&self, input: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        for word in text::words(input) {
            let hash = Self::fnv1a(&word);
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn model_name(&self) -> &str {
        "hash-bow"
    }
}

/// Cosine similarity of two vectors (0.0 when either is zero)
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let norm_a = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "embedding.api_key is required for the openai provider".to_string(),
            })?;
            Ok(Arc::new(OpenAIEmbedder::new(
                key,
                Some(config.model.clone()),
                config.api_base.clone(),
                Duration::from_secs(config.timeout_secs),
            )?))
        }
        "hash" => Ok(Arc::new(HashEmbedder::new(config.dimension))),
        other => Err(AppError::Configuration {
            message: format!("unknown embedding provider '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new(256);
        let a = embedder.embed("memory context bundle").await.unwrap();
        let b = embedder.embed("memory context bundle").await.unwrap();
        assert_eq!(a.len(), 256);
        assert_eq!(a, b);
    }

    #[test]
    fn test_non_ascii_text_embeds() {
        let embedder = HashEmbedder::new(64);
        let v = embedder.embed_sync("память агента");
        assert!(v.iter().any(|x| *x != 0.0));
        assert_eq!(embedder.model_name(), "hash-bow");
    }

    #[test]
    fn test_cosine_of_identical_text_is_one() {
        let embedder = HashEmbedder::new(128);
        let a = embedder.embed_sync("reciprocal rank fusion");
        let sim = cosine_similarity(&a, &a);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_of_disjoint_text_is_lower() {
        let embedder = HashEmbedder::new(512);
        let a = embedder.embed_sync("reciprocal rank fusion");
        let b = embedder.embed_sync("reciprocal rank fusion scoring");
        let c = embedder.embed_sync("tomato basil pasta");
        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }

    #[test]
    fn test_empty_text_embeds_to_zero_vector() {
        let embedder = HashEmbedder::new(16);
        let v = embedder.embed_sync("");
        assert!(v.iter().all(|x| *x == 0.0));
        assert_eq!(cosine_similarity(&v, &v), 0.0);
    }

    #[test]
    fn test_unknown_provider_is_configuration_error() {
        let config = EmbeddingConfig {
            provider: "carrier-pigeon".to_string(),
            ..Default::default()
        };
        assert!(create_embedder(&config).is_err());
    }
}
