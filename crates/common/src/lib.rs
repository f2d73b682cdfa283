//! ContextForge Common Library
//!
//! Shared code for the ContextForge engine and binaries including:
//! - Error types and stage attribution
//! - Configuration management
//! - Database connection pool
//! - Embedding client abstraction
//! - Metrics and observability
//! - Word tokenization

pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod metrics;
pub mod text;

// Re-export commonly used types
pub use config::{AppConfig, DedupeMode, ExpandMode, RehydrateConfig};
pub use embeddings::Embedder;
pub use errors::{AppError, Result, Stage};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
