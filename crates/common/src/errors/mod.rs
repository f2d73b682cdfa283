//! Error types for ContextForge
//!
//! Provides the error taxonomy shared by every crate:
//! - Distinct error types for different failure modes
//! - Pipeline stage attribution for fatal failures
//! - Error codes for client handling

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,

    // Datastore errors (7xxx)
    DatabaseError,
    ConnectionError,
    DatastoreError,

    // External service errors (8xxx)
    UpstreamError,
    EmbeddingError,
    PinSourceError,
    Timeout,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,

            // Datastore (7xxx)
            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,
            ErrorCode::DatastoreError => 7004,

            // External (8xxx)
            ErrorCode::UpstreamError => 8001,
            ErrorCode::EmbeddingError => 8002,
            ErrorCode::PinSourceError => 8007,
            ErrorCode::Timeout => 8008,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Pipeline stage a fatal error is attributed to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ValidateConfig,
    LoadPins,
    ProbeConfidence,
    ExpandQuery,
    Retrieve,
    Canonicalize,
    Fuse,
    AnchorUplift,
    Dedup,
    Budget,
    Package,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ValidateConfig => "validate_config",
            Stage::LoadPins => "load_pins",
            Stage::ProbeConfidence => "probe_confidence",
            Stage::ExpandQuery => "expand_query",
            Stage::Retrieve => "retrieve",
            Stage::Canonicalize => "canonicalize",
            Stage::Fuse => "fuse",
            Stage::AnchorUplift => "anchor_uplift",
            Stage::Dedup => "dedup",
            Stage::Budget => "budget",
            Stage::Package => "package",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    // Datastore errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    #[error("Datastore error: {message}")]
    Datastore { message: String },

    // External service errors
    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("Pin source error: {message}")]
    PinSource { message: String },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Pipeline attribution
    #[error("Stage {stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<AppError>,
    },

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Attribute this error to a pipeline stage
    pub fn at_stage(self, stage: Stage) -> Self {
        match self {
            // Keep the innermost attribution
            AppError::Stage { .. } => self,
            other => AppError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage this error was attributed to, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            AppError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::Datastore { .. } => ErrorCode::DatastoreError,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::PinSource { .. } => ErrorCode::PinSourceError,
            AppError::Timeout { .. } => ErrorCode::Timeout,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Stage { source, .. } => source.code(),
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Check if this error was caused by caller input rather than a collaborator
    pub fn is_client_error(&self) -> bool {
        self.code() == ErrorCode::ValidationError
    }

    /// Check if this error is a deadline expiry
    pub fn is_timeout(&self) -> bool {
        self.code() == ErrorCode::Timeout
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errs: validator::ValidationErrors) -> Self {
        let field = errs
            .field_errors()
            .keys()
            .next()
            .map(|f| f.to_string());
        AppError::Validation {
            message: errs.to_string(),
            field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::Datastore {
            message: "down".into(),
        };
        assert_eq!(err.code(), ErrorCode::DatastoreError);
        assert_eq!(err.code().as_code(), 7004);
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "stability out of range".into(),
            field: Some("stability".into()),
        };
        assert!(err.is_client_error());
        assert!(err.stage().is_none());
    }

    #[test]
    fn test_stage_attribution_keeps_inner_code() {
        let err = AppError::Timeout {
            operation: "vector search".into(),
            timeout_ms: 50,
        }
        .at_stage(Stage::Retrieve);

        assert_eq!(err.stage(), Some(Stage::Retrieve));
        assert_eq!(err.code(), ErrorCode::Timeout);
        assert!(err.is_timeout());
        assert!(err.to_string().contains("retrieve"));
    }

    #[test]
    fn test_stage_attribution_is_not_rewrapped() {
        let err = AppError::PinSource {
            message: "missing".into(),
        }
        .at_stage(Stage::LoadPins)
        .at_stage(Stage::Package);

        assert_eq!(err.stage(), Some(Stage::LoadPins));
    }
}
