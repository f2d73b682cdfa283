//! Per-call rehydration settings
//!
//! `RehydrateConfig` is an immutable value handed to every pipeline call.
//! Nothing in the engine reads the environment once a request is running.

use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Which diversity passes run after ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DedupeMode {
    #[serde(rename = "off", alias = "none")]
    Off,
    #[serde(rename = "file")]
    File,
    #[serde(rename = "overlap")]
    Overlap,
    #[serde(rename = "file+overlap")]
    FileOverlap,
}

impl DedupeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DedupeMode::Off => "off",
            DedupeMode::File => "file",
            DedupeMode::Overlap => "overlap",
            DedupeMode::FileOverlap => "file+overlap",
        }
    }

    /// Per-file round-robin capping is on
    pub fn caps_files(&self) -> bool {
        self.as_str().starts_with("file")
    }

    /// Near-duplicate pruning is on
    pub fn prunes_overlap(&self) -> bool {
        self.as_str().ends_with("overlap")
    }
}

impl fmt::Display for DedupeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DedupeMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(DedupeMode::Off),
            "file" => Ok(DedupeMode::File),
            "overlap" => Ok(DedupeMode::Overlap),
            "file+overlap" => Ok(DedupeMode::FileOverlap),
            other => Err(AppError::Validation {
                message: format!("unknown dedupe mode '{}'", other),
                field: Some("dedupe_mode".to_string()),
            }),
        }
    }
}

/// Whether low-confidence queries are expanded with mined anchor terms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpandMode {
    Off,
    Auto,
}

impl ExpandMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpandMode::Off => "off",
            ExpandMode::Auto => "auto",
        }
    }
}

impl fmt::Display for ExpandMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpandMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(ExpandMode::Off),
            "auto" => Ok(ExpandMode::Auto),
            other => Err(AppError::Validation {
                message: format!("unknown expand mode '{}'", other),
                field: Some("expand_query".to_string()),
            }),
        }
    }
}

/// Settings for a single rehydration call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_budget_split"))]
pub struct RehydrateConfig {
    /// Anchor uplift slider (0.0 - 1.0)
    #[validate(range(min = 0.0, max = 1.0))]
    pub stability: f64,

    /// Total token budget for pins plus evidence
    #[validate(range(min = 1))]
    pub max_tokens: usize,

    /// Fuse vector and lexical lists with RRF
    pub use_fusion: bool,

    pub dedupe_mode: DedupeMode,

    pub expand_query: ExpandMode,

    /// Vector candidates per search
    #[validate(range(min = 1))]
    pub k_vec: usize,

    /// Lexical candidates per search (0 disables the lexical leg)
    pub k_lex: usize,

    /// RRF smoothing constant
    #[validate(range(exclusive_min = 0.0))]
    pub rrf_k0: f64,

    /// Maximum word-Jaccard similarity between retained evidence
    #[validate(range(min = 0.0, max = 1.0))]
    pub overlap_threshold: f64,

    /// Maximum sections per source file
    #[validate(range(min = 1))]
    pub per_file_cap: usize,

    /// Top similarity below which the query counts as low confidence
    #[validate(range(min = 0.0, max = 1.0))]
    pub low_conf_sim: f64,

    /// Token cap for the guardrail pin block
    pub pins_token_cap: usize,

    /// Upper bound on mined expansion terms
    pub max_expansion_terms: usize,

    /// Whole-request deadline in milliseconds
    pub timeout_ms: Option<u64>,
}

fn default_stability() -> f64 { 0.5 }
fn default_max_tokens() -> usize { 4000 }
fn default_use_fusion() -> bool { true }
fn default_k_vec() -> usize { 24 }
fn default_k_lex() -> usize { 24 }
fn default_rrf_k0() -> f64 { 60.0 }
fn default_overlap_threshold() -> f64 { 0.6 }
fn default_per_file_cap() -> usize { 2 }
fn default_low_conf_sim() -> f64 { 0.3 }
fn default_pins_token_cap() -> usize { 400 }
fn default_max_expansion_terms() -> usize { 6 }
fn default_timeout_ms() -> Option<u64> { Some(10_000) }

impl Default for RehydrateConfig {
    fn default() -> Self {
        Self {
            stability: default_stability(),
            max_tokens: default_max_tokens(),
            use_fusion: default_use_fusion(),
            dedupe_mode: DedupeMode::FileOverlap,
            expand_query: ExpandMode::Auto,
            k_vec: default_k_vec(),
            k_lex: default_k_lex(),
            rrf_k0: default_rrf_k0(),
            overlap_threshold: default_overlap_threshold(),
            per_file_cap: default_per_file_cap(),
            low_conf_sim: default_low_conf_sim(),
            pins_token_cap: default_pins_token_cap(),
            max_expansion_terms: default_max_expansion_terms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn validate_budget_split(cfg: &RehydrateConfig) -> std::result::Result<(), ValidationError> {
    let floats = [
        cfg.stability,
        cfg.rrf_k0,
        cfg.overlap_threshold,
        cfg.low_conf_sim,
    ];
    if floats.iter().any(|v| !v.is_finite()) {
        return Err(ValidationError::new("non_finite")
            .with_message(Cow::from("numeric settings must be finite")));
    }

    if cfg.pins_token_cap > cfg.max_tokens {
        return Err(ValidationError::new("pins_exceed_budget").with_message(Cow::from(
            format!(
                "pins_token_cap ({}) exceeds max_tokens ({})",
                cfg.pins_token_cap, cfg.max_tokens
            ),
        )));
    }

    if cfg.timeout_ms == Some(0) {
        return Err(ValidationError::new("zero_timeout")
            .with_message(Cow::from("timeout_ms must be positive when set")));
    }

    Ok(())
}

impl RehydrateConfig {
    /// Reject invalid settings before any pipeline work starts
    pub fn ensure_valid(&self) -> Result<()> {
        self.validate()?;
        Ok(())
    }

    /// Request deadline as Duration
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_defaults_are_valid() {
        let cfg = RehydrateConfig::default();
        assert_ok!(cfg.ensure_valid());
        assert_eq!(cfg.max_expansion_terms, 6);
        assert_eq!(cfg.timeout(), Some(Duration::from_millis(10_000)));
    }

    #[test]
    fn test_stability_out_of_range() {
        let cfg = RehydrateConfig {
            stability: 1.5,
            ..Default::default()
        };
        let err = cfg.ensure_valid().unwrap_err();
        assert!(err.is_client_error());
        assert!(err.to_string().contains("stability"));
    }

    #[test]
    fn test_pins_cannot_exceed_budget() {
        let cfg = RehydrateConfig {
            max_tokens: 100,
            pins_token_cap: 200,
            ..Default::default()
        };
        assert_err!(cfg.ensure_valid());
    }

    #[test]
    fn test_nan_threshold_rejected() {
        let cfg = RehydrateConfig {
            overlap_threshold: f64::NAN,
            ..Default::default()
        };
        assert_err!(cfg.ensure_valid());
    }

    #[test]
    fn test_infinite_values_rejected() {
        let cfg = RehydrateConfig {
            rrf_k0: f64::INFINITY,
            ..Default::default()
        };
        let err = cfg.ensure_valid().unwrap_err();
        assert!(err.is_client_error());

        for cfg in [
            RehydrateConfig {
                stability: f64::NEG_INFINITY,
                ..Default::default()
            },
            RehydrateConfig {
                low_conf_sim: f64::INFINITY,
                ..Default::default()
            },
        ] {
            assert_err!(cfg.ensure_valid());
        }
    }

    #[test]
    fn test_zero_k_vec_rejected() {
        let cfg = RehydrateConfig {
            k_vec: 0,
            ..Default::default()
        };
        assert_err!(cfg.ensure_valid());
    }

    #[test]
    fn test_dedupe_mode_parsing() {
        let mode: DedupeMode = "file+overlap".parse().unwrap();
        assert!(mode.caps_files());
        assert!(mode.prunes_overlap());

        let mode: DedupeMode = "file".parse().unwrap();
        assert!(mode.caps_files());
        assert!(!mode.prunes_overlap());

        assert_err!("shuffle".parse::<DedupeMode>());
    }

    #[test]
    fn test_config_deserializes_with_partial_fields() {
        let cfg: RehydrateConfig = serde_json::from_str(
            r#"{"max_tokens": 500, "dedupe_mode": "file", "expand_query": "off"}"#,
        )
        .unwrap();
        assert_eq!(cfg.max_tokens, 500);
        assert_eq!(cfg.dedupe_mode, DedupeMode::File);
        assert_eq!(cfg.expand_query, ExpandMode::Off);
        assert_eq!(cfg.k_vec, 24);
    }

    #[test]
    fn test_none_is_an_alias_for_off() {
        let parsed: DedupeMode = "none".parse().unwrap();
        let cfg: RehydrateConfig = serde_json::from_str(r#"{"dedupe_mode": "none"}"#).unwrap();
        assert_eq!(parsed, DedupeMode::Off);
        assert_eq!(cfg.dedupe_mode, DedupeMode::Off);
        assert_eq!(serde_json::to_string(&DedupeMode::Off).unwrap(), r#""off""#);
    }
}
