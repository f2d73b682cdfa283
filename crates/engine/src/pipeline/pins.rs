//! Guardrail pins: a small curated block always placed first in the bundle

use super::budget::TokenEstimator;
use crate::deadline::Deadline;
use async_trait::async_trait;
use contextforge_common::errors::{AppError, Result};
use std::path::PathBuf;
use tracing::debug;

/// Curated text and where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Pin {
    pub text: String,
    pub origin: String,
}

/// Source of the guardrail pin block
#[async_trait]
pub trait PinSource: Send + Sync {
    async fn fetch(&self) -> Result<Pin>;
}

/// Pins read from a text or markdown file on every fetch
pub struct FilePinSource {
    path: PathBuf,
}

impl FilePinSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PinSource for FilePinSource {
    async fn fetch(&self) -> Result<Pin> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| AppError::PinSource {
                message: format!("failed to read {}: {}", self.path.display(), e),
            })?;

        Ok(Pin {
            text,
            origin: self.path.display().to_string(),
        })
    }
}

/// In-memory pins
pub struct StaticPinSource {
    pin: Pin,
}

impl StaticPinSource {
    pub fn new(text: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            pin: Pin {
                text: text.into(),
                origin: origin.into(),
            },
        }
    }

    /// No pin block at all
    pub fn empty() -> Self {
        Self::new("", "none")
    }
}

#[async_trait]
impl PinSource for StaticPinSource {
    async fn fetch(&self) -> Result<Pin> {
        Ok(self.pin.clone())
    }
}

/// Pin block after truncation
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPins {
    pub text: String,
    pub origin: String,
    pub tokens: usize,
    pub truncated: bool,
}

/// Fetch pins and fit them under `cap` tokens
pub async fn load_pins(
    source: &dyn PinSource,
    cap: usize,
    estimator: &dyn TokenEstimator,
    deadline: &Deadline,
) -> Result<LoadedPins> {
    let pin = deadline.run("pin load", source.fetch()).await?;
    let (text, truncated) = truncate_to_tokens(pin.text.trim(), cap, estimator);
    let tokens = estimator.estimate(&text);

    debug!(origin = %pin.origin, tokens, truncated, "Pins loaded");

    Ok(LoadedPins {
        text,
        origin: pin.origin,
        tokens,
        truncated,
    })
}

/// Longest prefix of `text` whose estimate stays within `cap`, cut back to
/// the last word boundary when one lies in the second half of that prefix.
/// A zero cap disables pins entirely. Assumes the estimator is monotone in
/// prefix length.
pub fn truncate_to_tokens(text: &str, cap: usize, estimator: &dyn TokenEstimator) -> (String, bool) {
    if cap == 0 {
        return (String::new(), !text.is_empty());
    }
    if estimator.estimate(text) <= cap {
        return (text.to_string(), false);
    }

    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();

    // Largest char count n with estimate(prefix(n)) <= cap
    let (mut lo, mut hi) = (0, boundaries.len() - 1);
    while lo < hi {
        let mid = (lo + hi + 1) / 2;
        if estimator.estimate(&text[..boundaries[mid]]) <= cap {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }

    let mut prefix = &text[..boundaries[lo]];
    let at_boundary = text[prefix.len()..].starts_with(char::is_whitespace);
    if !at_boundary {
        if let Some(ws) = prefix.rfind(char::is_whitespace) {
            if ws >= prefix.len() / 2 {
                prefix = &prefix[..ws];
            }
        }
    }

    (prefix.trim_end().to_string(), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::budget::CharRatioEstimator;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_short_text_is_untouched() {
        let (text, truncated) = truncate_to_tokens("keep it short", 10, &CharRatioEstimator::default());
        assert_eq!(text, "keep it short");
        assert!(!truncated);
    }

    #[test]
    fn test_truncates_at_word_boundary() {
        let est = CharRatioEstimator::default();
        // 15 chars fit a 3 token cap; "alpha beta gamm" backs off to "alpha beta"
        let (text, truncated) = truncate_to_tokens("alpha beta gamma delta", 3, &est);
        assert_eq!(text, "alpha beta");
        assert!(truncated);
        assert!(est.estimate(&text) <= 3);
    }

    #[test]
    fn test_long_word_is_cut_mid_word() {
        let est = CharRatioEstimator::default();
        let (text, truncated) = truncate_to_tokens("a supercalifragilistic", 2, &est);
        // The only boundary sits before the first half, so no back-off
        assert_eq!(text, "a supercali");
        assert!(truncated);
    }

    #[test]
    fn test_zero_cap_drops_pins() {
        let (text, truncated) = truncate_to_tokens("anything at all here", 0, &CharRatioEstimator::default());
        assert_eq!(text, "");
        assert!(truncated);

        let (text, truncated) = truncate_to_tokens("", 0, &CharRatioEstimator::default());
        assert_eq!(text, "");
        assert!(!truncated);
    }

    #[test]
    fn test_multibyte_text_truncates_on_char_boundary() {
        let est = CharRatioEstimator::default();
        let (text, _) = truncate_to_tokens("żółw żółw żółw żółw", 2, &est);
        assert!(est.estimate(&text) <= 2);
        assert!(text.starts_with("żółw"));
    }

    #[tokio::test]
    async fn test_load_pins_applies_cap() {
        let source = StaticPinSource::new("  never delete user data without confirmation  ", "inline");
        let pins = assert_ok!(
            load_pins(&source, 4, &CharRatioEstimator::default(), &Deadline::none()).await
        );
        assert!(pins.truncated);
        assert!(pins.tokens <= 4);
        assert!(pins.text.starts_with("never"));
        assert_eq!(pins.origin, "inline");
    }

    #[tokio::test]
    async fn test_missing_pin_file_is_an_error() {
        let source = FilePinSource::new("/nonexistent/contextforge/pins.md");
        let err = assert_err!(
            load_pins(&source, 100, &CharRatioEstimator::default(), &Deadline::none()).await
        );
        assert!(err.to_string().contains("Pin source error"));
    }
}
