//! Context bundle: the packaged output handed to the agent

use crate::diagnostics::{BudgetExceededNotice, DegradedFeatureWarning};
use crate::pipeline::LoadedPins;
use crate::retrieval::{FusionMode, SearchResult};
use contextforge_common::config::{DedupeMode, ExpandMode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// What a section was built from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Pin,
    Anchor,
    Span,
}

/// One titled block of the bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub kind: SectionKind,
    pub title: String,
    pub content: String,
    pub citation: String,
    pub token_estimate: usize,
    pub file: String,
    pub path: String,
    pub start: usize,
    pub end: usize,
    pub is_anchor: bool,
    pub anchor_key: Option<String>,
    pub score: f64,
}

impl Section {
    /// Pin block section
    pub fn pin(pins: &LoadedPins, title: &str) -> Self {
        Self {
            kind: SectionKind::Pin,
            title: title.to_string(),
            content: pins.text.clone(),
            citation: pins.origin.clone(),
            token_estimate: pins.tokens,
            file: pins.origin.clone(),
            path: String::new(),
            start: 0,
            end: pins.text.chars().count(),
            is_anchor: false,
            anchor_key: None,
            score: 0.0,
        }
    }

    /// Evidence section from a selected result and its token cost
    pub fn evidence(result: SearchResult, tokens: usize) -> Self {
        let kind = if result.is_anchor {
            SectionKind::Anchor
        } else {
            SectionKind::Span
        };

        let title = match (&result.anchor_key, result.path.is_empty()) {
            (Some(key), _) if result.is_anchor && !key.is_empty() => key.clone(),
            (_, false) => result.path.clone(),
            _ => result.file.clone(),
        };

        let citation = if result.path.is_empty() {
            format!("{}:{}-{}", result.file, result.start, result.end)
        } else {
            format!("{}#{}:{}-{}", result.file, result.path, result.start, result.end)
        };

        Self {
            kind,
            title,
            content: result.content,
            citation,
            token_estimate: tokens,
            file: result.file,
            path: result.path,
            start: result.start,
            end: result.end,
            is_anchor: result.is_anchor,
            anchor_key: result.anchor_key,
            score: result.score,
        }
    }

    /// Header, citation line, blank line, content
    pub fn render(&self) -> String {
        format!(
            "### {}\nsource: {}\n\n{}",
            self.title,
            self.citation,
            self.content.trim_end()
        )
    }
}

/// Scalar diagnostics describing how a bundle was built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMeta {
    pub backend: String,
    pub query: String,
    pub effective_query: String,

    // Confidence
    pub stability: f64,
    pub sim_top: f64,
    pub expanded: bool,
    pub uplift_applied: bool,
    pub boosted_anchors: usize,
    pub expansion_terms: Vec<String>,

    // Toggles and knobs
    pub use_fusion: bool,
    pub fusion_mode: FusionMode,
    pub dedupe_mode: DedupeMode,
    pub expand_query: ExpandMode,
    pub k_vec: usize,
    pub k_lex: usize,
    pub rrf_k0: f64,
    pub overlap_threshold: f64,
    pub per_file_cap: usize,
    pub low_conf_sim: f64,

    // Token accounting
    pub max_tokens: usize,
    pub pins_tokens: usize,
    pub pins_truncated: bool,
    pub evidence_tokens: usize,
    pub total_tokens: usize,

    // Candidate counts per stage
    pub vector_hits: usize,
    pub lexical_hits: usize,
    pub fused: usize,
    pub after_dedup: usize,
    pub selected: usize,

    pub warnings: Vec<DegradedFeatureWarning>,
    pub budget_notice: Option<BudgetExceededNotice>,

    pub elapsed_ms: u64,

    /// SHA-256 of `text`, hex encoded
    pub digest: String,
}

/// Final context bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub sections: Vec<Section>,
    pub text: String,
    pub meta: BundleMeta,
}

impl Bundle {
    pub fn evidence(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter().filter(|s| s.kind != SectionKind::Pin)
    }

    pub fn pins(&self) -> Option<&Section> {
        self.sections.iter().find(|s| s.kind == SectionKind::Pin)
    }
}

/// Assemble the bundle: pin section first when non-empty, then evidence in
/// order. `meta.digest` is filled from the rendered text.
pub fn package(pins: Option<Section>, evidence: Vec<Section>, mut meta: BundleMeta) -> Bundle {
    let sections: Vec<Section> = pins
        .filter(|p| !p.content.is_empty())
        .into_iter()
        .chain(evidence)
        .collect();

    let text = sections
        .iter()
        .map(Section::render)
        .collect::<Vec<_>>()
        .join("\n\n");

    meta.digest = hex::encode(Sha256::digest(text.as_bytes()));

    Bundle {
        sections,
        text,
        meta,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::retrieval::test_support::result;

    pub(crate) fn empty_meta() -> BundleMeta {
        BundleMeta {
            backend: "fixture".to_string(),
            query: "q".to_string(),
            effective_query: "q".to_string(),
            stability: 0.5,
            sim_top: 0.0,
            expanded: false,
            uplift_applied: false,
            boosted_anchors: 0,
            expansion_terms: vec![],
            use_fusion: true,
            fusion_mode: FusionMode::Vector,
            dedupe_mode: DedupeMode::FileOverlap,
            expand_query: ExpandMode::Auto,
            k_vec: 24,
            k_lex: 24,
            rrf_k0: 60.0,
            overlap_threshold: 0.6,
            per_file_cap: 2,
            low_conf_sim: 0.3,
            max_tokens: 4000,
            pins_tokens: 0,
            pins_truncated: false,
            evidence_tokens: 0,
            total_tokens: 0,
            vector_hits: 0,
            lexical_hits: 0,
            fused: 0,
            after_dedup: 0,
            selected: 0,
            warnings: vec![],
            budget_notice: None,
            elapsed_ms: 0,
            digest: String::new(),
        }
    }

    fn pins(text: &str) -> LoadedPins {
        LoadedPins {
            text: text.to_string(),
            origin: "guardrails.md".to_string(),
            tokens: text.len() / 4,
            truncated: false,
        }
    }

    #[test]
    fn test_anchor_section_uses_anchor_key_title() {
        let mut hit = result(1, "docs/memory.md", "Memory > Layout", 0.8);
        hit.is_anchor = true;
        hit.anchor_key = Some("Memory Layout".to_string());
        hit.start = 10;
        hit.end = 90;

        let section = Section::evidence(hit, 20);

        assert_eq!(section.kind, SectionKind::Anchor);
        assert_eq!(section.title, "Memory Layout");
        assert_eq!(section.citation, "docs/memory.md#Memory > Layout:10-90");
        assert_eq!(section.token_estimate, 20);
    }

    #[test]
    fn test_span_without_path_cites_file() {
        let section = Section::evidence(result(1, "notes.txt", "", 0.4), 5);
        assert_eq!(section.kind, SectionKind::Span);
        assert_eq!(section.title, "notes.txt");
        assert_eq!(section.citation, "notes.txt:0-100");
    }

    #[test]
    fn test_render_layout() {
        let section = Section::evidence(result(7, "a.md", "Intro", 0.4), 5);
        assert_eq!(
            section.render(),
            "### Intro\nsource: a.md#Intro:0-100\n\ncontent of chunk 7"
        );
    }

    #[test]
    fn test_package_puts_pins_first_and_digests_text() {
        let evidence = vec![Section::evidence(result(1, "a.md", "A", 0.9), 4)];
        let bundle = package(
            Some(Section::pin(&pins("Never leak secrets."), "Guardrails")),
            evidence,
            empty_meta(),
        );

        assert_eq!(bundle.sections.len(), 2);
        assert_eq!(bundle.sections[0].kind, SectionKind::Pin);
        assert!(bundle.text.starts_with("### Guardrails\nsource: guardrails.md\n\nNever leak secrets."));
        assert!(bundle.text.contains("\n\n### A\n"));
        assert_eq!(bundle.meta.digest.len(), 64);
        assert_eq!(bundle.evidence().count(), 1);
    }

    #[test]
    fn test_empty_pins_are_omitted() {
        let bundle = package(Some(Section::pin(&pins(""), "Guardrails")), vec![], empty_meta());
        assert!(bundle.sections.is_empty());
        assert!(bundle.pins().is_none());
        assert_eq!(bundle.text, "");
    }

    #[test]
    fn test_meta_serializes_as_flat_json() {
        let bundle = package(None, vec![], empty_meta());
        let json = serde_json::to_value(&bundle.meta).unwrap();
        assert_eq!(json["fusion_mode"], "vector");
        assert_eq!(json["dedupe_mode"], "file+overlap");
        assert_eq!(json["expand_query"], "auto");
        assert!(json["budget_notice"].is_null());
    }
}
