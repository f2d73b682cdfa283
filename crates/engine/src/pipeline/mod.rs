//! Rehydration pipeline
//!
//! One request runs these stages in order:
//! - Load pins and probe confidence (concurrently)
//! - Expand the query when confidence is low
//! - Dual retrieval, canonicalization and fusion
//! - Anchor uplift when confidence is low
//! - Diversity filtering, budgeting and packaging
//!
//! Pins, the probe and vector search are critical: their failures abort the
//! request with the failing stage attached. Everything else degrades and is
//! reported in `meta.warnings`.

pub mod budget;
pub mod diversity;
pub mod expand;
pub mod pins;
pub mod probe;
pub mod uplift;

pub use budget::{select_within_budget, CharRatioEstimator, Selection, TokenEstimator};
pub use diversity::{diversify, prune_near_duplicates, round_robin_by_file, word_jaccard, DiversityOutcome};
pub use expand::{accept_terms, expand_query, is_low_confidence, should_expand, Expansion};
pub use pins::{load_pins, truncate_to_tokens, FilePinSource, LoadedPins, Pin, PinSource, StaticPinSource};
pub use probe::{probe_confidence, ProbeOutcome};
pub use uplift::{apply_anchor_uplift, uplift_epsilon, ScopeMatcher, SubstringScopeMatcher, UpliftOutcome};

use crate::bundle::{package, Bundle, BundleMeta, Section};
use crate::deadline::Deadline;
use crate::retrieval::{canonicalize, rank, DualRetriever, RetrievalBackend};
use contextforge_common::config::{ExpandMode, RehydrateConfig};
use contextforge_common::errors::{AppError, Result, Stage};
use contextforge_common::metrics;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument};

const DEFAULT_PINS_TITLE: &str = "Guardrails";

/// Builds context bundles against one retrieval backend and pin source
#[derive(Clone)]
pub struct Rehydrator {
    backend: Arc<dyn RetrievalBackend>,
    pins: Arc<dyn PinSource>,
    estimator: Arc<dyn TokenEstimator>,
    scope: Arc<dyn ScopeMatcher>,
    pins_title: String,
}

impl Rehydrator {
    pub fn new(backend: Arc<dyn RetrievalBackend>, pins: Arc<dyn PinSource>) -> Self {
        Self {
            backend,
            pins,
            estimator: Arc::new(CharRatioEstimator::default()),
            scope: Arc::new(SubstringScopeMatcher),
            pins_title: DEFAULT_PINS_TITLE.to_string(),
        }
    }

    pub fn with_token_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_scope_matcher(mut self, scope: Arc<dyn ScopeMatcher>) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_pins_title(mut self, title: impl Into<String>) -> Self {
        self.pins_title = title.into();
        self
    }

    /// Build a context bundle for `query` under `config`.
    ///
    /// Returns a bundle, possibly with reduced evidence explained in
    /// `meta`, or a fatal error carrying the failing stage.
    #[instrument(skip(self, config), fields(backend = %self.backend.name()))]
    pub async fn rehydrate(&self, query: &str, config: &RehydrateConfig) -> Result<Bundle> {
        let started = Instant::now();
        let result = self.run(query, config, started).await;
        let elapsed = started.elapsed().as_secs_f64();

        match &result {
            Ok(bundle) => {
                metrics::record_rehydrate(elapsed, "ok", bundle.meta.selected);
                info!(
                    selected = bundle.meta.selected,
                    total_tokens = bundle.meta.total_tokens,
                    sim_top = bundle.meta.sim_top,
                    warnings = bundle.meta.warnings.len(),
                    elapsed_ms = bundle.meta.elapsed_ms,
                    "Bundle ready"
                );
            }
            Err(e) => {
                metrics::record_rehydrate(elapsed, "error", 0);
                error!(
                    stage = e.stage().map(|s| s.as_str()).unwrap_or("unknown"),
                    error = %e,
                    "Rehydration failed"
                );
            }
        }

        result
    }

    async fn run(&self, query: &str, config: &RehydrateConfig, started: Instant) -> Result<Bundle> {
        if query.trim().is_empty() {
            return Err(AppError::Validation {
                message: "query must not be blank".to_string(),
                field: Some("query".to_string()),
            }
            .at_stage(Stage::ValidateConfig));
        }
        config
            .ensure_valid()
            .map_err(|e| e.at_stage(Stage::ValidateConfig))?;

        let deadline = Deadline::after(config.timeout());
        let mut warnings = Vec::new();

        // Pins and probe are independent
        let (pins, probe) = tokio::join!(
            load_pins(
                self.pins.as_ref(),
                config.pins_token_cap,
                self.estimator.as_ref(),
                &deadline
            ),
            probe_confidence(self.backend.as_ref(), query, config.k_vec, &deadline),
        );
        let pins = pins.map_err(|e| e.at_stage(Stage::LoadPins))?;
        let probe = probe.map_err(|e| e.at_stage(Stage::ProbeConfidence))?;
        let low_confidence = is_low_confidence(probe.sim_top, config);

        let expansion = if should_expand(probe.sim_top, config) {
            expand_query(
                self.backend.as_ref(),
                query,
                config.max_expansion_terms,
                &deadline,
            )
            .await
        } else {
            Expansion::unchanged(query)
        };
        warnings.extend(expansion.warning.clone());

        // Same text, same vector results: skip the second call
        let reuse = (!expansion.is_expanded()).then_some(probe.hits);
        let k_lex = if config.use_fusion { config.k_lex } else { 0 };
        let dual = DualRetriever::new(self.backend.clone())
            .retrieve(&expansion.query, config.k_vec, k_lex, &deadline, reuse)
            .await
            .map_err(|e| e.at_stage(Stage::Retrieve))?;
        warnings.extend(dual.warning);
        let (vector_hits, lexical_hits) = (dual.vector.len(), dual.lexical.len());

        let lists = canonicalize(dual.vector, dual.lexical);
        let fusion = rank(lists, config.use_fusion, config.rrf_k0);
        let fused = fusion.ranked.len();

        let uplift_applied = low_confidence && config.expand_query != ExpandMode::Off;
        let (ranked, boosted_anchors) = if uplift_applied {
            // Scope is judged against what the user asked
            let outcome =
                apply_anchor_uplift(fusion.ranked, query, config.stability, self.scope.as_ref());
            warnings.extend(outcome.warning);
            (outcome.ranked, outcome.boosted)
        } else {
            (fusion.ranked, 0)
        };

        let diversity = diversify(
            ranked,
            config.dedupe_mode,
            config.per_file_cap,
            config.overlap_threshold,
        );
        let after_dedup = diversity.kept.len();

        let evidence_budget = config.max_tokens.saturating_sub(pins.tokens);
        let selection =
            select_within_budget(diversity.kept, evidence_budget, self.estimator.as_ref());

        let evidence: Vec<Section> = selection
            .selected
            .into_iter()
            .map(|(result, tokens)| Section::evidence(result, tokens))
            .collect();

        let meta = BundleMeta {
            backend: self.backend.name().to_string(),
            query: query.to_string(),
            effective_query: expansion.query,
            stability: config.stability,
            sim_top: probe.sim_top,
            expanded: !expansion.terms.is_empty(),
            uplift_applied,
            boosted_anchors,
            expansion_terms: expansion.terms,
            use_fusion: config.use_fusion,
            fusion_mode: fusion.mode,
            dedupe_mode: config.dedupe_mode,
            expand_query: config.expand_query,
            k_vec: config.k_vec,
            k_lex: config.k_lex,
            rrf_k0: config.rrf_k0,
            overlap_threshold: config.overlap_threshold,
            per_file_cap: config.per_file_cap,
            low_conf_sim: config.low_conf_sim,
            max_tokens: config.max_tokens,
            pins_tokens: pins.tokens,
            pins_truncated: pins.truncated,
            evidence_tokens: selection.used_tokens,
            total_tokens: pins.tokens + selection.used_tokens,
            vector_hits,
            lexical_hits,
            fused,
            after_dedup,
            selected: evidence.len(),
            warnings,
            budget_notice: selection.notice,
            elapsed_ms: started.elapsed().as_millis() as u64,
            digest: String::new(),
        };

        Ok(package(
            Some(Section::pin(&pins, &self.pins_title)),
            evidence,
            meta,
        ))
    }
}
