//! ContextForge Engine
//!
//! Hybrid retrieval and context bundling for agent rehydration:
//! - Dual vector + lexical retrieval behind a pluggable backend
//! - Reciprocal Rank Fusion with a pure-vector fallback
//! - Confidence-gated query expansion and anchor uplift
//! - Per-file diversity, near-duplicate pruning and greedy token budgeting

pub mod bundle;
pub mod deadline;
pub mod diagnostics;
pub mod pipeline;
pub mod retrieval;

pub use bundle::{Bundle, BundleMeta, Section, SectionKind};
pub use diagnostics::{BudgetExceededNotice, DegradedFeatureWarning};
pub use pipeline::{
    CharRatioEstimator, FilePinSource, PinSource, Rehydrator, ScopeMatcher, StaticPinSource,
    SubstringScopeMatcher, TokenEstimator,
};
pub use retrieval::{FixtureBackend, FixtureChunk, RetrievalBackend, SearchResult, StoreBackend};
