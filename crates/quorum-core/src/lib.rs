//! # quorum-core
//!
//! Deterministic data model and cost engine for Quorum.
//!
//! This crate holds everything about a governance analysis that can be
//! computed without talking to a network: the normalized invocation record
//! ([`GovernanceLog`]), the request/usage/cost/accuracy types, and the
//! rate-table [`PricingEngine`].
//!
//! ## Key guarantees
//!
//! 1. **Deterministic**: same inputs always price to the same cost
//! 2. **Total**: every (provider, model) pair resolves to some rate;
//!    lookup misses fall back to documented defaults, never errors
//! 3. **Exact**: `total_cost` is the arithmetic sum of the two component
//!    costs, never rounded independently
//!
//! The async invocation machinery (provider adapters, judge evaluation,
//! fan-out) lives in `quorum-engine`.

pub mod pricing;
pub mod types;

pub use pricing::{PricingEngine, RatePair};
pub use types::{
    AccuracyMetrics, AnalysisRequest, CostMetrics, GovernanceLog, InvocationStatus, ModelConfig,
    ModelProvider, QueryCategory, UsageMetrics,
};
