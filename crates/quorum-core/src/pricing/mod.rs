//! Rate tables and cost computation.
//!
//! The engine loads four provider-family rate tables at startup and resolves
//! a per-single-token rate pair for any (provider, model id) combination via
//! fuzzy name matching. Lookup misses are not errors: they fall through to
//! documented defaults so a cost is always produced.

mod matchers;
mod tables;

use std::path::Path;

use crate::types::CostMetrics;

pub use tables::{AnthropicTable, GcpTable, MetaTable, OpenAiTable};

const PER_MILLION: f64 = 1_000_000.0;
const PER_THOUSAND: f64 = 1_000.0;

/// Fallback rates per million tokens (Claude Instant class).
const ANTHROPIC_FALLBACK: (f64, f64) = (0.8, 2.4);
/// Fallback rates per thousand tokens.
const META_FALLBACK: (f64, f64) = (0.0003, 0.0006);
/// Fallback rates per million tokens (GPT-4o class).
const OPENAI_FALLBACK: (f64, f64) = (2.50, 10.00);
/// Fallback rates per million tokens (Gemini Flash class).
const GCP_FALLBACK: (f64, f64) = (0.075, 0.30);

/// A resolved per-single-token rate pair.
///
/// Callers multiply directly by token counts; all per-million/per-thousand
/// normalization happens inside the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatePair {
    pub input: f64,
    pub output: f64,
}

impl RatePair {
    pub const ZERO: RatePair = RatePair { input: 0.0, output: 0.0 };
}

/// Loaded rate tables for all provider families.
#[derive(Debug, Clone, Default)]
pub struct PricingEngine {
    anthropic: AnthropicTable,
    meta: MetaTable,
    openai: OpenAiTable,
    gcp: GcpTable,
}

impl PricingEngine {
    /// Load all four tables from a directory. Any subset may be absent;
    /// missing tables resolve every lookup to the family fallback rate.
    pub fn load(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            anthropic: tables::load_table(&dir.join("aws_anthropic.json")),
            meta: tables::load_table(&dir.join("aws_meta.json")),
            openai: tables::load_table(&dir.join("openai.json")),
            gcp: tables::load_table(&dir.join("gcp_vertex.json")),
        }
    }

    /// An engine with no catalog data; every lookup falls back.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compute the cost of one invocation from actual token counts.
    ///
    /// `total_cost` is the arithmetic sum of the two component costs.
    pub fn calculate_cost(
        &self,
        provider: &str,
        model_id: &str,
        input_tokens: u32,
        output_tokens: u32,
    ) -> CostMetrics {
        let rates = self.resolve_rates(provider, model_id);
        CostMetrics::new(
            rates.input * input_tokens as f64,
            rates.output * output_tokens as f64,
        )
    }

    /// Resolve a per-token rate pair.
    ///
    /// Family selection order is significant: Anthropic, then Meta, then
    /// OpenAI, then GCP; the first family whose name test passes wins. A
    /// model matching no family prices at zero.
    pub fn resolve_rates(&self, provider: &str, model_id: &str) -> RatePair {
        let provider = provider.to_lowercase();
        let model_lower = model_id.to_lowercase();

        if provider.contains("anthropic") || model_lower.contains("claude") {
            self.anthropic_rates(model_id)
        } else if provider.contains("meta") || model_lower.contains("llama") {
            self.meta_rates(model_id)
        } else if provider.contains("openai")
            || model_lower.contains("gpt")
            || model_lower.contains("o1")
            || model_lower.contains("o3")
        {
            self.openai_rates(model_id)
        } else if provider.contains("gcp")
            || provider.contains("vertex")
            || model_lower.contains("gemini")
        {
            self.gcp_rates(model_id)
        } else {
            RatePair::ZERO
        }
    }

    fn anthropic_rates(&self, model_id: &str) -> RatePair {
        for entry in &self.anthropic.models {
            if matchers::anthropic_matches(&entry.model, model_id) {
                return RatePair {
                    input: entry.input / PER_MILLION,
                    output: entry.output / PER_MILLION,
                };
            }
        }
        RatePair {
            input: ANTHROPIC_FALLBACK.0 / PER_MILLION,
            output: ANTHROPIC_FALLBACK.1 / PER_MILLION,
        }
    }

    fn meta_rates(&self, model_id: &str) -> RatePair {
        if let Some(bucket) = matchers::meta_family_bucket(model_id) {
            if let Some(entries) = self.meta.models.get(bucket) {
                for entry in entries {
                    if matchers::llama_size_matches(&entry.model, model_id) {
                        return RatePair {
                            input: entry.on_demand.input / PER_THOUSAND,
                            output: entry.on_demand.output / PER_THOUSAND,
                        };
                    }
                }
            }
        }
        RatePair {
            input: META_FALLBACK.0 / PER_THOUSAND,
            output: META_FALLBACK.1 / PER_THOUSAND,
        }
    }

    fn openai_rates(&self, model_id: &str) -> RatePair {
        // First match wins; catalog order is significant.
        for entry in &self.openai.tiers.standard {
            if matchers::openai_matches(&entry.model, model_id) {
                return RatePair {
                    input: entry.input / PER_MILLION,
                    output: entry.output / PER_MILLION,
                };
            }
        }
        RatePair {
            input: OPENAI_FALLBACK.0 / PER_MILLION,
            output: OPENAI_FALLBACK.1 / PER_MILLION,
        }
    }

    fn gcp_rates(&self, model_id: &str) -> RatePair {
        let clean = model_id.replace("google/", "");
        for entry in &self.gcp.models {
            if matchers::gcp_matches(&entry.model, &clean) {
                return RatePair {
                    input: entry.input / PER_MILLION,
                    output: entry.output / PER_MILLION,
                };
            }
        }
        RatePair {
            input: GCP_FALLBACK.0 / PER_MILLION,
            output: GCP_FALLBACK.1 / PER_MILLION,
        }
    }
}
