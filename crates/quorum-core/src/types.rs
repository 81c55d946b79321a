//! Core data model for governance invocations.
//!
//! Every model invocation produces one [`GovernanceLog`]: a fully populated,
//! immutable record of what was asked, what came back, what it cost, and how
//! a judge model rated it. The log is assembled synchronously inside one
//! pipeline run and handed to persistence exactly once.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The provider family hosting a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    Openai,
    Anthropic,
    Google,
    Aws,
    Azure,
    Other,
}

impl ModelProvider {
    /// Classify a caller-supplied host platform string.
    ///
    /// Matching is case-insensitive substring: "aws" maps to AWS,
    /// "openai" to OpenAI, "google" or "gcp" to Google. Anything else
    /// is [`ModelProvider::Other`] and routed to the mock adapter.
    pub fn classify(host_platform: &str) -> Self {
        let key = host_platform.to_lowercase();
        if key.contains("aws") {
            ModelProvider::Aws
        } else if key.contains("openai") {
            ModelProvider::Openai
        } else if key.contains("google") || key.contains("gcp") {
            ModelProvider::Google
        } else {
            ModelProvider::Other
        }
    }

    /// Stable lowercase name, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelProvider::Openai => "openai",
            ModelProvider::Anthropic => "anthropic",
            ModelProvider::Google => "google",
            ModelProvider::Aws => "aws",
            ModelProvider::Azure => "azure",
            ModelProvider::Other => "other",
        }
    }
}

impl std::fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One target backend, as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// The AI host platform (e.g. "aws_bedrock", "openai", "gcp_vertex").
    pub host_platform: String,

    /// Provider-native model identifier.
    pub model_id: String,
}

impl ModelConfig {
    pub fn new(host_platform: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            host_platform: host_platform.into(),
            model_id: model_id.into(),
        }
    }
}

/// Raw usage metrics from a provider call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageMetrics {
    pub input_tokens: u32,
    pub output_tokens: u32,

    /// Wall-clock latency of the adapter call, in milliseconds.
    pub latency_ms: f64,
}

impl UsageMetrics {
    /// Derived total; not stored independently.
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Calculated monetary cost of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostMetrics {
    pub input_cost: f64,
    pub output_cost: f64,

    /// Exactly `input_cost + output_cost`; never rounded independently.
    pub total_cost: f64,

    pub currency: String,
}

impl CostMetrics {
    /// Build from per-component costs; the total is the exact sum.
    pub fn new(input_cost: f64, output_cost: f64) -> Self {
        Self {
            input_cost,
            output_cost,
            total_cost: input_cost + output_cost,
            currency: "USD".to_string(),
        }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl Default for CostMetrics {
    fn default() -> Self {
        Self::zero()
    }
}

/// Complexity label a judge assigns to the original query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryCategory {
    #[serde(rename = "Straightforward")]
    Straightforward,
    #[serde(rename = "Mid-Level Complication")]
    MidLevelComplication,
    #[serde(rename = "Advanced Reasoning")]
    AdvancedReasoning,
}

/// Judge-model assessment of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    /// Accuracy score in \[0, 100\].
    pub score: i64,

    /// One-sentence explanation for the score.
    pub rationale: String,

    /// The judge model that produced this assessment.
    pub evaluator_model: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_category: Option<QueryCategory>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_optimization: Option<String>,
}

impl AccuracyMetrics {
    /// Degraded assessment used when evaluation could not run.
    pub fn unavailable(evaluator_model: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            score: 0,
            rationale: rationale.into(),
            evaluator_model: evaluator_model.into(),
            query_category: None,
            prompt_optimization: None,
        }
    }
}

/// Normalized record of one (query, model) invocation.
///
/// Invariant: `success == true` iff `status == Completed` iff
/// `error_message.is_none()`. On failure the response text may be empty
/// but cost and usage are still populated (with zero tokens).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceLog {
    /// Unique invocation id.
    pub id: String,

    /// Distributed trace id for observability.
    pub trace_id: String,

    pub provider: ModelProvider,
    pub model_id: String,

    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,

    pub usage: UsageMetrics,
    pub cost: CostMetrics,
    pub accuracy: AccuracyMetrics,

    pub status: InvocationStatus,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Free-form metadata (environment, governance context).
    pub tags: BTreeMap<String, String>,

    pub input_prompt: String,
    pub response_text: String,
}

impl GovernanceLog {
    /// Check the success/status/error coherence invariant.
    pub fn is_coherent(&self) -> bool {
        match self.status {
            InvocationStatus::Completed => self.success && self.error_message.is_none(),
            InvocationStatus::Failed => !self.success && self.error_message.is_some(),
            _ => false,
        }
    }
}

/// Caller-facing request shape, consumed from the routing layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub query: String,

    /// Which cloud/policy domain the query concerns. Metadata only;
    /// never used for routing.
    #[serde(default = "default_governance_context")]
    pub governance_context: String,

    /// Judge model used for the second-pass accuracy rating.
    #[serde(default = "default_evaluator_model")]
    pub evaluator_model: String,

    pub models: Vec<ModelConfig>,
}

fn default_governance_context() -> String {
    "aws".to_string()
}

fn default_evaluator_model() -> String {
    "gemini-2.5-pro".to_string()
}

impl AnalysisRequest {
    pub fn new(query: impl Into<String>, models: Vec<ModelConfig>) -> Self {
        Self {
            query: query.into(),
            governance_context: default_governance_context(),
            evaluator_model: default_evaluator_model(),
            models,
        }
    }
}
