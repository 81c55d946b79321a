//! Provider adapters for the invoke contract.
//!
//! Each adapter translates `invoke(model_id, prompt)` into one provider's
//! wire format and normalizes the response into an [`Invocation`]. Adapters
//! hold one HTTP client and an optional credential, are immutable after
//! construction, and are safe for concurrent calls.
//!
//! ## Failure contract
//!
//! Transport, auth and payload errors propagate as [`AdapterError`] so the
//! pipeline can mark the run failed. Adapters never retry internally;
//! retry policy belongs to the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use quorum_core::ModelProvider;

mod bedrock;
mod mock;
mod openai;
mod vertex;

pub use bedrock::BedrockAdapter;
pub use mock::MockAdapter;
pub use openai::OpenAiAdapter;
pub use vertex::VertexAdapter;

/// Errors from provider adapters.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Response parse error: {0}")]
    Parse(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Unsupported model for this adapter: {0}")]
    UnsupportedModel(String),
}

/// Normalized result of one provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub response_text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// One provider wire protocol behind the common invoke contract.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Send `prompt` to `model_id` and normalize the response.
    async fn invoke(&self, model_id: &str, prompt: &str) -> Result<Invocation, AdapterError>;

    /// Adapter name for logs and metrics.
    fn name(&self) -> &str;

    /// Whether usable credentials are present.
    ///
    /// An unconfigured adapter still exists so dispatch stays total; its
    /// `invoke` returns [`AdapterError::NotConfigured`].
    fn is_configured(&self) -> bool;
}

/// Estimate token counts as word_count x 1.3.
///
/// A documented approximation, not exact tokenization; used when a backend
/// omits usage counters.
pub fn estimate_tokens(text: &str) -> u32 {
    (text.split_whitespace().count() as f64 * 1.3) as u32
}

/// Build a shared HTTP client with the given request timeout.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// The full set of adapters, one per provider family.
///
/// Resolution is total: providers with no real adapter route to the mock,
/// so the pipeline always has something to call.
#[derive(Clone)]
pub struct AdapterSet {
    bedrock: Arc<dyn ModelAdapter>,
    openai: Arc<dyn ModelAdapter>,
    vertex: Arc<dyn ModelAdapter>,
    mock: Arc<dyn ModelAdapter>,
}

impl AdapterSet {
    /// Build all adapters from environment credentials.
    pub fn from_env(request_timeout: Duration) -> Self {
        Self {
            bedrock: Arc::new(BedrockAdapter::from_env(request_timeout)),
            openai: Arc::new(OpenAiAdapter::from_env(request_timeout)),
            vertex: Arc::new(VertexAdapter::from_env(request_timeout)),
            mock: Arc::new(MockAdapter::default()),
        }
    }

    /// Explicit construction, used by tests to inject fakes.
    pub fn new(
        bedrock: Arc<dyn ModelAdapter>,
        openai: Arc<dyn ModelAdapter>,
        vertex: Arc<dyn ModelAdapter>,
        mock: Arc<dyn ModelAdapter>,
    ) -> Self {
        Self {
            bedrock,
            openai,
            vertex,
            mock,
        }
    }

    /// Resolve the adapter for a classified provider.
    pub fn for_provider(&self, provider: ModelProvider) -> Arc<dyn ModelAdapter> {
        match provider {
            ModelProvider::Aws => Arc::clone(&self.bedrock),
            ModelProvider::Openai => Arc::clone(&self.openai),
            ModelProvider::Google => Arc::clone(&self.vertex),
            _ => Arc::clone(&self.mock),
        }
    }

    /// Route a judge model id to its adapter family.
    ///
    /// "gpt"/"o1" choose OpenAI, "llama"/"bedrock" choose Bedrock, and
    /// anything else falls through to Vertex (the default judge family).
    pub fn for_judge(&self, judge_model_id: &str) -> Arc<dyn ModelAdapter> {
        let id = judge_model_id.to_lowercase();
        if id.contains("gpt") || id.contains("o1") {
            Arc::clone(&self.openai)
        } else if id.contains("llama") || id.contains("bedrock") {
            Arc::clone(&self.bedrock)
        } else {
            Arc::clone(&self.vertex)
        }
    }
}
