//! Amazon Bedrock adapter.
//!
//! One adapter covers both model families Bedrock hosts for us, dispatching
//! on the model id: "anthropic" ids use the Claude messages payload,
//! "meta" ids use the Llama delimiter-template payload. An id matching
//! neither family is a configuration error, not a silent mock.
//!
//! Authentication uses a Bedrock long-term API key sent as a bearer token.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::{estimate_tokens, http_client, AdapterError, Invocation, ModelAdapter};
use crate::secrets::{ApiCredential, CredentialSource};

/// Environment variable for the Bedrock API key.
pub const BEDROCK_API_KEY_ENV: &str = "AWS_BEDROCK_API_KEY";

/// Environment variable for the AWS region (defaults to us-east-1).
pub const BEDROCK_REGION_ENV: &str = "AWS_REGION";

const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";
const CLAUDE_MAX_TOKENS: u32 = 2000;
const LLAMA_MAX_GEN_LEN: u32 = 2048;

pub struct BedrockAdapter {
    credential: Option<ApiCredential>,
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl std::fmt::Debug for BedrockAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BedrockAdapter")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl BedrockAdapter {
    /// Create from environment: `AWS_BEDROCK_API_KEY` and `AWS_REGION`.
    pub fn from_env(timeout: Duration) -> Self {
        let region =
            std::env::var(BEDROCK_REGION_ENV).unwrap_or_else(|_| "us-east-1".to_string());
        Self {
            credential: ApiCredential::from_env(BEDROCK_API_KEY_ENV, "Bedrock API key"),
            base_url: format!("https://bedrock-runtime.{region}.amazonaws.com"),
            client: http_client(timeout),
            timeout,
        }
    }

    /// Create with an explicit key.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            credential: Some(ApiCredential::new(
                api_key,
                CredentialSource::Programmatic,
                "Bedrock API key",
            )),
            base_url: "https://bedrock-runtime.us-east-1.amazonaws.com".to_string(),
            client: http_client(timeout),
            timeout,
        }
    }

    /// Point at a custom endpoint (tests, private gateways).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    async fn post_invoke(&self, model_id: &str, body: String) -> Result<JsonValue, AdapterError> {
        let credential = self.credential.as_ref().ok_or_else(|| {
            AdapterError::NotConfigured(format!(
                "Bedrock API key not set: configure {BEDROCK_API_KEY_ENV}"
            ))
        })?;

        let response = self
            .client
            .post(format!("{}/model/{}/invoke", self.base_url, model_id))
            .bearer_auth(credential.expose())
            .header("content-type", "application/json")
            .header("accept", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AdapterError::Timeout(self.timeout)
                } else {
                    AdapterError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AdapterError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| AdapterError::Parse(e.to_string()))
    }

    async fn invoke_claude(&self, model_id: &str, prompt: &str) -> Result<Invocation, AdapterError> {
        let request = ClaudeRequest {
            anthropic_version: ANTHROPIC_VERSION,
            max_tokens: CLAUDE_MAX_TOKENS,
            messages: vec![ClaudeMessage {
                role: "user",
                content: vec![ClaudeContentBlock {
                    type_: "text",
                    text: prompt,
                }],
            }],
        };
        let body =
            serde_json::to_string(&request).map_err(|e| AdapterError::Parse(e.to_string()))?;

        let response = self.post_invoke(model_id, body).await?;
        Ok(parse_claude_response(&response))
    }

    async fn invoke_llama(&self, model_id: &str, prompt: &str) -> Result<Invocation, AdapterError> {
        let request = LlamaRequest {
            prompt: format_llama_prompt(prompt),
            max_gen_len: LLAMA_MAX_GEN_LEN,
            temperature: 0.5,
            top_p: 0.9,
        };
        let body =
            serde_json::to_string(&request).map_err(|e| AdapterError::Parse(e.to_string()))?;

        let response = self.post_invoke(model_id, body).await?;
        Ok(parse_llama_response(&response, prompt))
    }
}

#[async_trait]
impl ModelAdapter for BedrockAdapter {
    async fn invoke(&self, model_id: &str, prompt: &str) -> Result<Invocation, AdapterError> {
        if model_id.contains("anthropic") {
            self.invoke_claude(model_id, prompt).await
        } else if model_id.contains("meta") {
            self.invoke_llama(model_id, prompt).await
        } else {
            Err(AdapterError::UnsupportedModel(model_id.to_string()))
        }
    }

    fn name(&self) -> &str {
        "bedrock"
    }

    fn is_configured(&self) -> bool {
        self.credential.as_ref().is_some_and(|c| !c.is_empty())
    }
}

/// Wrap a prompt in the Llama 3 chat delimiter template.
fn format_llama_prompt(prompt: &str) -> String {
    format!(
        "\n<|begin_of_text|><|start_header_id|>user<|end_header_id|>\n\n{prompt}<|eot_id|><|start_header_id|>assistant<|end_header_id|>\n"
    )
}

/// Extract text and usage from a Claude messages response.
///
/// Falls back from `content[0].text` to the legacy `completion` field, and
/// finally to the stringified raw body, so the call is never silently dropped.
fn parse_claude_response(body: &JsonValue) -> Invocation {
    let usage = &body["usage"];
    let input_tokens = usage["input_tokens"].as_u64().unwrap_or(0) as u32;
    let output_tokens = usage["output_tokens"].as_u64().unwrap_or(0) as u32;

    let response_text = if let Some(text) = body["content"][0]["text"].as_str() {
        text.to_string()
    } else if let Some(completion) = body["completion"].as_str() {
        completion.to_string()
    } else {
        tracing::warn!("unexpected Claude response shape, returning raw body");
        body.to_string()
    };

    Invocation {
        response_text,
        input_tokens,
        output_tokens,
    }
}

/// Extract text and usage from a Llama response.
///
/// Reads `generation`, falling back to `text`; when the backend omits token
/// counts they are estimated from word counts.
fn parse_llama_response(body: &JsonValue, prompt: &str) -> Invocation {
    let response_text = body["generation"]
        .as_str()
        .filter(|s| !s.is_empty())
        .or_else(|| body["text"].as_str())
        .unwrap_or_default()
        .to_string();

    let input_tokens = body["prompt_token_count"]
        .as_u64()
        .map(|n| n as u32)
        .unwrap_or_else(|| estimate_tokens(prompt));
    let output_tokens = body["generation_token_count"]
        .as_u64()
        .map(|n| n as u32)
        .unwrap_or_else(|| estimate_tokens(&response_text));

    Invocation {
        response_text,
        input_tokens,
        output_tokens,
    }
}

#[derive(Serialize)]
struct ClaudeRequest<'a> {
    anthropic_version: &'static str,
    max_tokens: u32,
    messages: Vec<ClaudeMessage<'a>>,
}

#[derive(Serialize)]
struct ClaudeMessage<'a> {
    role: &'static str,
    content: Vec<ClaudeContentBlock<'a>>,
}

#[derive(Serialize)]
struct ClaudeContentBlock<'a> {
    #[serde(rename = "type")]
    type_: &'static str,
    text: &'a str,
}

#[derive(Serialize)]
struct LlamaRequest {
    prompt: String,
    max_gen_len: u32,
    temperature: f64,
    top_p: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_claude_response_happy_path() {
        let body = json!({
            "content": [{"type": "text", "text": "Buckets are private by default."}],
            "usage": {"input_tokens": 42, "output_tokens": 17}
        });
        let inv = parse_claude_response(&body);
        assert_eq!(inv.response_text, "Buckets are private by default.");
        assert_eq!(inv.input_tokens, 42);
        assert_eq!(inv.output_tokens, 17);
    }

    #[test]
    fn test_claude_legacy_completion_fallback() {
        let body = json!({
            "completion": "legacy text",
            "usage": {"input_tokens": 5, "output_tokens": 3}
        });
        let inv = parse_claude_response(&body);
        assert_eq!(inv.response_text, "legacy text");
    }

    #[test]
    fn test_claude_unknown_shape_stringifies_raw_body() {
        let body = json!({"odd": "shape"});
        let inv = parse_claude_response(&body);
        assert!(inv.response_text.contains("odd"));
        assert_eq!(inv.input_tokens, 0);
    }

    #[test]
    fn test_llama_response_with_counts() {
        let body = json!({
            "generation": "an answer",
            "prompt_token_count": 11,
            "generation_token_count": 7
        });
        let inv = parse_llama_response(&body, "some prompt");
        assert_eq!(inv.response_text, "an answer");
        assert_eq!(inv.input_tokens, 11);
        assert_eq!(inv.output_tokens, 7);
    }

    #[test]
    fn test_llama_estimates_missing_counts() {
        let body = json!({"generation": "one two three four"});
        let inv = parse_llama_response(&body, "five words in this prompt");
        // 5 words x 1.3 = 6; 4 words x 1.3 = 5
        assert_eq!(inv.input_tokens, 6);
        assert_eq!(inv.output_tokens, 5);
    }

    #[test]
    fn test_llama_text_field_fallback() {
        let body = json!({"text": "newer format"});
        let inv = parse_llama_response(&body, "p");
        assert_eq!(inv.response_text, "newer format");
    }

    #[test]
    fn test_llama_prompt_template() {
        let formatted = format_llama_prompt("hello");
        assert!(formatted.contains("<|begin_of_text|>"));
        assert!(formatted.contains("hello<|eot_id|>"));
        assert!(formatted.ends_with("<|end_header_id|>\n"));
    }

    #[tokio::test]
    async fn test_unsupported_model_is_config_error() {
        let adapter = BedrockAdapter::new("key", Duration::from_secs(1));
        let err = adapter.invoke("mistral.mistral-7b", "hi").await.unwrap_err();
        assert!(matches!(err, AdapterError::UnsupportedModel(_)));
    }

    #[tokio::test]
    async fn test_missing_credential_fails_at_invoke() {
        let mut adapter = BedrockAdapter::new("k", Duration::from_secs(1));
        adapter.credential = None;
        assert!(!adapter.is_configured());
        let err = adapter
            .invoke("anthropic.claude-3-sonnet", "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::NotConfigured(_)));
    }
}
