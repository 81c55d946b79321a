//! Google Gemini adapter (Generative Language API).
//!
//! Strips any "google/" namespace prefix before dispatch. Usage metadata is
//! read when present; otherwise token counts fall back to the word-count
//! estimate shared with the Llama path.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::{estimate_tokens, http_client, AdapterError, Invocation, ModelAdapter};
use crate::secrets::{ApiCredential, CredentialSource};

/// Environment variable for the Google API key.
pub const GOOGLE_API_KEY_ENV: &str = "GOOGLE_API_KEY";

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct VertexAdapter {
    credential: Option<ApiCredential>,
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl std::fmt::Debug for VertexAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexAdapter")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl VertexAdapter {
    /// Create from the `GOOGLE_API_KEY` environment variable.
    pub fn from_env(timeout: Duration) -> Self {
        Self {
            credential: ApiCredential::from_env(GOOGLE_API_KEY_ENV, "Google API key"),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: http_client(timeout),
            timeout,
        }
    }

    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            credential: Some(ApiCredential::new(
                api_key,
                CredentialSource::Programmatic,
                "Google API key",
            )),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: http_client(timeout),
            timeout,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl ModelAdapter for VertexAdapter {
    async fn invoke(&self, model_id: &str, prompt: &str) -> Result<Invocation, AdapterError> {
        let credential = self.credential.as_ref().ok_or_else(|| {
            AdapterError::NotConfigured(format!(
                "Google API key not set: configure {GOOGLE_API_KEY_ENV}"
            ))
        })?;

        // Callers sometimes namespace Gemini ids as "google/gemini-...".
        let clean_model_id = model_id.replace("google/", "");

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, clean_model_id
            ))
            .header("x-goog-api-key", credential.expose())
            .json(&request)
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

        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| AdapterError::Parse(e.to_string()))?;

        parse_generate_response(&body, prompt)
    }

    fn name(&self) -> &str {
        "vertex"
    }

    fn is_configured(&self) -> bool {
        self.credential.as_ref().is_some_and(|c| !c.is_empty())
    }
}

/// Join candidate text parts and read usage metadata, estimating token
/// counts when the metadata block is absent.
fn parse_generate_response(body: &JsonValue, prompt: &str) -> Result<Invocation, AdapterError> {
    let parts = body["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| AdapterError::Parse("no candidates in response".to_string()))?;

    let response_text = parts
        .iter()
        .filter_map(|p| p["text"].as_str())
        .collect::<Vec<_>>()
        .join("");

    let usage = &body["usageMetadata"];
    let (input_tokens, output_tokens) = match (
        usage["promptTokenCount"].as_u64(),
        usage["candidatesTokenCount"].as_u64(),
    ) {
        (Some(i), Some(o)) => (i as u32, o as u32),
        _ => (estimate_tokens(prompt), estimate_tokens(&response_text)),
    };

    Ok(Invocation {
        response_text,
        input_tokens,
        output_tokens,
    })
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}
