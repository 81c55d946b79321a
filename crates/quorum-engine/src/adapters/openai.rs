//! OpenAI chat-completions adapter.
//!
//! Single user turn at temperature 0.7; usage counters come straight from
//! the response envelope, so no estimation is ever needed here.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{http_client, AdapterError, Invocation, ModelAdapter};
use crate::secrets::{ApiCredential, CredentialSource};

/// Environment variable for the OpenAI API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const TEMPERATURE: f64 = 0.7;

pub struct OpenAiAdapter {
    credential: Option<ApiCredential>,
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl std::fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiAdapter {
    /// Create from the `OPENAI_API_KEY` environment variable.
    pub fn from_env(timeout: Duration) -> Self {
        Self {
            credential: ApiCredential::from_env(OPENAI_API_KEY_ENV, "OpenAI API key"),
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
                "OpenAI API key",
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
impl ModelAdapter for OpenAiAdapter {
    async fn invoke(&self, model_id: &str, prompt: &str) -> Result<Invocation, AdapterError> {
        let credential = self.credential.as_ref().ok_or_else(|| {
            AdapterError::NotConfigured(format!(
                "OpenAI API key not set: configure {OPENAI_API_KEY_ENV}"
            ))
        })?;

        let request = ChatRequest {
            model: model_id,
            messages: vec![ChatRequestMessage {
                role: "user",
                content: prompt,
            }],
            temperature: TEMPERATURE,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(credential.expose())
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

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Parse(e.to_string()))?;

        let response_text = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AdapterError::Parse("empty choices array".to_string()))?;

        Ok(Invocation {
            response_text,
            input_tokens: body.usage.prompt_tokens,
            output_tokens: body.usage.completion_tokens,
        })
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn is_configured(&self) -> bool {
        self.credential.as_ref().is_some_and(|c| !c.is_empty())
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatRequestMessage<'a>>,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatRequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: ChatUsage,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
