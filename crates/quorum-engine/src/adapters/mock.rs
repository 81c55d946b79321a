//! Mock adapter for unrecognized providers.
//!
//! Exists so provider dispatch is a total function: any host platform the
//! classifier cannot place still produces a well-formed invocation instead
//! of an error. Returns a fixed placeholder after a short simulated delay.

use std::time::Duration;

use async_trait::async_trait;

use super::{AdapterError, Invocation, ModelAdapter};

const SIMULATED_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
pub struct MockAdapter;

#[async_trait]
impl ModelAdapter for MockAdapter {
    async fn invoke(&self, model_id: &str, _prompt: &str) -> Result<Invocation, AdapterError> {
        tokio::time::sleep(SIMULATED_DELAY).await;
        Ok(Invocation {
            response_text: format!("Mock response from {model_id}"),
            input_tokens: 5,
            output_tokens: 5,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn is_configured(&self) -> bool {
        true
    }
}
