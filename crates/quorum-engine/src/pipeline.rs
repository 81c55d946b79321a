//! The per-model invocation pipeline.
//!
//! One run takes a (query, model config) pair end to end: adapter call,
//! timing, cost computation, judge evaluation, log assembly, persistence
//! handoff. The pipeline is the error boundary for adapter faults: no
//! error from a provider call ever escapes [`InvocationPipeline::run`],
//! so neither the fan-out coordinator nor any outer layer can be aborted
//! by a single model's failure.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use quorum_core::{
    AccuracyMetrics, GovernanceLog, InvocationStatus, ModelConfig, ModelProvider, PricingEngine,
    UsageMetrics,
};

use crate::adapters::AdapterSet;
use crate::evaluator::EvaluatorRouter;
use crate::store::{MessageRole, RecordStore, TelemetryRecord};

pub struct InvocationPipeline {
    adapters: AdapterSet,
    pricing: Arc<PricingEngine>,
    evaluator: EvaluatorRouter,
    store: Arc<dyn RecordStore>,
}

impl InvocationPipeline {
    pub fn new(
        adapters: AdapterSet,
        pricing: Arc<PricingEngine>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        let evaluator = EvaluatorRouter::new(adapters.clone());
        Self {
            adapters,
            pricing,
            evaluator,
            store,
        }
    }

    /// Run one invocation and return its fully populated log.
    ///
    /// Latency measures the adapter call only; the judge pass and
    /// persistence writes happen after the clock stops. Cost and telemetry
    /// are recorded for failed calls too, with zero tokens.
    pub async fn run(
        &self,
        query: &str,
        config: &ModelConfig,
        conversation_id: &str,
        evaluator_model: &str,
        governance_context: &str,
    ) -> GovernanceLog {
        let provider = ModelProvider::classify(&config.host_platform);
        let adapter = self.adapters.for_provider(provider);

        tracing::debug!(
            model = %config.model_id,
            platform = %config.host_platform,
            context = %governance_context,
            "starting analysis"
        );

        let started_at = Utc::now();
        let clock = Instant::now();

        let (response_text, input_tokens, output_tokens, error_message) =
            match adapter.invoke(&config.model_id, query).await {
                Ok(inv) => (inv.response_text, inv.input_tokens, inv.output_tokens, None),
                Err(e) => {
                    tracing::warn!(model = %config.model_id, error = %e, "model invocation failed");
                    (String::new(), 0, 0, Some(e.to_string()))
                }
            };

        let latency_ms = clock.elapsed().as_secs_f64() * 1000.0;
        let ended_at = Utc::now();
        let success = error_message.is_none();
        let status = if success {
            InvocationStatus::Completed
        } else {
            InvocationStatus::Failed
        };

        let usage = UsageMetrics {
            input_tokens,
            output_tokens,
            latency_ms,
        };

        let cost = self.pricing.calculate_cost(
            &config.host_platform,
            &config.model_id,
            input_tokens,
            output_tokens,
        );

        // The judge only ever sees responses that actually arrived.
        let accuracy = if success {
            self.evaluator
                .evaluate(query, &response_text, evaluator_model)
                .await
        } else {
            AccuracyMetrics::unavailable(evaluator_model, "Evaluation skipped (failed)")
        };

        let mut tags = BTreeMap::new();
        tags.insert("environment".to_string(), "dev".to_string());
        tags.insert(
            "governance_context".to_string(),
            governance_context.to_string(),
        );

        let log = GovernanceLog {
            id: Uuid::new_v4().to_string(),
            trace_id: Uuid::new_v4().to_string(),
            provider,
            model_id: config.model_id.clone(),
            started_at,
            ended_at,
            usage,
            cost,
            accuracy,
            status,
            success,
            error_message,
            tags,
            input_prompt: query.to_string(),
            response_text,
        };

        self.persist_branch(conversation_id, &log).await;

        log
    }

    /// Write the assistant message and telemetry, exactly once, after the
    /// log is fully populated. Per-branch write failures must not abort
    /// sibling branches, so they degrade to warnings here.
    async fn persist_branch(&self, conversation_id: &str, log: &GovernanceLog) {
        let message_id = match self
            .store
            .add_message(conversation_id, MessageRole::Assistant, &log.response_text)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(model = %log.model_id, error = %e, "assistant message write failed");
                return;
            }
        };

        let record = TelemetryRecord::from_log(log);
        if let Err(e) = self.store.add_telemetry(&message_id, &record).await {
            tracing::warn!(model = %log.model_id, error = %e, "telemetry write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::adapters::{AdapterError, Invocation, MockAdapter, ModelAdapter};
    use crate::store::MemoryStore;

    struct ScriptedAdapter {
        name: &'static str,
        outcome: Result<Invocation, &'static str>,
    }

    #[async_trait]
    impl ModelAdapter for ScriptedAdapter {
        async fn invoke(&self, _model_id: &str, _prompt: &str) -> Result<Invocation, AdapterError> {
            match &self.outcome {
                Ok(inv) => Ok(inv.clone()),
                Err(msg) => Err(AdapterError::Http(msg.to_string())),
            }
        }

        fn name(&self) -> &str {
            self.name
        }

        fn is_configured(&self) -> bool {
            true
        }
    }

    fn adapters_with_bedrock(outcome: Result<Invocation, &'static str>) -> AdapterSet {
        AdapterSet::new(
            Arc::new(ScriptedAdapter {
                name: "bedrock",
                outcome,
            }),
            Arc::new(ScriptedAdapter {
                name: "openai",
                outcome: Err("unused"),
            }),
            // The default judge family replies with valid verdict JSON.
            Arc::new(ScriptedAdapter {
                name: "vertex",
                outcome: Ok(Invocation {
                    response_text:
                        r#"{"score": 90, "rationale": "accurate", "query_category": "Straightforward"}"#
                            .to_string(),
                    input_tokens: 50,
                    output_tokens: 20,
                }),
            }),
            Arc::new(MockAdapter),
        )
    }

    async fn run_pipeline(
        adapters: AdapterSet,
        store: Arc<MemoryStore>,
    ) -> (GovernanceLog, String) {
        let pipeline = InvocationPipeline::new(
            adapters,
            Arc::new(PricingEngine::empty()),
            Arc::clone(&store) as Arc<dyn RecordStore>,
        );
        let conv = store.create_conversation("test").await.unwrap();
        let config = ModelConfig::new("aws_bedrock", "anthropic.claude-3-5-sonnet-20240620-v1:0");
        let log = pipeline
            .run("is my bucket public?", &config, &conv, "gemini-2.5-pro", "aws")
            .await;
        (log, conv)
    }

    #[tokio::test]
    async fn test_successful_run_is_coherent_and_persisted() {
        let store = Arc::new(MemoryStore::new());
        let adapters = adapters_with_bedrock(Ok(Invocation {
            response_text: "Buckets are private by default.".to_string(),
            input_tokens: 40,
            output_tokens: 12,
        }));
        let (log, conv) = run_pipeline(adapters, Arc::clone(&store)).await;

        assert!(log.success);
        assert_eq!(log.status, InvocationStatus::Completed);
        assert!(log.error_message.is_none());
        assert!(log.is_coherent());
        assert_eq!(log.provider, ModelProvider::Aws);
        assert_eq!(log.usage.input_tokens, 40);
        assert_eq!(log.accuracy.score, 90);
        assert_eq!(log.accuracy.evaluator_model, "gemini-2.5-pro");
        // Empty pricing engine still produces fallback-rate cost.
        assert!(log.cost.total_cost > 0.0);
        assert_eq!(
            log.cost.total_cost,
            log.cost.input_cost + log.cost.output_cost
        );

        let messages = store.messages(&conv);
        assert_eq!(messages.len(), 1); // assistant message from this branch
        let telemetry = messages[0].telemetry.as_ref().unwrap();
        assert_eq!(telemetry.accuracy_score, 90);
        assert_eq!(telemetry.governance_context, "aws");
        assert_eq!(telemetry.input_tokens, 40);
    }

    #[tokio::test]
    async fn test_failed_run_records_cost_and_skips_judge() {
        let store = Arc::new(MemoryStore::new());
        let adapters = adapters_with_bedrock(Err("throttled by provider"));
        let (log, conv) = run_pipeline(adapters, Arc::clone(&store)).await;

        assert!(!log.success);
        assert_eq!(log.status, InvocationStatus::Failed);
        assert!(log.is_coherent());
        assert!(log.error_message.as_ref().unwrap().contains("throttled"));
        assert!(log.response_text.is_empty());
        assert_eq!(log.usage.total_tokens(), 0);
        // Zero tokens price to zero cost, but the record exists.
        assert_eq!(log.cost.total_cost, 0.0);
        assert_eq!(log.accuracy.score, 0);
        assert!(log.accuracy.rationale.contains("skipped"));

        // Telemetry is still written for failed calls.
        let messages = store.messages(&conv);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].telemetry.is_some());
    }

    #[tokio::test]
    async fn test_latency_covers_adapter_call_only() {
        struct SlowJudge;

        #[async_trait]
        impl ModelAdapter for SlowJudge {
            async fn invoke(
                &self,
                _model_id: &str,
                _prompt: &str,
            ) -> Result<Invocation, AdapterError> {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(Invocation {
                    response_text: r#"{"score": 80, "rationale": "ok"}"#.to_string(),
                    input_tokens: 1,
                    output_tokens: 1,
                })
            }

            fn name(&self) -> &str {
                "vertex"
            }

            fn is_configured(&self) -> bool {
                true
            }
        }

        let store = Arc::new(MemoryStore::new());
        let adapters = AdapterSet::new(
            Arc::new(ScriptedAdapter {
                name: "bedrock",
                outcome: Ok(Invocation {
                    response_text: "fast answer".to_string(),
                    input_tokens: 1,
                    output_tokens: 1,
                }),
            }),
            Arc::new(ScriptedAdapter {
                name: "openai",
                outcome: Err("unused"),
            }),
            Arc::new(SlowJudge),
            Arc::new(MockAdapter),
        );
        let (log, _) = run_pipeline(adapters, store).await;

        // The judge slept 200ms after the clock stopped; adapter latency
        // stays well under that.
        assert!(log.success);
        assert!(log.usage.latency_ms < 150.0, "latency {}", log.usage.latency_ms);
        assert_eq!(log.accuracy.score, 80);
    }
}
