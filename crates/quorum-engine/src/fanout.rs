//! Fan-out coordination over the invocation pipeline.
//!
//! [`GovernanceEngine`] is the public entry point. It owns the adapter set,
//! pricing engine and record store, and runs one pipeline per requested
//! model concurrently. Batch mode gathers every branch before returning;
//! stream mode emits each result the moment its branch finishes, with
//! heartbeats while all branches are quiet.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::timeout;

use quorum_core::{AnalysisRequest, GovernanceLog, PricingEngine};

use crate::adapters::AdapterSet;
use crate::config::EngineConfig;
use crate::pipeline::InvocationPipeline;
use crate::store::{MemoryStore, MessageRole, RecordStore, StoreError};
use crate::stream::StreamEvent;

/// Channel depth for stream mode. Small on purpose; a slow consumer
/// applies backpressure instead of buffering every result.
const STREAM_CHANNEL_CAPACITY: usize = 32;

/// Errors surfaced by the engine before fan-out begins.
///
/// Per-model failures are not errors at this level: they come back as
/// failed [`GovernanceLog`]s. Only request-scoped setup can fail a call.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("conversation setup failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct GovernanceEngine {
    pipeline: Arc<InvocationPipeline>,
    store: Arc<dyn RecordStore>,
    config: EngineConfig,
}

impl GovernanceEngine {
    pub fn builder() -> GovernanceEngineBuilder {
        GovernanceEngineBuilder::default()
    }

    /// Analyze a query against every model in the request and return all
    /// logs at once.
    ///
    /// The conversation record and user message are created up front and
    /// shared by all branches; if that setup fails the whole call fails.
    /// After fan-out begins nothing is fatal, and the returned vector can
    /// be shorter than the request only if a branch task itself panics.
    pub async fn analyze_batch(
        &self,
        request: &AnalysisRequest,
    ) -> Result<Vec<GovernanceLog>, EngineError> {
        let conversation_id = self.open_conversation(request).await?;
        let mut branches = self.spawn_branches(request, &conversation_id);

        let mut logs = Vec::with_capacity(request.models.len());
        while let Some(joined) = branches.join_next().await {
            match joined {
                Ok(log) => logs.push(log),
                Err(e) => tracing::warn!(error = %e, "analysis branch panicked"),
            }
        }
        Ok(logs)
    }

    /// Single-model convenience over [`analyze_batch`].
    ///
    /// [`analyze_batch`]: GovernanceEngine::analyze_batch
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<Option<GovernanceLog>, EngineError> {
        let mut logs = self.analyze_batch(request).await?;
        Ok(logs.pop())
    }

    /// Analyze a query in stream mode.
    ///
    /// Returns immediately with a receiver. The aggregator task emits
    /// `Start`, then one `Result` per finished branch in completion order,
    /// with a `Ping` whenever no branch finishes within the heartbeat
    /// interval, and exactly one `Complete` at the end. A setup failure
    /// emits a single `Error` instead of `Start`. Dropping the receiver
    /// detaches the in-flight branches; they run to completion and still
    /// persist their records, but nothing more is emitted.
    pub fn analyze_stream(&self, request: AnalysisRequest) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let engine = self.clone();
        let heartbeat = self.config.heartbeat_interval;

        tokio::spawn(async move {
            let conversation_id = match engine.open_conversation(&request).await {
                Ok(id) => id,
                Err(e) => {
                    let _ = tx
                        .send(StreamEvent::Error {
                            message: e.to_string(),
                        })
                        .await;
                    return;
                }
            };

            if tx
                .send(StreamEvent::Start {
                    total: request.models.len(),
                })
                .await
                .is_err()
            {
                return;
            }

            let mut branches = engine.spawn_branches(&request, &conversation_id);
            loop {
                match timeout(heartbeat, branches.join_next()).await {
                    Ok(Some(Ok(log))) => {
                        if tx.send(StreamEvent::Result { log }).await.is_err() {
                            branches.detach_all();
                            return;
                        }
                    }
                    Ok(Some(Err(e))) => {
                        tracing::warn!(error = %e, "analysis branch panicked");
                    }
                    Ok(None) => break,
                    Err(_) => {
                        if tx.send(StreamEvent::Ping).await.is_err() {
                            branches.detach_all();
                            return;
                        }
                    }
                }
            }

            let _ = tx.send(StreamEvent::Complete).await;
        });

        rx
    }

    /// Create the shared conversation and record the user's query.
    async fn open_conversation(&self, request: &AnalysisRequest) -> Result<String, EngineError> {
        let title = conversation_title(&request.query);
        let conversation_id = self.store.create_conversation(&title).await?;
        self.store
            .add_message(&conversation_id, MessageRole::User, &request.query)
            .await?;
        tracing::debug!(
            conversation = %conversation_id,
            models = request.models.len(),
            "fan-out starting"
        );
        Ok(conversation_id)
    }

    /// Spawn one pipeline run per requested model.
    fn spawn_branches(
        &self,
        request: &AnalysisRequest,
        conversation_id: &str,
    ) -> JoinSet<GovernanceLog> {
        let mut branches = JoinSet::new();
        for model in &request.models {
            let pipeline = Arc::clone(&self.pipeline);
            let query = request.query.clone();
            let model = model.clone();
            let conversation_id = conversation_id.to_string();
            let evaluator_model = request.evaluator_model.clone();
            let governance_context = request.governance_context.clone();
            branches.spawn(async move {
                pipeline
                    .run(
                        &query,
                        &model,
                        &conversation_id,
                        &evaluator_model,
                        &governance_context,
                    )
                    .await
            });
        }
        branches
    }
}

fn conversation_title(query: &str) -> String {
    const MAX: usize = 80;
    if query.chars().count() <= MAX {
        query.to_string()
    } else {
        let truncated: String = query.chars().take(MAX).collect();
        format!("{truncated}...")
    }
}

#[derive(Default)]
pub struct GovernanceEngineBuilder {
    store: Option<Arc<dyn RecordStore>>,
    pricing: Option<Arc<PricingEngine>>,
    adapters: Option<AdapterSet>,
    config: Option<EngineConfig>,
}

impl GovernanceEngineBuilder {
    pub fn store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn pricing(mut self, pricing: Arc<PricingEngine>) -> Self {
        self.pricing = Some(pricing);
        self
    }

    pub fn adapters(mut self, adapters: AdapterSet) -> Self {
        self.adapters = Some(adapters);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Assemble the engine, filling anything unset from the environment.
    pub fn build(self) -> GovernanceEngine {
        let config = self.config.unwrap_or_default();
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn RecordStore>);
        let adapters = self
            .adapters
            .unwrap_or_else(|| AdapterSet::from_env(config.request_timeout));
        let pricing = self.pricing.unwrap_or_else(|| {
            Arc::new(match &config.rates_dir {
                Some(dir) => PricingEngine::load(dir),
                None => PricingEngine::empty(),
            })
        });
        let pipeline = Arc::new(InvocationPipeline::new(
            adapters,
            pricing,
            Arc::clone(&store),
        ));
        GovernanceEngine {
            pipeline,
            store,
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use async_trait::async_trait;

    use quorum_core::ModelConfig;

    use crate::adapters::{AdapterError, Invocation, MockAdapter, ModelAdapter};

    /// Succeeds or fails by model id so one fan-out can mix outcomes.
    struct SplitAdapter {
        name: &'static str,
        delay: Duration,
    }

    #[async_trait]
    impl ModelAdapter for SplitAdapter {
        async fn invoke(&self, model_id: &str, _prompt: &str) -> Result<Invocation, AdapterError> {
            tokio::time::sleep(self.delay).await;
            if model_id.contains("broken") {
                Err(AdapterError::Api {
                    status: 500,
                    message: "internal failure".to_string(),
                })
            } else {
                Ok(Invocation {
                    response_text: format!("answer from {model_id}"),
                    input_tokens: 10,
                    output_tokens: 5,
                })
            }
        }

        fn name(&self) -> &str {
            self.name
        }

        fn is_configured(&self) -> bool {
            true
        }
    }

    fn test_engine(delay: Duration) -> GovernanceEngine {
        let adapters = AdapterSet::new(
            Arc::new(SplitAdapter {
                name: "bedrock",
                delay,
            }),
            Arc::new(SplitAdapter {
                name: "openai",
                delay,
            }),
            Arc::new(SplitAdapter {
                name: "vertex",
                delay: Duration::ZERO,
            }),
            Arc::new(MockAdapter),
        );
        GovernanceEngine::builder()
            .adapters(adapters)
            .pricing(Arc::new(PricingEngine::empty()))
            .build()
    }

    fn two_model_request() -> AnalysisRequest {
        AnalysisRequest::new(
            "are my security groups open to the world?",
            vec![
                ModelConfig::new("aws_bedrock", "anthropic.claude-3-5-sonnet-20240620-v1:0"),
                ModelConfig::new("openai", "broken-gpt-4o"),
            ],
        )
    }

    #[tokio::test]
    async fn test_batch_mixes_success_and_failure() {
        let engine = test_engine(Duration::ZERO);
        let logs = engine.analyze_batch(&two_model_request()).await.unwrap();

        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|l| l.is_coherent()));
        let ok = logs.iter().find(|l| l.success).unwrap();
        let failed = logs.iter().find(|l| !l.success).unwrap();
        assert!(ok.response_text.contains("answer from"));
        assert!(failed.error_message.as_ref().unwrap().contains("500"));
        assert_eq!(failed.usage.total_tokens(), 0);
    }

    #[tokio::test]
    async fn test_batch_empty_models_returns_empty() {
        let engine = test_engine(Duration::ZERO);
        let request = AnalysisRequest::new("anything", vec![]);
        let logs = engine.analyze_batch(&request).await.unwrap();
        assert!(logs.is_empty());
    }

    #[tokio::test]
    async fn test_stream_event_ordering() {
        let engine = test_engine(Duration::ZERO);
        let mut rx = engine.analyze_stream(two_model_request());

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert!(matches!(events.first(), Some(StreamEvent::Start { total: 2 })));
        assert!(matches!(events.last(), Some(StreamEvent::Complete)));
        let results = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::Result { .. }))
            .count();
        assert_eq!(results, 2);
        let completes = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::Complete))
            .count();
        assert_eq!(completes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_heartbeat_while_branches_are_slow() {
        // Branches sleep 40s against a 15s heartbeat, so pings must
        // arrive before any result does.
        let engine = test_engine(Duration::from_secs(40));
        let request = AnalysisRequest::new(
            "slow question",
            vec![ModelConfig::new("aws_bedrock", "anthropic.claude-3-haiku")],
        );
        let mut rx = engine.analyze_stream(request);

        let mut pings_before_result = 0usize;
        loop {
            match rx.recv().await {
                Some(StreamEvent::Ping) => pings_before_result += 1,
                Some(StreamEvent::Result { log }) => {
                    assert!(log.success);
                    break;
                }
                Some(_) => {}
                None => panic!("stream closed before first result"),
            }
        }
        assert!(pings_before_result >= 2, "pings: {pings_before_result}");
    }

    #[tokio::test]
    async fn test_stream_receiver_drop_detaches_branches() {
        let engine = test_engine(Duration::from_millis(50));
        let mut rx = engine.analyze_stream(two_model_request());

        // Consume the start event, then walk away.
        assert!(matches!(rx.recv().await, Some(StreamEvent::Start { .. })));
        drop(rx);

        // The aggregator notices the closed channel on its next send and
        // exits without panicking anything else.
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}
