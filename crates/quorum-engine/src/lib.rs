//! Async runtime layer for quorum.
//!
//! This crate turns the deterministic model in `quorum-core` into a running
//! service: HTTP adapters for each provider family, a judge-model evaluator,
//! the per-model invocation pipeline, and the fan-out engine that drives
//! many models concurrently in batch or stream mode.
//!
//! The entry point is [`GovernanceEngine`], built via
//! [`GovernanceEngine::builder`]. Everything below it treats provider
//! failures as values: a model that errors, times out or is unconfigured
//! produces a failed [`quorum_core::GovernanceLog`], never a panic or an
//! aborted sibling.

pub mod adapters;
pub mod config;
pub mod evaluator;
pub mod fanout;
pub mod pipeline;
pub mod prompts;
pub mod secrets;
pub mod store;
pub mod stream;

pub use adapters::{AdapterError, AdapterSet, Invocation, ModelAdapter};
pub use config::EngineConfig;
pub use evaluator::EvaluatorRouter;
pub use fanout::{EngineError, GovernanceEngine, GovernanceEngineBuilder};
pub use pipeline::InvocationPipeline;
pub use store::{MemoryStore, MessageRole, RecordStore, StoreError, TelemetryRecord};
pub use stream::StreamEvent;
