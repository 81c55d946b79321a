//! Persistence collaborator interface.
//!
//! The engine consumes a [`RecordStore`] but never implements durable
//! storage itself: the relational store lives outside this crate. What is
//! defined here is the contract the pipeline and coordinator rely on, the
//! flattened [`TelemetryRecord`] shape, and an in-memory implementation
//! used by the CLI and tests.
//!
//! Failure policy: only the initiating conversation/user-message write is
//! fatal to a request; per-branch assistant-message and telemetry write
//! failures degrade to warnings so sibling branches are unaffected.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use quorum_core::{GovernanceLog, QueryCategory};

/// Errors from the persistence collaborator.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Storage backend failure: {0}")]
    Backend(String),
}

/// Role of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Flattened telemetry fields handed to persistence, one per invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub trace_id: String,
    pub governance_context: String,
    pub host_platform: String,
    pub model_id: String,
    pub latency_ms: f64,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_cost: f64,
    pub accuracy_score: i64,
    pub accuracy_rationale: Option<String>,
    pub query_category: Option<QueryCategory>,
    pub prompt_optimization: Option<String>,
}

impl TelemetryRecord {
    /// Flatten a fully populated log into the persistence shape.
    pub fn from_log(log: &GovernanceLog) -> Self {
        Self {
            trace_id: log.trace_id.clone(),
            governance_context: log
                .tags
                .get("governance_context")
                .cloned()
                .unwrap_or_else(|| "unknown".to_string()),
            host_platform: log.provider.to_string(),
            model_id: log.model_id.clone(),
            latency_ms: log.usage.latency_ms,
            input_tokens: log.usage.input_tokens,
            output_tokens: log.usage.output_tokens,
            total_cost: log.cost.total_cost,
            accuracy_score: log.accuracy.score,
            accuracy_rationale: Some(log.accuracy.rationale.clone()),
            query_category: log.accuracy.query_category,
            prompt_optimization: log.accuracy.prompt_optimization.clone(),
        }
    }
}

/// The persistence operations the engine depends on.
///
/// All calls are awaited inline by the pipeline; implementations must be
/// safe for concurrent use across fan-out branches.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create_conversation(&self, title: &str) -> Result<String, StoreError>;

    async fn add_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<String, StoreError>;

    async fn add_telemetry(
        &self,
        message_id: &str,
        record: &TelemetryRecord,
    ) -> Result<(), StoreError>;
}

/// A stored message, retained with its telemetry by [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub telemetry: Option<TelemetryRecord>,
}

#[derive(Debug, Clone)]
pub struct StoredConversation {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryState {
    conversations: HashMap<String, StoredConversation>,
    messages: HashMap<String, StoredMessage>,
}

/// In-memory store for tests and the CLI.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages in a conversation, ordered by creation time.
    pub fn messages(&self, conversation_id: &str) -> Vec<StoredMessage> {
        let state = self.state.read();
        let mut messages: Vec<StoredMessage> = state
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        messages
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<StoredConversation> {
        self.state.read().conversations.get(conversation_id).cloned()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_conversation(&self, title: &str) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.state.write().conversations.insert(
            id.clone(),
            StoredConversation {
                id: id.clone(),
                title: title.to_string(),
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn add_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<String, StoreError> {
        let mut state = self.state.write();
        if !state.conversations.contains_key(conversation_id) {
            return Err(StoreError::ConversationNotFound(conversation_id.to_string()));
        }
        let id = Uuid::new_v4().to_string();
        state.messages.insert(
            id.clone(),
            StoredMessage {
                id: id.clone(),
                conversation_id: conversation_id.to_string(),
                role,
                content: content.to_string(),
                created_at: Utc::now(),
                telemetry: None,
            },
        );
        Ok(id)
    }

    async fn add_telemetry(
        &self,
        message_id: &str,
        record: &TelemetryRecord,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let message = state
            .messages
            .get_mut(message_id)
            .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))?;
        message.telemetry = Some(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_conversation_message_telemetry_chain() {
        let store = MemoryStore::new();
        let conv = store.create_conversation("is my bucket public?").await.unwrap();
        let user = store
            .add_message(&conv, MessageRole::User, "is my bucket public?")
            .await
            .unwrap();
        let assistant = store
            .add_message(&conv, MessageRole::Assistant, "No.")
            .await
            .unwrap();

        let record = TelemetryRecord {
            trace_id: "t-1".to_string(),
            governance_context: "aws".to_string(),
            host_platform: "aws".to_string(),
            model_id: "anthropic.claude-3-5-sonnet".to_string(),
            latency_ms: 812.0,
            input_tokens: 40,
            output_tokens: 12,
            total_cost: 0.0003,
            accuracy_score: 91,
            accuracy_rationale: Some("good".to_string()),
            query_category: None,
            prompt_optimization: None,
        };
        store.add_telemetry(&assistant, &record).await.unwrap();

        let messages = store.messages(&conv);
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().any(|m| m.id == user && m.telemetry.is_none()));
        let stored = messages.iter().find(|m| m.id == assistant).unwrap();
        assert_eq!(stored.telemetry.as_ref().unwrap().accuracy_score, 91);
    }

    #[tokio::test]
    async fn test_unknown_conversation_rejected() {
        let store = MemoryStore::new();
        let err = store
            .add_message("missing", MessageRole::User, "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConversationNotFound(_)));
    }
}
