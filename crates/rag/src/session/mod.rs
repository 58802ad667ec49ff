//! Per-session message log.
//!
//! The pipeline only ever appends: a user message and the assistant reply
//! are written together once an answer exists. Citations are linked to the
//! assistant message that produced them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Citation;
use docent_core::AppResult;

pub mod memory;
pub mod sqlite;

pub use memory::InMemorySessionStore;
pub use sqlite::SqliteSessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// How an assistant message was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    /// Generation model, or `retrieval-only` when no model wrote the answer
    pub model: String,

    /// Wall-clock time spent answering, in milliseconds
    pub processing_time: u64,

    /// Relevance of the top cited passage
    pub confidence: f64,

    /// Whether the exchange reached the session store
    pub persisted: bool,
}

/// One entry in a session's message log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            citations: Vec::new(),
            metadata: None,
        }
    }

    pub fn assistant(
        content: impl Into<String>,
        citations: Vec<Citation>,
        metadata: ResponseMetadata,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            citations,
            metadata: Some(metadata),
        }
    }
}

/// Append-only session persistence.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Append a question and its answer to `session_id`, creating the
    /// session if needed. Both messages are written or neither is.
    async fn append_exchange(
        &self,
        session_id: &str,
        user: &Message,
        assistant: &Message,
    ) -> AppResult<()>;

    /// All messages of a session in append order; empty for unknown sessions.
    async fn messages(&self, session_id: &str) -> AppResult<Vec<Message>>;
}
