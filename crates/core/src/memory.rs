//! Memory repository traits — the narrow interface over persistent storage.
//!
//! The control loop treats memory as a service boundary: save a turn, fetch
//! ordered history, search for relevant snippets. Persistence format, joins,
//! and schema are an implementation concern behind these traits.
//!
//! Three independent retrieval sources feed context enrichment:
//! prior conversations, project facts, and learned patterns. Every method is
//! best-effort from the loop's perspective — a failing store degrades to
//! "no enrichment" / "no persistence for this turn", never a halted loop.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::MemoryError;
use crate::turn::{Turn, TurnRole};

/// The result of starting a conversation.
///
/// Creation returns the id alongside the human-readable message so callers
/// never have to parse an id back out of formatted text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConversation {
    pub id: i64,
    pub message: String,
}

/// A ranked snippet from a prior conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSnippet {
    pub conversation_id: i64,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub snippet: String,
}

/// A stored fact about a project (file structure, conventions, preferences).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectFact {
    pub project: String,
    pub kind: String,
    pub data: serde_json::Value,
    pub last_accessed: DateTime<Utc>,
}

/// A learned pattern: reinforced on repeated observation, otherwise inert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub category: String,
    pub key_pattern: String,
    pub payload: serde_json::Value,
    pub confidence_score: f64,
    pub usage_count: i64,
    pub last_used: DateTime<Utc>,
}

/// Persistent conversation + turn storage.
///
/// Implementations lazily create the active conversation on the first saved
/// turn. Exactly one conversation per session is active at a time.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Start a new active conversation, returning its id.
    async fn begin(&self, title: &str) -> std::result::Result<NewConversation, MemoryError>;

    /// Append a turn to the active conversation (creating it if needed).
    /// Returns the assigned sequence number.
    async fn save_turn(
        &self,
        role: TurnRole,
        content: &str,
        tool_name: Option<&str>,
        tool_parameters: Option<&BTreeMap<String, String>>,
        tool_result: Option<&str>,
    ) -> std::result::Result<i64, MemoryError>;

    /// Ordered turns of the active conversation, oldest first, with
    /// tool-result framing normalized to plain text.
    async fn history(&self, limit: usize) -> std::result::Result<Vec<Turn>, MemoryError>;

    /// Search prior conversations by content, most recently updated first.
    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> std::result::Result<Vec<ConversationSnippet>, MemoryError>;

    /// Mark the active conversation completed with a summary. The next saved
    /// turn starts a fresh conversation.
    async fn complete(&self, summary: &str) -> std::result::Result<(), MemoryError>;

    /// Archive conversations not updated within the retention window.
    /// Returns the number of conversations archived.
    async fn archive_older_than(&self, days: i64) -> std::result::Result<u64, MemoryError>;
}

/// Project-fact storage, keyed by (project, kind).
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Insert or refresh a fact.
    async fn save_fact(
        &self,
        project: &str,
        kind: &str,
        data: &serde_json::Value,
    ) -> std::result::Result<(), MemoryError>;

    /// Search facts across projects by content relevance.
    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> std::result::Result<Vec<ProjectFact>, MemoryError>;
}

/// Learned-pattern storage with reinforcement semantics.
#[async_trait]
pub trait PatternStore: Send + Sync {
    /// Learn a new pattern or reinforce an existing (category, pattern) pair:
    /// usage_count += 1, confidence += 0.1 capped at 1.0.
    async fn learn(
        &self,
        category: &str,
        pattern: &str,
        payload: &serde_json::Value,
    ) -> std::result::Result<(), MemoryError>;

    /// Search patterns by key relevance, ranked by confidence then usage.
    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> std::result::Result<Vec<LearnedPattern>, MemoryError>;
}
