//! In-memory store — backs tests and memory-disabled sessions.
//!
//! Implements the same three repository traits as the SQLite backend with a
//! plain `Vec` behind an `RwLock`, and the same lazy-conversation, sequence,
//! and normalization semantics.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use codecrafter_core::error::MemoryError;
use codecrafter_core::memory::{
    ConversationSnippet, ConversationStore, LearnedPattern, NewConversation, PatternStore,
    ProjectFact, ProjectStore,
};
use codecrafter_core::turn::{normalize_tool_framing, Conversation, ConversationStatus, Turn, TurnRole};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct State {
    next_conversation_id: i64,
    active: Option<i64>,
    conversations: Vec<Conversation>,
    /// (conversation_id, raw turn) — content stored unnormalized, like disk.
    turns: Vec<(i64, Turn)>,
    facts: Vec<ProjectFact>,
    patterns: Vec<LearnedPattern>,
}

/// A Vec-backed implementation of all three memory traits.
pub struct InMemoryStore {
    session_id: String,
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            state: RwLock::new(State::default()),
        }
    }

    fn insert_conversation(state: &mut State, session_id: &str, title: &str) -> i64 {
        state.next_conversation_id += 1;
        let id = state.next_conversation_id;
        let now = Utc::now();
        state.conversations.push(Conversation {
            id,
            session_id: session_id.into(),
            title: title.into(),
            summary: None,
            status: ConversationStatus::Active,
            created_at: now,
            updated_at: now,
        });
        state.active = Some(id);
        id
    }

    fn ensure_active(state: &mut State, session_id: &str) -> i64 {
        if let Some(id) = state.active {
            return id;
        }
        let title = format!("Conversation {}", Utc::now().format("%Y-%m-%d %H:%M"));
        Self::insert_conversation(state, session_id, &title)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn begin(&self, title: &str) -> Result<NewConversation, MemoryError> {
        let mut state = self.state.write().await;
        let id = Self::insert_conversation(&mut state, &self.session_id, title);
        Ok(NewConversation {
            id,
            message: format!("Started conversation '{title}'"),
        })
    }

    async fn save_turn(
        &self,
        role: TurnRole,
        content: &str,
        tool_name: Option<&str>,
        tool_parameters: Option<&BTreeMap<String, String>>,
        tool_result: Option<&str>,
    ) -> Result<i64, MemoryError> {
        let mut state = self.state.write().await;
        let conversation_id = Self::ensure_active(&mut state, &self.session_id);

        let sequence = state
            .turns
            .iter()
            .filter(|(cid, _)| *cid == conversation_id)
            .map(|(_, t)| t.sequence)
            .max()
            .unwrap_or(0)
            + 1;

        state.turns.push((
            conversation_id,
            Turn {
                sequence,
                role,
                content: content.into(),
                tool_name: tool_name.map(Into::into),
                tool_parameters: tool_parameters.cloned(),
                tool_result: tool_result.map(Into::into),
                timestamp: Utc::now(),
            },
        ));

        if let Some(conv) = state
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        {
            conv.updated_at = Utc::now();
        }

        Ok(sequence)
    }

    async fn history(&self, limit: usize) -> Result<Vec<Turn>, MemoryError> {
        let state = self.state.read().await;
        let Some(conversation_id) = state.active else {
            return Ok(Vec::new());
        };

        let mut turns: Vec<Turn> = state
            .turns
            .iter()
            .filter(|(cid, _)| *cid == conversation_id)
            .map(|(_, t)| {
                let mut turn = t.clone();
                turn.content = normalize_tool_framing(&turn.content);
                turn
            })
            .collect();
        turns.sort_by_key(|t| t.sequence);
        turns.truncate(limit);
        Ok(turns)
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ConversationSnippet>, MemoryError> {
        let state = self.state.read().await;
        let needle = query.to_lowercase();

        let mut hits: Vec<ConversationSnippet> = state
            .conversations
            .iter()
            .filter_map(|conv| {
                let matched = state
                    .turns
                    .iter()
                    .find(|(cid, t)| *cid == conv.id && t.content.to_lowercase().contains(&needle))?;
                let normalized = normalize_tool_framing(&matched.1.content);
                let snippet: String = normalized.chars().take(200).collect();
                Some(ConversationSnippet {
                    conversation_id: conv.id,
                    title: conv.title.clone(),
                    updated_at: conv.updated_at,
                    snippet,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn complete(&self, summary: &str) -> Result<(), MemoryError> {
        let mut state = self.state.write().await;
        let Some(conversation_id) = state.active else {
            return Err(MemoryError::NoConversation);
        };

        if let Some(conv) = state
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        {
            conv.status = ConversationStatus::Completed;
            conv.summary = Some(summary.into());
            conv.updated_at = Utc::now();
        }
        state.active = None;
        Ok(())
    }

    async fn archive_older_than(&self, days: i64) -> Result<u64, MemoryError> {
        let mut state = self.state.write().await;
        let cutoff = Utc::now() - Duration::days(days);
        let mut archived = 0;
        for conv in &mut state.conversations {
            if conv.status != ConversationStatus::Archived && conv.updated_at < cutoff {
                conv.status = ConversationStatus::Archived;
                archived += 1;
            }
        }
        Ok(archived)
    }
}

#[async_trait]
impl ProjectStore for InMemoryStore {
    async fn save_fact(
        &self,
        project: &str,
        kind: &str,
        data: &serde_json::Value,
    ) -> Result<(), MemoryError> {
        let mut state = self.state.write().await;
        if let Some(fact) = state
            .facts
            .iter_mut()
            .find(|f| f.project == project && f.kind == kind)
        {
            fact.data = data.clone();
            fact.last_accessed = Utc::now();
        } else {
            state.facts.push(ProjectFact {
                project: project.into(),
                kind: kind.into(),
                data: data.clone(),
                last_accessed: Utc::now(),
            });
        }
        Ok(())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ProjectFact>, MemoryError> {
        let state = self.state.read().await;
        let needle = query.to_lowercase();

        let mut hits: Vec<ProjectFact> = state
            .facts
            .iter()
            .filter(|f| {
                f.project.to_lowercase().contains(&needle)
                    || f.kind.to_lowercase().contains(&needle)
                    || f.data.to_string().to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();

        hits.sort_by(|a, b| b.last_accessed.cmp(&a.last_accessed));
        hits.truncate(limit);
        Ok(hits)
    }
}

#[async_trait]
impl PatternStore for InMemoryStore {
    async fn learn(
        &self,
        category: &str,
        pattern: &str,
        payload: &serde_json::Value,
    ) -> Result<(), MemoryError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .patterns
            .iter_mut()
            .find(|p| p.category == category && p.key_pattern == pattern)
        {
            existing.usage_count += 1;
            existing.confidence_score = (existing.confidence_score + 0.1).min(1.0);
            existing.payload = payload.clone();
            existing.last_used = Utc::now();
        } else {
            state.patterns.push(LearnedPattern {
                category: category.into(),
                key_pattern: pattern.into(),
                payload: payload.clone(),
                confidence_score: 1.0,
                usage_count: 1,
                last_used: Utc::now(),
            });
        }
        Ok(())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<LearnedPattern>, MemoryError> {
        let state = self.state.read().await;
        let needle = query.to_lowercase();

        let mut hits: Vec<LearnedPattern> = state
            .patterns
            .iter()
            .filter(|p| p.key_pattern.to_lowercase().contains(&needle))
            .cloned()
            .collect();

        hits.sort_by(|a, b| {
            b.confidence_score
                .partial_cmp(&a.confidence_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.usage_count.cmp(&a.usage_count))
        });
        hits.truncate(limit);
        Ok(hits)
    }
}
