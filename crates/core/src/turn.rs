//! Turn and Conversation domain types.
//!
//! These are the core value objects that flow through the entire system:
//! the user speaks → the loop enriches and persists a Turn → the provider
//! answers → the parsed action runs → the tool result becomes the next Turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The origin of a turn.
///
/// Tool results are fed back to the model as user-origin turns, matching the
/// wire convention of the chat backends this runtime targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// The end user, or a tool result relayed on their behalf
    User,
    /// The model
    Model,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Model => "model",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(TurnRole::User),
            "model" => Some(TurnRole::Model),
            _ => None,
        }
    }
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted unit of conversation: a message, a tool result, or an
/// error record. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Position within the owning conversation. Monotonic, assigned by the
    /// store as max+1 for the conversation (single-writer assumption).
    pub sequence: i64,

    /// Who produced this turn
    pub role: TurnRole,

    /// The text content (enriched user input, raw model output, or framed
    /// tool result)
    pub content: String,

    /// Name of the tool this turn records, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    /// Parameters the tool was invoked with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_parameters: Option<BTreeMap<String, String>>,

    /// The tool's textual result or error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<String>,

    /// When this turn was created
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Create a plain user turn.
    pub fn user(sequence: i64, content: impl Into<String>) -> Self {
        Self {
            sequence,
            role: TurnRole::User,
            content: content.into(),
            tool_name: None,
            tool_parameters: None,
            tool_result: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a model turn.
    pub fn model(sequence: i64, content: impl Into<String>) -> Self {
        Self {
            sequence,
            role: TurnRole::Model,
            content: content.into(),
            tool_name: None,
            tool_parameters: None,
            tool_result: None,
            timestamp: Utc::now(),
        }
    }
}

/// Lifecycle status of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Completed,
    Archived,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Completed => "completed",
            ConversationStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ConversationStatus::Active),
            "completed" => Some(ConversationStatus::Completed),
            "archived" => Some(ConversationStatus::Archived),
            _ => None,
        }
    }
}

/// An ordered, owned sequence of turns with a lifecycle status.
///
/// Exactly one conversation per session is active at a time. Conversations
/// are completed by the completion tool and archived by retention policy;
/// they are never deleted outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub session_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- Tool-result framing ---
//
// Tool outcomes are persisted with tag framing so the metadata survives
// round-trips through plain-text storage, but the framing must never reach
// a model verbatim: it is normalized to `Tool: X / Result: Y` text first.

const FRAME_OPEN: &str = "<tool_result>";
const FRAME_CLOSE: &str = "</tool_result>";

/// Frame a successful tool result for persistence.
pub fn frame_tool_success(tool_name: &str, result: &str) -> String {
    format!("<tool_result><tool_name>{tool_name}</tool_name><result>{result}</result></tool_result>")
}

/// Frame a tool error for persistence.
pub fn frame_tool_error(tool_name: &str, error: &str) -> String {
    format!("<tool_result><tool_name>{tool_name}</tool_name><error>{error}</error></tool_result>")
}

fn extract_between<'a>(text: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = text.find(open)? + open.len();
    let end = start + text[start..].find(close)?;
    Some(&text[start..end])
}

/// Normalize tool-result framing to plain `Tool: X / Result: Y` text.
///
/// Content without framing markers is returned unchanged, which also makes
/// the normalization idempotent: normalized output contains no markers.
pub fn normalize_tool_framing(content: &str) -> String {
    if !(content.contains(FRAME_OPEN) && content.contains(FRAME_CLOSE)) {
        return content.to_string();
    }

    let Some(tool_name) = extract_between(content, "<tool_name>", "</tool_name>") else {
        return content.to_string();
    };

    if let Some(result) = extract_between(content, "<result>", "</result>") {
        return format!("Tool: {tool_name}\nResult: {result}");
    }
    if let Some(error) = extract_between(content, "<error>", "</error>") {
        return format!("Tool: {tool_name}\nError: {error}");
    }

    content.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_turn() {
        let turn = Turn::user(1, "Hello, agent!");
        assert_eq!(turn.role, TurnRole::User);
        assert_eq!(turn.content, "Hello, agent!");
        assert!(turn.tool_name.is_none());
    }

    #[test]
    fn role_roundtrip() {
        assert_eq!(TurnRole::parse("user"), Some(TurnRole::User));
        assert_eq!(TurnRole::parse("model"), Some(TurnRole::Model));
        assert_eq!(TurnRole::parse("assistant"), None);
        assert_eq!(TurnRole::Model.as_str(), "model");
    }

    #[test]
    fn status_roundtrip() {
        for status in [
            ConversationStatus::Active,
            ConversationStatus::Completed,
            ConversationStatus::Archived,
        ] {
            assert_eq!(ConversationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ConversationStatus::parse("deleted"), None);
    }

    #[test]
    fn turn_serialization_roundtrip() {
        let turn = Turn::user(3, "Test message");
        let json = serde_json::to_string(&turn).unwrap();
        let deserialized: Turn = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.content, "Test message");
        assert_eq!(deserialized.role, TurnRole::User);
        assert_eq!(deserialized.sequence, 3);
    }

    #[test]
    fn normalize_success_framing() {
        let framed = frame_tool_success("list_files", "src/\nmain.rs");
        let normalized = normalize_tool_framing(&framed);
        assert_eq!(normalized, "Tool: list_files\nResult: src/\nmain.rs");
    }

    #[test]
    fn normalize_error_framing() {
        let framed = frame_tool_error("read_file", "No such file: missing.txt");
        let normalized = normalize_tool_framing(&framed);
        assert_eq!(normalized, "Tool: read_file\nError: No such file: missing.txt");
    }

    #[test]
    fn normalize_is_idempotent() {
        let framed = frame_tool_success("execute_command", "ok");
        let once = normalize_tool_framing(&framed);
        let twice = normalize_tool_framing(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_leaves_plain_text_alone() {
        let text = "Just a user message mentioning <tool_name> casually";
        assert_eq!(normalize_tool_framing(text), text);
    }

    #[test]
    fn normalize_handles_multiline_results() {
        let framed = frame_tool_success("execute_command", "line one\nline two\nline three");
        let normalized = normalize_tool_framing(&framed);
        assert!(normalized.starts_with("Tool: execute_command\nResult: line one"));
        assert!(normalized.contains("line three"));
    }
}
