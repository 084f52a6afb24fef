//! Context enrichment — retrieved memory snippets appended to user input.
//!
//! Three independent sources are consulted before each outbound model call
//! for a fresh user turn: prior conversations, project facts, and learned
//! patterns. Non-empty blocks are concatenated in that fixed order and
//! appended to the raw input before it is persisted or sent. Retrieval is
//! best-effort: a failing or empty source contributes nothing and never
//! blocks the turn.

use codecrafter_core::memory::{ConversationStore, PatternStore, ProjectStore};
use codecrafter_core::tool::ToolInvocation;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

const CONVERSATION_LIMIT: usize = 3;
const PROJECT_LIMIT: usize = 5;
const PATTERN_LIMIT: usize = 5;

/// Tools whose successful use is worth remembering as a usage pattern.
const LEARNABLE_TOOLS: [&str; 2] = ["read_file", "list_files"];

pub struct ContextRetriever {
    conversations: Arc<dyn ConversationStore>,
    projects: Arc<dyn ProjectStore>,
    patterns: Arc<dyn PatternStore>,
    enabled: bool,
    project_name: String,
}

impl ContextRetriever {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        projects: Arc<dyn ProjectStore>,
        patterns: Arc<dyn PatternStore>,
        enabled: bool,
        project_name: impl Into<String>,
    ) -> Self {
        Self {
            conversations,
            projects,
            patterns,
            enabled,
            project_name: project_name.into(),
        }
    }

    /// Whether enrichment (and learning) is active.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Enrich raw user input with whatever the three sources return.
    /// Returns the input unchanged when disabled or nothing matches.
    pub async fn enrich(&self, input: &str) -> String {
        if !self.enabled {
            return input.to_string();
        }

        let mut blocks = Vec::new();
        if let Some(block) = self.conversation_block(input).await {
            blocks.push(block);
        }
        if let Some(block) = self.project_block(input).await {
            blocks.push(block);
        }
        if let Some(block) = self.pattern_block(input).await {
            blocks.push(block);
        }

        if blocks.is_empty() {
            return input.to_string();
        }

        debug!(blocks = blocks.len(), "Enriching user input with memory context");
        format!("{input}\n\n{}", blocks.join("\n"))
    }

    async fn conversation_block(&self, query: &str) -> Option<String> {
        let snippets = match self.conversations.search(query, CONVERSATION_LIMIT).await {
            Ok(snippets) => snippets,
            Err(e) => {
                warn!("Conversation retrieval failed: {e}");
                return None;
            }
        };
        if snippets.is_empty() {
            return None;
        }

        let mut lines = vec!["Context from earlier conversations:".to_string()];
        for snippet in snippets {
            lines.push(format!(
                "- {} ({}): {}",
                snippet.title,
                snippet.updated_at.format("%Y-%m-%d"),
                snippet.snippet
            ));
        }
        Some(lines.join("\n"))
    }

    async fn project_block(&self, query: &str) -> Option<String> {
        let facts = match self.projects.search(query, PROJECT_LIMIT).await {
            Ok(facts) => facts,
            Err(e) => {
                warn!("Project retrieval failed: {e}");
                return None;
            }
        };
        if facts.is_empty() {
            return None;
        }

        let mut lines = vec!["Known project facts:".to_string()];
        for fact in facts {
            lines.push(format!(
                "- {}/{}: {}",
                fact.project,
                fact.kind,
                summarize(&fact.data)
            ));
        }
        Some(lines.join("\n"))
    }

    async fn pattern_block(&self, query: &str) -> Option<String> {
        let patterns = match self.patterns.search(query, PATTERN_LIMIT).await {
            Ok(patterns) => patterns,
            Err(e) => {
                warn!("Pattern retrieval failed: {e}");
                return None;
            }
        };
        if patterns.is_empty() {
            return None;
        }

        let mut lines = vec!["Learned patterns:".to_string()];
        for pattern in patterns {
            lines.push(format!(
                "- {} ({} uses, {:.1} confidence)",
                pattern.key_pattern, pattern.usage_count, pattern.confidence_score
            ));
        }
        Some(lines.join("\n"))
    }

    /// Remember a successful use of a learnable tool. Best-effort.
    pub async fn record_tool_outcome(
        &self,
        tool_name: &str,
        parameters: &BTreeMap<String, String>,
        success: bool,
    ) {
        if !self.enabled || !success || !LEARNABLE_TOOLS.contains(&tool_name) {
            return;
        }
        let payload = serde_json::json!({
            "success": true,
            "project": self.project_name,
            "context": parameters,
        });
        if let Err(e) = self.patterns.learn("tool_usage", tool_name, &payload).await {
            warn!(tool = tool_name, "Failed to record tool pattern: {e}");
        }
    }

    /// Remember a failed dispatch so future turns can see what went wrong.
    /// Best-effort.
    pub async fn record_error_solution(&self, invocation: &ToolInvocation, error_text: &str) {
        if !self.enabled {
            return;
        }
        let payload = serde_json::json!({
            "tool_name": invocation.name,
            "tool_args": invocation.parameters,
            "error": error_text,
            "solution": "Tool execution failed - review parameters",
        });
        if let Err(e) = self
            .patterns
            .learn("error_solution", &invocation.name, &payload)
            .await
        {
            warn!(tool = %invocation.name, "Failed to record error pattern: {e}");
        }
    }
}

/// One-line summary of a fact payload for the context block.
fn summarize(data: &serde_json::Value) -> String {
    if let Some(obj) = data.as_object() {
        if let Some(name) = obj.get("name").and_then(|v| v.as_str()) {
            return format!("name: {name}");
        }
        if let Some(files) = obj.get("files").and_then(|v| v.as_array()) {
            return format!("{} files", files.len());
        }
    }
    let text = data.to_string();
    if text.chars().count() > 100 {
        let cut: String = text.chars().take(100).collect();
        format!("{cut}...")
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codecrafter_core::turn::TurnRole;
    use codecrafter_memory::InMemoryStore;

    fn retriever(store: Arc<InMemoryStore>, enabled: bool) -> ContextRetriever {
        ContextRetriever::new(store.clone(), store.clone(), store, enabled, "demo")
    }

    #[tokio::test]
    async fn disabled_retriever_returns_input_unchanged() {
        let store = Arc::new(InMemoryStore::new());
        store
            .save_turn(TurnRole::User, "we talked about sqlite", None, None, None)
            .await
            .unwrap();

        let retriever = retriever(store, false);
        assert_eq!(retriever.enrich("sqlite question").await, "sqlite question");
    }

    #[tokio::test]
    async fn empty_sources_contribute_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let retriever = retriever(store, true);
        assert_eq!(retriever.enrich("anything").await, "anything");
    }

    #[tokio::test]
    async fn single_matching_source_appends_one_block() {
        let store = Arc::new(InMemoryStore::new());
        store
            .save_turn(TurnRole::User, "configure the sqlite schema", None, None, None)
            .await
            .unwrap();

        let retriever = retriever(store, true);
        let enriched = retriever.enrich("sqlite").await;

        assert!(enriched.starts_with("sqlite\n\n"));
        assert_eq!(
            enriched.matches("Context from earlier conversations:").count(),
            1
        );
        assert!(!enriched.contains("Known project facts:"));
        assert!(!enriched.contains("Learned patterns:"));
    }

    #[tokio::test]
    async fn blocks_appear_in_fixed_source_order() {
        let store = Arc::new(InMemoryStore::new());
        store
            .save_turn(TurnRole::User, "the webapp deploy broke", None, None, None)
            .await
            .unwrap();
        store
            .save_fact("webapp", "project_info", &serde_json::json!({"name": "webapp"}))
            .await
            .unwrap();
        store
            .learn("tool_usage", "webapp_build", &serde_json::json!({}))
            .await
            .unwrap();

        let retriever = retriever(store, true);
        let enriched = retriever.enrich("webapp").await;

        let conv = enriched.find("Context from earlier conversations:").unwrap();
        let proj = enriched.find("Known project facts:").unwrap();
        let pat = enriched.find("Learned patterns:").unwrap();
        assert!(conv < proj && proj < pat, "blocks out of order: {enriched}");
    }

    #[tokio::test]
    async fn learnable_tool_success_is_recorded() {
        let store = Arc::new(InMemoryStore::new());
        let retriever = retriever(store.clone(), true);

        let mut params = BTreeMap::new();
        params.insert("path".to_string(), "src".to_string());
        retriever.record_tool_outcome("list_files", &params, true).await;
        retriever.record_tool_outcome("list_files", &params, true).await;
        // Failures and unlearnable tools are ignored.
        retriever.record_tool_outcome("list_files", &params, false).await;
        retriever.record_tool_outcome("execute_command", &params, true).await;

        let patterns = PatternStore::search(store.as_ref(), "list_files", 5)
            .await
            .unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].usage_count, 2);
    }

    #[tokio::test]
    async fn error_solutions_are_recorded() {
        let store = Arc::new(InMemoryStore::new());
        let retriever = retriever(store.clone(), true);

        let invocation = ToolInvocation::new("read_file").with_parameter("path", "gone.txt");
        retriever
            .record_error_solution(&invocation, "No such file")
            .await;

        let patterns = PatternStore::search(store.as_ref(), "read_file", 5)
            .await
            .unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].category, "error_solution");
        assert_eq!(patterns[0].payload["error"], "No such file");
    }

    #[test]
    fn summarize_prefers_name_then_files() {
        assert_eq!(
            summarize(&serde_json::json!({"name": "api"})),
            "name: api"
        );
        assert_eq!(
            summarize(&serde_json::json!({"files": ["a", "b"]})),
            "2 files"
        );
        assert_eq!(summarize(&serde_json::json!({"k": 1})), "{\"k\":1}");
    }
}
