//! Tool trait, registry, and dispatcher.
//!
//! Tools are what give the agent the ability to act in the world: execute
//! shell commands, read/write files, search a tree, etc. The dispatcher
//! guarantees that every invocation yields exactly one text result or one
//! text error — no exception ever escapes to the control loop.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::ToolError;

/// The tool name the loop treats as "ask the user a clarifying question".
/// Handled by the control loop, never registered as a dispatchable tool.
pub const ASK_FOLLOWUP_QUESTION: &str = "ask_followup_question";

/// The tool name the loop treats as "the task is complete".
/// Handled by the control loop, never registered as a dispatchable tool.
pub const ATTEMPT_COMPLETION: &str = "attempt_completion";

/// Whether a tool name is reserved for the control loop.
pub fn is_reserved(name: &str) -> bool {
    name == ASK_FOLLOWUP_QUESTION || name == ATTEMPT_COMPLETION
}

/// The parsed `(name, parameters)` instruction extracted from model output.
///
/// Transient: produced by the response parser for exactly one turn and
/// consumed immediately by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub parameters: BTreeMap<String, String>,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Fetch a required parameter, with the standard error on absence.
    pub fn require<'a>(
        params: &'a BTreeMap<String, String>,
        tool_name: &str,
        key: &str,
    ) -> std::result::Result<&'a str, ToolError> {
        params
            .get(key)
            .map(|s| s.as_str())
            .ok_or_else(|| ToolError::MissingParameter {
                tool_name: tool_name.into(),
                parameter: key.into(),
            })
    }
}

/// The core Tool trait.
///
/// Each tool declares its required parameters and returns plain descriptive
/// text on success. Internal failures are typed `ToolError`s; the dispatcher
/// converts them to textual error results so the model can see and react.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "execute_command", "read_file").
    fn name(&self) -> &str;

    /// What this tool does (included in the system prompt).
    fn description(&self) -> &str;

    /// A one-line markup usage example (included in the system prompt).
    fn usage(&self) -> &str;

    /// Parameter names that must be present for dispatch to proceed.
    fn required_parameters(&self) -> &[&str];

    /// Execute the tool with the given string parameters.
    async fn run(
        &self,
        parameters: &BTreeMap<String, String>,
    ) -> std::result::Result<String, ToolError>;
}

/// The outcome of dispatching one invocation.
///
/// A tagged union of success-text vs. error-text — the dispatcher never lets
/// an error escape as an exception, matching the "always returns text"
/// contract the loop depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success(String),
    Error(String),
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success(_))
    }

    pub fn text(&self) -> &str {
        match self {
            DispatchOutcome::Success(t) | DispatchOutcome::Error(t) => t,
        }
    }
}

/// A registry of available tools, built once at startup.
///
/// Adding a tool means adding one `register` call — no runtime name
/// resolution or reflection.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    /// Reserved loop-handled names are rejected.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        debug_assert!(!is_reserved(&name), "reserved tool name: {name}");
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// List all registered tool names, sorted for stable prompt output.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Iterate tools in name order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Tool> {
        let mut tools: Vec<&dyn Tool> = self.tools.values().map(|t| t.as_ref()).collect();
        tools.sort_unstable_by_key(|t| t.name().to_string());
        tools.into_iter()
    }

    /// Execute one parsed invocation, at most once.
    ///
    /// Unknown tools, missing required parameters, and handler failures all
    /// come back as `DispatchOutcome::Error` text, never as an `Err`.
    pub async fn dispatch(&self, invocation: &ToolInvocation) -> DispatchOutcome {
        let Some(tool) = self.get(&invocation.name) else {
            return DispatchOutcome::Error(format!("Unknown tool: {}", invocation.name));
        };

        for required in tool.required_parameters() {
            if !invocation.parameters.contains_key(*required) {
                return DispatchOutcome::Error(
                    ToolError::MissingParameter {
                        tool_name: invocation.name.clone(),
                        parameter: (*required).into(),
                    }
                    .to_string(),
                );
            }
        }

        match tool.run(&invocation.parameters).await {
            Ok(output) => DispatchOutcome::Success(output),
            Err(e) => DispatchOutcome::Error(format!(
                "Error executing tool {}: {e}",
                invocation.name
            )),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn usage(&self) -> &str {
            "<echo><text>hello</text></echo>"
        }
        fn required_parameters(&self) -> &[&str] {
            &["text"]
        }
        async fn run(
            &self,
            parameters: &BTreeMap<String, String>,
        ) -> std::result::Result<String, ToolError> {
            Ok(parameters.get("text").cloned().unwrap_or_default())
        }
    }

    /// A tool whose handler always fails internally.
    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "failing"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn usage(&self) -> &str {
            "<failing></failing>"
        }
        fn required_parameters(&self) -> &[&str] {
            &[]
        }
        async fn run(
            &self,
            _parameters: &BTreeMap<String, String>,
        ) -> std::result::Result<String, ToolError> {
            Err(ToolError::ExecutionFailed {
                tool_name: "failing".into(),
                reason: "disk on fire".into(),
            })
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn reserved_names() {
        assert!(is_reserved(ASK_FOLLOWUP_QUESTION));
        assert!(is_reserved(ATTEMPT_COMPLETION));
        assert!(!is_reserved("execute_command"));
    }

    #[tokio::test]
    async fn dispatch_success() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let invocation = ToolInvocation::new("echo").with_parameter("text", "hello world");
        let outcome = registry.dispatch(&invocation).await;
        assert_eq!(outcome, DispatchOutcome::Success("hello world".into()));
    }

    #[tokio::test]
    async fn dispatch_unknown_tool_is_textual_error() {
        let registry = ToolRegistry::new();
        let invocation = ToolInvocation::new("nonexistent");
        let outcome = registry.dispatch(&invocation).await;
        assert!(!outcome.is_success());
        assert!(outcome.text().contains("Unknown tool"));
    }

    #[tokio::test]
    async fn dispatch_missing_parameter_is_textual_error() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let invocation = ToolInvocation::new("echo"); // no "text"
        let outcome = registry.dispatch(&invocation).await;
        assert!(!outcome.is_success());
        assert!(outcome.text().contains("text"));
    }

    #[tokio::test]
    async fn dispatch_handler_failure_is_textual_error() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(FailingTool));

        let invocation = ToolInvocation::new("failing");
        let outcome = registry.dispatch(&invocation).await;
        assert!(!outcome.is_success());
        assert!(outcome.text().contains("disk on fire"));
    }

    #[tokio::test]
    async fn extra_parameters_pass_through() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let invocation = ToolInvocation::new("echo")
            .with_parameter("text", "hi")
            .with_parameter("unexpected", "ignored");
        let outcome = registry.dispatch(&invocation).await;
        assert!(outcome.is_success());
    }

    #[test]
    fn names_are_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(FailingTool));
        registry.register(Box::new(EchoTool));
        assert_eq!(registry.names(), vec!["echo", "failing"]);
    }
}
