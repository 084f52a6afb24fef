//! Error types for the codecrafter domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all codecrafter operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Response parse errors ---
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed backend payload: {0}")]
    MalformedResponse(String),
}

/// Errors from the structured-response parser.
///
/// A parse failure is terminal for the turn that produced it — the loop
/// surfaces the raw model text instead of retrying a likely-identical
/// malformed generation.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("Malformed tool markup: {reason}")]
    Malformed { reason: String },
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("No active conversation")]
    NoConversation,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Missing required parameter '{parameter}' for tool {tool_name}")]
    MissingParameter { tool_name: String, parameter: String },

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name} — {reason}")]
    PermissionDenied { tool_name: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::PermissionDenied {
            tool_name: "execute_command".into(),
            reason: "command not in allowlist".into(),
        });
        assert!(err.to_string().contains("execute_command"));
        assert!(err.to_string().contains("allowlist"));
    }

    #[test]
    fn parse_error_carries_reason() {
        let err = Error::Parse(ParseError::Malformed {
            reason: "unclosed tag <command>".into(),
        });
        assert!(err.to_string().contains("unclosed tag"));
    }

    #[test]
    fn missing_parameter_names_both_sides() {
        let err = ToolError::MissingParameter {
            tool_name: "read_file".into(),
            parameter: "path".into(),
        };
        let text = err.to_string();
        assert!(text.contains("read_file"));
        assert!(text.contains("path"));
    }
}
