//! Agent orchestration for codecrafter.
//!
//! This crate holds the pieces between raw model text and executed tools:
//! - `parser` — extracts `(thinking, tool, parameters)` from model output
//! - `prompt` — builds the system prompt from the tool registry
//! - `context` — enriches user input with retrieved memory snippets
//! - `session` — the control loop / state machine driving it all

pub mod context;
pub mod parser;
pub mod prompt;
pub mod session;

pub use context::ContextRetriever;
pub use parser::{parse_response, ParsedResponse};
pub use prompt::system_prompt;
pub use session::{AgentError, LoopState, Session, SessionOptions, TurnOutcome};
