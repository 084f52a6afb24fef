//! Provider trait — the abstraction over model backends.
//!
//! A Provider knows how to send an ordered, role-tagged conversation to a
//! model backend and return the generated text. Each backend's REST/SDK wire
//! shape is adapter-internal; the loop only ever sees this contract.
//!
//! Implementations: Gemini (native), OpenAI-compatible family, Ollama.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::turn::TurnRole;

/// One role-tagged text turn as sent to a backend.
///
/// This is deliberately narrower than [`crate::turn::Turn`]: tool metadata
/// and framing never cross the provider boundary — content is normalized to
/// plain text before a `ChatTurn` is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Model,
            text: text.into(),
        }
    }
}

/// A completed generation from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// The generated text
    pub content: String,
}

/// The core Provider trait.
///
/// Every model backend implements this trait. The control loop calls
/// `generate()` without knowing which provider is live — pure polymorphism.
/// Exactly one provider instance exists per process, selected at startup and
/// injected into the session (no global singleton).
#[async_trait]
pub trait Provider: Send + Sync + std::fmt::Debug {
    /// A human-readable name for this provider (e.g., "gemini", "openai").
    fn name(&self) -> &str;

    /// The model used when the caller does not override it.
    fn default_model(&self) -> &str;

    /// Send the conversation and return the generated text.
    ///
    /// `history` is ordered oldest-first. `model` overrides the provider's
    /// default model name; `system` is an optional system instruction the
    /// adapter maps to its backend's convention.
    async fn generate(
        &self,
        history: &[ChatTurn],
        model: Option<&str>,
        system: Option<&str>,
    ) -> std::result::Result<Completion, ProviderError>;
}
