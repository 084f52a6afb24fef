//! Model-backend adapters for codecrafter.
//!
//! All adapters implement the `codecrafter_core::Provider` trait. The
//! selector picks exactly one at process start: the preferred provider if it
//! configures, otherwise the first adapter in priority order that does.

pub mod gemini;
pub mod ollama;
pub mod openai_compat;
pub mod selector;

pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use selector::{select_provider, PRIORITY};

use codecrafter_config::AppConfig;

/// Resolve an API key for a provider: config first, then environment.
pub(crate) fn resolve_api_key(config: &AppConfig, provider: &str, env_var: &str) -> Option<String> {
    config
        .provider_api_key(provider)
        .or_else(|| std::env::var(env_var).ok())
        .filter(|k| !k.is_empty())
}
