//! Provider selection — picks exactly one adapter at process start.
//!
//! If a preferred provider is set and configures successfully, it wins.
//! Otherwise the known adapters are tried in a fixed priority order and the
//! first that configures is used. If none configure there is no degraded
//! mode: startup fails with a configuration error.

use std::sync::Arc;

use codecrafter_config::AppConfig;
use codecrafter_core::error::ProviderError;
use codecrafter_core::provider::Provider;
use tracing::{info, warn};

use crate::gemini::GeminiProvider;
use crate::ollama::OllamaProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// Fallback priority order when no preferred provider is set (or the
/// preferred one fails to configure).
pub const PRIORITY: [&str; 8] = [
    "gemini",
    "openai",
    "groq",
    "openrouter",
    "deepseek",
    "mistral",
    "ollama",
    "xai",
];

/// Instantiate one adapter by name, failing `NotConfigured` when its
/// credentials/endpoint are absent.
async fn instantiate(name: &str, config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    match name {
        "gemini" => Ok(Arc::new(GeminiProvider::configure(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::configure(config).await?)),
        family => Ok(Arc::new(OpenAiCompatProvider::configure(family, config)?)),
    }
}

/// Select the process-wide provider handle.
///
/// The returned handle is immutable and meant to be injected into the
/// session at startup — exactly one exists per process.
pub async fn select_provider(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let preferred = config.preferred_provider.to_lowercase();

    if preferred != "auto" {
        match instantiate(&preferred, config).await {
            Ok(provider) => {
                info!(provider = %provider.name(), "Using preferred provider");
                return Ok(provider);
            }
            Err(e) => {
                warn!(provider = %preferred, error = %e, "Preferred provider not configured, falling back");
            }
        }
    }

    for name in PRIORITY {
        match instantiate(name, config).await {
            Ok(provider) => {
                info!(provider = %provider.name(), "Auto-selected provider");
                return Ok(provider);
            }
            Err(ProviderError::NotConfigured(_)) => continue,
            Err(e) => {
                warn!(provider = %name, error = %e, "Provider failed to configure");
                continue;
            }
        }
    }

    Err(ProviderError::NotConfigured(
        "No configured model backend found. Set GEMINI_API_KEY, OPENAI_API_KEY, \
         GROQ_API_KEY, OPENROUTER_API_KEY, DEEPSEEK_API_KEY, MISTRAL_API_KEY, \
         XAI_API_KEY, or run a local Ollama server."
            .into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use codecrafter_config::ProviderConfig;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    /// Serializes env-sensitive tests and clears every credential variable
    /// the adapters consult, so only config-provided keys are visible.
    fn clean_env() -> MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        let guard = LOCK.get_or_init(|| Mutex::new(())).lock().unwrap();
        for var in [
            "GEMINI_API_KEY",
            "OPENAI_API_KEY",
            "GROQ_API_KEY",
            "OPENROUTER_API_KEY",
            "DEEPSEEK_API_KEY",
            "MISTRAL_API_KEY",
            "XAI_API_KEY",
            "OLLAMA_BASE_URL",
            "OLLAMA_MODEL",
        ] {
            std::env::remove_var(var);
        }
        guard
    }

    fn config_with_key(name: &str) -> AppConfig {
        let mut config = AppConfig::default();
        config.providers.insert(
            name.into(),
            ProviderConfig {
                api_key: Some(format!("{name}-test-key")),
                api_url: None,
                default_model: None,
            },
        );
        // Point ollama at a dead port so auto-selection never latches onto a
        // developer's local server during tests.
        config.providers.insert(
            "ollama".into(),
            ProviderConfig {
                api_key: None,
                api_url: Some("http://127.0.0.1:1".into()),
                default_model: None,
            },
        );
        config
    }

    #[tokio::test]
    async fn selects_the_only_configured_adapter() {
        let _guard = clean_env();
        for name in ["gemini", "openai", "groq", "mistral", "xai"] {
            let config = config_with_key(name);
            let provider = select_provider(&config).await.unwrap();
            assert_eq!(provider.name(), name, "expected {name} to be selected");
        }
    }

    #[tokio::test]
    async fn preferred_provider_wins_over_priority_order() {
        let _guard = clean_env();
        let mut config = config_with_key("gemini");
        config.providers.insert(
            "mistral".into(),
            ProviderConfig {
                api_key: Some("mistral-test-key".into()),
                api_url: None,
                default_model: None,
            },
        );
        config.preferred_provider = "mistral".into();

        let provider = select_provider(&config).await.unwrap();
        assert_eq!(provider.name(), "mistral");
    }

    #[tokio::test]
    async fn misconfigured_preference_falls_back() {
        let _guard = clean_env();
        let mut config = config_with_key("groq");
        config.preferred_provider = "openai".into(); // no openai key anywhere

        let provider = select_provider(&config).await.unwrap();
        assert_eq!(provider.name(), "groq");
    }

    #[tokio::test]
    async fn unknown_preference_falls_back() {
        let _guard = clean_env();
        let mut config = config_with_key("deepseek");
        config.preferred_provider = "vertex".into();

        let provider = select_provider(&config).await.unwrap();
        assert_eq!(provider.name(), "deepseek");
    }

    #[tokio::test]
    async fn no_configured_provider_is_fatal() {
        let _guard = clean_env();
        let mut config = AppConfig::default();
        config.providers.insert(
            "ollama".into(),
            ProviderConfig {
                api_key: None,
                api_url: Some("http://127.0.0.1:1".into()),
                default_model: None,
            },
        );

        let err = select_provider(&config).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
        assert!(err.to_string().contains("No configured model backend"));
    }
}
