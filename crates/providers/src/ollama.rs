//! Ollama native provider implementation.
//!
//! Talks to a local Ollama server via `/api/chat`. No API key; instead,
//! configuration verifies the server is actually reachable so the selector
//! does not pick a dead endpoint.

use async_trait::async_trait;
use codecrafter_config::AppConfig;
use codecrafter_core::error::ProviderError;
use codecrafter_core::provider::{ChatTurn, Completion, Provider};
use codecrafter_core::turn::TurnRole;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3:8b";

/// Local Ollama chat provider.
#[derive(Debug)]
pub struct OllamaProvider {
    name: String,
    base_url: String,
    default_model: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    /// Build against an explicit base URL without a reachability check.
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: "ollama".into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_model: DEFAULT_MODEL.into(),
            client,
        }
    }

    /// Override the default model.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Configure from application config and environment, verifying the
    /// server answers. Fails with `NotConfigured` when it does not.
    pub async fn configure(config: &AppConfig) -> Result<Self, ProviderError> {
        let base_url = config
            .provider_api_url("ollama")
            .or_else(|| std::env::var("OLLAMA_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.into());

        let mut provider = Self::new(base_url);
        if let Some(model) = config.model_for("ollama") {
            provider = provider.with_default_model(model);
        } else if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            provider = provider.with_default_model(model);
        }

        // Reachability probe with a short timeout, so auto-selection moves on
        // quickly when no local server is running.
        let probe = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(2))
            .build()
            .expect("Failed to create HTTP client");
        probe
            .get(format!("{}/", provider.base_url))
            .send()
            .await
            .map_err(|e| {
                ProviderError::NotConfigured(format!(
                    "Cannot connect to Ollama at {}: {e}",
                    provider.base_url
                ))
            })?;

        Ok(provider)
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn generate(
        &self,
        history: &[ChatTurn],
        model: Option<&str>,
        system: Option<&str>,
    ) -> Result<Completion, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let model = model.unwrap_or(&self.default_model);

        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(system) = system {
            messages.push(ApiMessage {
                role: "system".into(),
                content: system.into(),
            });
        }
        for turn in history {
            messages.push(ApiMessage {
                role: match turn.role {
                    TurnRole::User => "user".into(),
                    TurnRole::Model => "assistant".into(),
                },
                content: turn.text.clone(),
            });
        }

        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": false,
        });

        debug!(provider = "ollama", model = %model, turns = history.len(), "Sending chat request");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Ollama API error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("Ollama response: {e}")))?;

        Ok(Completion {
            content: api_resp.message.content,
        })
    }
}

// --- Ollama API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ApiResponseMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_defaults() {
        let provider = OllamaProvider::new("http://localhost:11434/");
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.base_url, "http://localhost:11434");
        assert_eq!(provider.default_model(), DEFAULT_MODEL);
    }

    #[test]
    fn model_override() {
        let provider = OllamaProvider::new(DEFAULT_BASE_URL).with_default_model("qwen2.5-coder:7b");
        assert_eq!(provider.default_model(), "qwen2.5-coder:7b");
    }

    #[test]
    fn parse_chat_response() {
        let resp: ApiResponse = serde_json::from_str(
            r#"{"model": "llama3:8b", "message": {"role": "assistant", "content": "hi"}, "done": true}"#,
        )
        .unwrap();
        assert_eq!(resp.message.content, "hi");
    }

    #[tokio::test]
    async fn configure_fails_without_server() {
        // Port 1 is never an Ollama server.
        let mut config = AppConfig::default();
        config.providers.insert(
            "ollama".into(),
            codecrafter_config::ProviderConfig {
                api_key: None,
                api_url: Some("http://127.0.0.1:1".into()),
                default_model: None,
            },
        );
        let err = OllamaProvider::configure(&config).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
