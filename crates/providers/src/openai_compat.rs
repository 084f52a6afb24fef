//! OpenAI-compatible provider implementation.
//!
//! One adapter covers the whole `/chat/completions` family: OpenAI, Groq,
//! OpenRouter, DeepSeek, Mistral, and xAI all speak the same wire shape and
//! differ only in base URL, credential env var, and default model.

use async_trait::async_trait;
use codecrafter_config::AppConfig;
use codecrafter_core::error::ProviderError;
use codecrafter_core::provider::{ChatTurn, Completion, Provider};
use codecrafter_core::turn::TurnRole;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// An OpenAI-compatible chat-completions provider.
#[derive(Debug)]
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

/// Base URL, credential env var, and default model per known family member.
const FAMILIES: &[(&str, &str, &str, &str)] = &[
    ("openai", "https://api.openai.com/v1", "OPENAI_API_KEY", "gpt-4o-mini"),
    ("groq", "https://api.groq.com/openai/v1", "GROQ_API_KEY", "llama-3.3-70b-versatile"),
    ("openrouter", "https://openrouter.ai/api/v1", "OPENROUTER_API_KEY", "anthropic/claude-sonnet-4"),
    ("deepseek", "https://api.deepseek.com/v1", "DEEPSEEK_API_KEY", "deepseek-chat"),
    ("mistral", "https://api.mistral.ai/v1", "MISTRAL_API_KEY", "mistral-large-latest"),
    ("xai", "https://api.x.ai/v1", "XAI_API_KEY", "grok-2-latest"),
];

impl OpenAiCompatProvider {
    /// Create a provider against an explicit endpoint.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            default_model: default_model.into(),
            client,
        }
    }

    /// Configure a known family member ("openai", "groq", "openrouter",
    /// "deepseek", "mistral", "xai") from config and environment.
    ///
    /// Fails with `NotConfigured` when the family is unknown or no API key
    /// is available.
    pub fn configure(family: &str, config: &AppConfig) -> Result<Self, ProviderError> {
        let (name, default_url, env_var, default_model) = FAMILIES
            .iter()
            .find(|(name, ..)| *name == family)
            .copied()
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!("unknown provider family '{family}'"))
            })?;

        let api_key = crate::resolve_api_key(config, name, env_var)
            .ok_or_else(|| ProviderError::NotConfigured(format!("{env_var} missing")))?;

        let base_url = config
            .provider_api_url(name)
            .unwrap_or_else(|| default_url.to_string());
        let model = config
            .model_for(name)
            .unwrap_or_else(|| default_model.to_string());

        Ok(Self::new(name, base_url, api_key, model))
    }

    /// Convert generic chat turns to OpenAI messages, with the system
    /// instruction (if any) as the leading message.
    fn to_api_messages(history: &[ChatTurn], system: Option<&str>) -> Vec<ApiMessage> {
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
        messages
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
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
        let url = format!("{}/chat/completions", self.base_url);
        let model = model.unwrap_or(&self.default_model);

        let body = serde_json::json!({
            "model": model,
            "messages": Self::to_api_messages(history, system),
            "stream": false,
        });

        debug!(provider = %self.name, model = %model, turns = history.len(), "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
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

        if status == 429 {
            return Err(ProviderError::RateLimited { retry_after_secs: 5 });
        }
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(provider = %self.name, status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("{} response: {e}", self.name)))?;

        let choice = api_response.choices.into_iter().next().ok_or_else(|| {
            ProviderError::MalformedResponse("no choices in response".into())
        })?;

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
        })
    }
}

// --- OpenAI-compatible API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_trims_base_url() {
        let provider = OpenAiCompatProvider::new("openai", "https://api.openai.com/v1/", "sk", "gpt-4o-mini");
        assert_eq!(provider.base_url, "https://api.openai.com/v1");
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.default_model(), "gpt-4o-mini");
    }

    #[test]
    fn message_conversion_with_system() {
        let history = vec![ChatTurn::user("hi"), ChatTurn::model("hello")];
        let messages = OpenAiCompatProvider::to_api_messages(&history, Some("You are helpful"));
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[2].role, "assistant");
    }

    #[test]
    fn message_conversion_without_system() {
        let history = vec![ChatTurn::user("hi")];
        let messages = OpenAiCompatProvider::to_api_messages(&history, None);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
    }

    #[test]
    fn parse_completion_response() {
        let resp: ApiResponse = serde_json::from_str(
            r#"{
                "choices": [
                    {"message": {"role": "assistant", "content": "Sure thing."}}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(
            resp.choices[0].message.content.as_deref(),
            Some("Sure thing.")
        );
    }

    #[test]
    fn configure_unknown_family_fails() {
        let config = AppConfig::default();
        let err = OpenAiCompatProvider::configure("vertex", &config).unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn configure_from_config_key() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "groq".into(),
            codecrafter_config::ProviderConfig {
                api_key: Some("gsk-test".into()),
                api_url: None,
                default_model: None,
            },
        );
        let provider = OpenAiCompatProvider::configure("groq", &config).unwrap();
        assert_eq!(provider.name(), "groq");
        assert!(provider.base_url.contains("api.groq.com"));
        assert_eq!(provider.default_model(), "llama-3.3-70b-versatile");
    }

    #[test]
    fn configure_respects_url_and_model_overrides() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "openai".into(),
            codecrafter_config::ProviderConfig {
                api_key: Some("sk-test".into()),
                api_url: Some("https://proxy.example.com/v1".into()),
                default_model: Some("gpt-4o".into()),
            },
        );
        let provider = OpenAiCompatProvider::configure("openai", &config).unwrap();
        assert_eq!(provider.base_url, "https://proxy.example.com/v1");
        assert_eq!(provider.default_model(), "gpt-4o");
    }
}
