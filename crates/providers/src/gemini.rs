//! Gemini native provider implementation.
//!
//! Uses the `generateContent` REST API directly:
//! - API key passed as a query parameter
//! - History as `contents` with roles `user` / `model`
//! - System prompt as top-level `systemInstruction`

use async_trait::async_trait;
use codecrafter_config::AppConfig;
use codecrafter_core::error::ProviderError;
use codecrafter_core::provider::{ChatTurn, Completion, Provider};
use codecrafter_core::turn::TurnRole;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Gemini native `generateContent` provider.
#[derive(Debug)]
pub struct GeminiProvider {
    name: String,
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    /// Build from explicit credentials (used by tests and custom wiring).
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: "gemini".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            default_model: DEFAULT_MODEL.into(),
            client,
        }
    }

    /// Override the base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the default model.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Configure from application config and environment.
    ///
    /// Fails with `NotConfigured` when no API key is available.
    pub fn configure(config: &AppConfig) -> Result<Self, ProviderError> {
        let api_key = crate::resolve_api_key(config, "gemini", "GEMINI_API_KEY")
            .ok_or_else(|| ProviderError::NotConfigured("GEMINI_API_KEY missing".into()))?;

        let mut provider = Self::new(api_key);
        if let Some(url) = config.provider_api_url("gemini") {
            provider = provider.with_base_url(url);
        }
        if let Some(model) = config.model_for("gemini") {
            provider = provider.with_default_model(model);
        }
        Ok(provider)
    }

    /// Convert generic chat turns to Gemini `contents`.
    fn to_api_contents(history: &[ChatTurn]) -> Vec<ApiContent> {
        history
            .iter()
            .map(|turn| ApiContent {
                role: match turn.role {
                    TurnRole::User => "user".into(),
                    TurnRole::Model => "model".into(),
                },
                parts: vec![ApiPart {
                    text: turn.text.clone(),
                }],
            })
            .collect()
    }

    /// Extract the generated text from a Gemini response.
    fn text_from_response(resp: ApiResponse) -> Result<String, ProviderError> {
        let candidate = resp
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("no candidates in response".into()))?;

        let text = candidate
            .content
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(ProviderError::MalformedResponse(
                "candidate contained no text parts".into(),
            ));
        }
        Ok(text)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
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
        let model = model.unwrap_or(&self.default_model);
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let mut body = serde_json::json!({
            "contents": Self::to_api_contents(history),
        });
        if let Some(system) = system {
            body["systemInstruction"] = serde_json::json!({
                "parts": [{ "text": system }]
            });
        }

        debug!(provider = "gemini", model = %model, turns = history.len(), "Sending generate request");

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

        if status == 429 {
            return Err(ProviderError::RateLimited { retry_after_secs: 5 });
        }
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid Gemini API key".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Gemini API error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("Gemini response: {e}")))?;

        Ok(Completion {
            content: Self::text_from_response(api_resp)?,
        })
    }
}

// --- Gemini API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiContent {
    role: String,
    parts: Vec<ApiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
}

#[derive(Debug, Deserialize)]
struct ApiCandidate {
    content: ApiCandidateContent,
}

#[derive(Debug, Deserialize)]
struct ApiCandidateContent {
    #[serde(default)]
    parts: Vec<ApiPart>,
}
