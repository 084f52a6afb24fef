//! Configuration loading, validation, and management for codecrafter.
//!
//! Loads configuration from `~/.codecrafter/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.codecrafter/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Preferred model backend. "auto" selects the first configured adapter
    /// in priority order.
    #[serde(default = "default_preferred_provider")]
    pub preferred_provider: String,

    /// Model name override applied to whichever provider is selected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Workspace / tool confinement configuration
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

fn default_preferred_provider() -> String {
    "auto".into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("preferred_provider", &self.preferred_provider)
            .field("default_model", &self.default_model)
            .field("providers", &self.providers)
            .field("memory", &self.memory)
            .field("workspace", &self.workspace)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Whether persistent memory is enabled at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// SQLite database path. Defaults to `~/.codecrafter/memory.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,

    /// Conversations untouched for this many days are archived at startup.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// Maximum turns loaded per model call.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_true() -> bool {
    true
}
fn default_retention_days() -> i64 {
    90
}
fn default_history_limit() -> usize {
    50
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database_path: None,
            retention_days: default_retention_days(),
            history_limit: default_history_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Root directory tool filesystem access is confined to.
    /// Defaults to the current working directory, computed once at startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Shell command allowlist. Empty = all commands allowed.
    #[serde(default)]
    pub allowed_commands: Vec<String>,

    /// Timeout applied to each `execute_command` invocation.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

fn default_command_timeout() -> u64 {
    120
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: None,
            allowed_commands: vec![],
            command_timeout_secs: default_command_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.codecrafter/config.toml).
    ///
    /// Environment variable overrides (highest priority):
    /// - `CODECRAFTER_PROVIDER` — preferred provider
    /// - `CODECRAFTER_MODEL` — default model
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(provider) = std::env::var("CODECRAFTER_PROVIDER") {
            config.preferred_provider = provider;
        }
        if let Ok(model) = std::env::var("CODECRAFTER_MODEL") {
            config.default_model = Some(model);
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".codecrafter")
    }

    /// The SQLite database path for persistent memory.
    pub fn memory_database_path(&self) -> PathBuf {
        self.memory
            .database_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| Self::config_dir().join("memory.db"))
    }

    /// The workspace root tool filesystem access is confined to.
    /// Computed once from config or the current working directory.
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace
            .root
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.memory.retention_days <= 0 {
            return Err(ConfigError::ValidationError(
                "memory.retention_days must be positive".into(),
            ));
        }
        if self.memory.history_limit == 0 {
            return Err(ConfigError::ValidationError(
                "memory.history_limit must be at least 1".into(),
            ));
        }
        if self.workspace.command_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "workspace.command_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The API key configured for a provider, if any.
    pub fn provider_api_key(&self, name: &str) -> Option<String> {
        self.providers.get(name).and_then(|p| p.api_key.clone())
    }

    /// The base-URL override configured for a provider, if any.
    pub fn provider_api_url(&self, name: &str) -> Option<String> {
        self.providers.get(name).and_then(|p| p.api_url.clone())
    }

    /// The model to use for a provider: the global override first, then the
    /// per-provider setting.
    pub fn model_for(&self, name: &str) -> Option<String> {
        self.default_model
            .clone()
            .or_else(|| self.providers.get(name).and_then(|p| p.default_model.clone()))
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            preferred_provider: default_preferred_provider(),
            default_model: None,
            providers: HashMap::new(),
            memory: MemoryConfig::default(),
            workspace: WorkspaceConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
