//! Configuration management for chatquota
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//!
//! Precedence, lowest first: built-in defaults, the YAML file,
//! `CHATQUOTA_*` environment variables, command-line flags.

use crate::error::{ChatQuotaError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Main configuration structure for chatquota
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Signed-in user settings
    #[serde(default)]
    pub user: UserConfig,
    /// Local storage settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Quota settings
    #[serde(default)]
    pub quota: QuotaConfig,
    /// Subscription backend settings
    #[serde(default)]
    pub subscription: SubscriptionConfig,
    /// Visibility refresh settings
    #[serde(default)]
    pub refresh: RefreshConfig,
    /// Chat completion settings
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Signed-in user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    /// Id the quota and subscription are tracked under
    #[serde(default = "default_user_id")]
    pub id: String,
}

fn default_user_id() -> String {
    "local".to_string()
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            id: default_user_id(),
        }
    }
}

/// Local storage
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// SQLite file; the platform data directory is used when unset
    #[serde(default)]
    pub path: Option<String>,
}

/// Quota settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Monthly message limit when no paid plan is active
    #[serde(default = "default_free_tier_limit")]
    pub free_tier_limit: u32,
}

fn default_free_tier_limit() -> u32 {
    10
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            free_tier_limit: default_free_tier_limit(),
        }
    }
}

/// Subscription backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Base URL of the subscription API
    #[serde(default = "default_subscription_api_base")]
    pub api_base: String,
    /// Request timeout in seconds
    #[serde(default = "default_subscription_timeout")]
    pub timeout_seconds: u64,
    /// Bearer token, if the backend requires one
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_subscription_api_base() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_subscription_timeout() -> u64 {
    10
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            api_base: default_subscription_api_base(),
            timeout_seconds: default_subscription_timeout(),
            api_key: None,
        }
    }
}

impl SubscriptionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Visibility refresh settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Delay between returning to the foreground and refreshing
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    300
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl RefreshConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Chat completion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_chat_api_base")]
    pub api_base: String,
    /// Model to request
    #[serde(default = "default_chat_model")]
    pub model: String,
    /// Request timeout in seconds
    #[serde(default = "default_chat_timeout")]
    pub timeout_seconds: u64,
    /// Bearer token, if the API requires one
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_chat_api_base() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_chat_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_chat_timeout() -> u64 {
    120
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_base: default_chat_api_base(),
            model: default_chat_model(),
            timeout_seconds: default_chat_timeout(),
            api_key: None,
        }
    }
}

impl ChatConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::debug!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ChatQuotaError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ChatQuotaError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(user_id) = std::env::var("CHATQUOTA_USER_ID") {
            self.user.id = user_id;
        }

        if let Ok(limit) = std::env::var("CHATQUOTA_FREE_TIER_LIMIT") {
            if let Ok(value) = limit.parse() {
                self.quota.free_tier_limit = value;
            } else {
                tracing::warn!("Invalid CHATQUOTA_FREE_TIER_LIMIT: {}", limit);
            }
        }

        if let Ok(api_base) = std::env::var("CHATQUOTA_SUBSCRIPTION_API_BASE") {
            self.subscription.api_base = api_base;
        }

        if let Ok(api_key) = std::env::var("CHATQUOTA_SUBSCRIPTION_API_KEY") {
            self.subscription.api_key = Some(api_key);
        }

        if let Ok(timeout) = std::env::var("CHATQUOTA_SUBSCRIPTION_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.subscription.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid CHATQUOTA_SUBSCRIPTION_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(debounce) = std::env::var("CHATQUOTA_REFRESH_DEBOUNCE_MS") {
            if let Ok(value) = debounce.parse() {
                self.refresh.debounce_ms = value;
            } else {
                tracing::warn!("Invalid CHATQUOTA_REFRESH_DEBOUNCE_MS: {}", debounce);
            }
        }

        if let Ok(api_base) = std::env::var("CHATQUOTA_CHAT_API_BASE") {
            self.chat.api_base = api_base;
        }

        if let Ok(model) = std::env::var("CHATQUOTA_CHAT_MODEL") {
            self.chat.model = model;
        }

        if let Ok(api_key) = std::env::var("CHATQUOTA_CHAT_API_KEY") {
            self.chat.api_key = Some(api_key);
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(user) = &cli.user {
            self.user.id = user.clone();
        }
        if let Some(path) = &cli.storage_path {
            tracing::debug!("Using storage path override from CLI: {}", path);
            self.storage.path = Some(path.clone());
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns `ChatQuotaError::Config` describing the first invalid field
    pub fn validate(&self) -> Result<()> {
        if self.user.id.trim().is_empty() {
            return Err(ChatQuotaError::Config("user.id cannot be empty".to_string()).into());
        }

        validate_http_url("subscription.api_base", &self.subscription.api_base)?;
        validate_http_url("chat.api_base", &self.chat.api_base)?;

        if self.subscription.timeout_seconds == 0 {
            return Err(ChatQuotaError::Config(
                "subscription.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.timeout_seconds == 0 {
            return Err(ChatQuotaError::Config(
                "chat.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.model.trim().is_empty() {
            return Err(ChatQuotaError::Config("chat.model cannot be empty".to_string()).into());
        }

        if self.refresh.debounce_ms > 60_000 {
            return Err(ChatQuotaError::Config(
                "refresh.debounce_ms must be at most 60000".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

fn validate_http_url(field: &str, value: &str) -> Result<()> {
    let url = Url::parse(value)
        .map_err(|e| ChatQuotaError::Config(format!("{} is not a valid URL: {}", field, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ChatQuotaError::Config(format!(
            "{} must use http or https, got '{}'",
            field,
            url.scheme()
        ))
        .into());
    }
    Ok(())
}
