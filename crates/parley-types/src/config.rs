//! Global configuration types for Parley.
//!
//! `AppConfig` represents the top-level `config.toml` in the data directory.
//! Every field has a default so an empty or missing file is valid.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub writer: WriterConfig,
    #[serde(default)]
    pub token: TokenConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Generative backend endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL up to and including `models/`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Alias of the model used at startup.
    #[serde(default = "default_model")]
    pub model: String,

    /// Model alias -> backend model id. `switchModel` only accepts keys
    /// of this map.
    #[serde(default = "default_models")]
    pub models: BTreeMap<String, String>,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/models/".to_string()
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_models() -> BTreeMap<String, String> {
    [
        "gemini-1.5-flash",
        "gemini-1.5-pro",
        "gemini-2.0-flash",
        "gemini-2.0-flash-thinking-exp",
        "gemini-2.0-pro",
        "gemini-exp-1206",
    ]
    .into_iter()
    .map(|m| (m.to_string(), m.to_string()))
    .collect()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            models: default_models(),
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl BackendConfig {
    /// Backend model id for an alias, if the alias is configured.
    pub fn resolve_model(&self, alias: &str) -> Option<&str> {
        self.models.get(alias).map(String::as_str)
    }
}

/// Retry policy of the turn writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriterConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Environment variable holding the token passphrase. When unset, a
    /// random key stored in the data directory is used instead.
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
}

fn default_secret_env() -> String {
    "PARLEY_TOKEN_SECRET".to_string()
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret_env: default_secret_env(),
        }
    }
}
