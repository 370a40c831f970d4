//! Configuration loading, validation, and defaults for Hearth.
//!
//! Loads `~/.hearth/config.toml` with `HEARTH_*` environment variable
//! overrides. Every field has a working default so a missing file is
//! not an error — `hearth serve` against a stock local Ollama needs no
//! config at all.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Error raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config file: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The root configuration structure.
///
/// Maps directly to `~/.hearth/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model backend settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Default model for chat requests that don't name one.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Optional system prompt prepended to every conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Maximum reasoning iterations per request.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Gateway HTTP server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Message store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Tool sandboxing settings.
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the Ollama server.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Shell commands the agent may run. Empty = allow all.
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,

    /// Roots the file tools may touch. Empty = allow all.
    #[serde(default)]
    pub allowed_roots: Vec<String>,

    /// Path prefixes the file tools must never touch.
    #[serde(default = "default_forbidden_paths")]
    pub forbidden_paths: Vec<String>,
}

fn default_model() -> String {
    "qwen3:8b".into()
}

fn default_max_iterations() -> u32 {
    10
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8787
}

fn default_db_path() -> String {
    home_dir()
        .join(".hearth")
        .join("hearth.db")
        .to_string_lossy()
        .to_string()
}

fn default_allowed_commands() -> Vec<String> {
    [
        "ls", "cat", "head", "tail", "echo", "pwd", "date", "whoami", "wc", "grep", "find",
        "which", "git", "cargo", "rustc",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_forbidden_paths() -> Vec<String> {
    [
        "~/.ssh",
        "~/.gnupg",
        "~/.aws",
        "/etc/shadow",
        "/etc/passwd",
        "/etc/sudoers",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            default_model: default_model(),
            system_prompt: None,
            max_iterations: default_max_iterations(),
            gateway: GatewayConfig::default(),
            store: StoreConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            allowed_commands: default_allowed_commands(),
            allowed_roots: Vec::new(),
            forbidden_paths: default_forbidden_paths(),
        }
    }
}

impl AppConfig {
    /// The default config file location: `~/.hearth/config.toml`.
    pub fn default_path() -> PathBuf {
        home_dir().join(".hearth").join("config.toml")
    }

    /// Load configuration from the default location.
    ///
    /// A missing file yields defaults; a present-but-broken file is an
    /// error. Environment overrides are applied either way.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
                path: path.to_string_lossy().to_string(),
                reason: e.to_string(),
            })?;
            toml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `HEARTH_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("HEARTH_BASE_URL") {
            self.backend.base_url = url;
        }
        if let Ok(model) = std::env::var("HEARTH_MODEL") {
            self.default_model = model;
        }
        if let Ok(port) = std::env::var("HEARTH_PORT")
            && let Ok(port) = port.parse()
        {
            self.gateway.port = port;
        }
        if let Ok(db) = std::env::var("HEARTH_DB") {
            self.store.path = db;
        }
    }

    /// Validate settings the rest of the system assumes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_model.trim().is_empty() {
            return Err(ConfigError::Invalid("default_model must not be empty".into()));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "max_iterations must be greater than zero".into(),
            ));
        }
        if self.gateway.port == 0 {
            return Err(ConfigError::Invalid("gateway.port must not be zero".into()));
        }
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "backend.base_url must not be empty".into(),
            ));
        }
        Ok(())
    }
}
