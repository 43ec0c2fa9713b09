//! Configuration management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Remote API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the assistant backend
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds (0 disables it)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

/// Where the credential is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database holding the access token
    #[serde(default = "default_token_db")]
    pub token_db: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            token_db: default_token_db(),
        }
    }
}

fn default_token_db() -> String {
    Config::data_dir()
        .join("credentials.db")
        .to_string_lossy()
        .to_string()
}

/// Chat behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Characters of the user's text kept as the thread preview
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            preview_chars: default_preview_chars(),
        }
    }
}

fn default_preview_chars() -> usize {
    80
}

impl Config {
    /// Load configuration from default location.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();

        if config_path.exists() {
            Self::from_file(&config_path.to_string_lossy())
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file.
    pub fn from_file(path: &str) -> Result<Self> {
        let expanded = expand_path(path);
        let content = std::fs::read_to_string(&expanded)
            .with_context(|| format!("failed to read config file {}", expanded))?;
        Self::from_toml(&content).with_context(|| format!("invalid config file {}", expanded))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get the default config path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("threadline")
            .join("config.toml")
    }

    /// Get the data directory for the credential database.
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("threadline")
    }

    pub fn token_db_path(&self) -> PathBuf {
        PathBuf::from(expand_path(&self.storage.token_db))
    }
}

/// Expand ~ to home directory.
fn expand_path(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().to_string();
        }
    }
    path.to_string()
}
