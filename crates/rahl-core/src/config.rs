//! Configuration management for Rahl.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RahlError, Result};
use crate::provider::ProviderConfig;

/// Top-level Rahl configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RahlConfig {
    /// LLM provider settings.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Prompt composition settings.
    #[serde(default)]
    pub gateway: GatewaySettings,

    /// Session store sizing.
    #[serde(default)]
    pub sessions: SessionSettings,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerSettings,

    /// GitHub OAuth app settings.
    #[serde(default)]
    pub github: GitHubSettings,
}

/// Prompt composition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// Prior turns forwarded to the model with each message.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

fn default_history_window() -> usize {
    6
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Maximum live sessions before the least valuable ones are evicted.
    #[serde(default = "default_capacity")]
    pub capacity: u64,

    /// Evict sessions idle for this long (None = never).
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
}

fn default_capacity() -> u64 {
    10_000
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            idle_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory of frontend files served for unmatched paths.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,

    #[serde(default = "default_github_api")]
    pub api_base: String,

    #[serde(default = "default_github_oauth")]
    pub oauth_url: String,
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

fn default_github_oauth() -> String {
    "https://github.com/login/oauth/access_token".to_string()
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            api_base: default_github_api(),
            oauth_url: default_github_oauth(),
        }
    }
}

impl RahlConfig {
    /// Load config from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| RahlError::Config(format!("Failed to read config: {}", e)))?;
        toml::from_str(&content)
            .map_err(|e| RahlError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Save config to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| RahlError::Config(format!("Failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary variable lookup.
    ///
    /// Recognized: `OPENAI_API_KEY`, `GITHUB_CLIENT_ID`, `GITHUB_CLIENT_SECRET`,
    /// `HOST`, `PORT`.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.provider.api_key = Some(key);
        }
        if let Some(id) = lookup("GITHUB_CLIENT_ID") {
            self.github.client_id = Some(id);
        }
        if let Some(secret) = lookup("GITHUB_CLIENT_SECRET") {
            self.github.client_secret = Some(secret);
        }
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| RahlError::Config(format!("Invalid PORT: {}", port)))?;
        }
        Ok(())
    }

    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rahl")
            .join("config.toml")
    }
}
