//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/astronomer/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/astronomer/` (~/.config/astronomer/)
//! - Data: `$XDG_DATA_HOME/astronomer/` (~/.local/share/astronomer/)
//! - State/Logs: `$XDG_STATE_HOME/astronomer/` (~/.local/state/astronomer/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Environment variable that overrides `integration.api_key`
pub const API_KEY_ENV: &str = "ASTRONOMER_API_KEY";

/// Default ingestion host
pub const DEFAULT_HOST: &str = "api.astronomer.io";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Ingestion API settings
    #[serde(default)]
    pub integration: IntegrationConfig,

    /// Extra referrer networks, keyed by query parameter name
    #[serde(default)]
    pub referrer_networks: BTreeMap<String, String>,

    /// Cookie jar settings
    #[serde(default)]
    pub cookies: CookieConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Ingestion API configuration
#[derive(Debug, Deserialize, Clone)]
pub struct IntegrationConfig {
    /// Write key embedded in every envelope
    pub api_key: Option<String>,

    /// Ingestion host, without scheme
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP request timeout in seconds (none by default)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            host: default_host(),
            timeout_secs: None,
        }
    }
}

impl IntegrationConfig {
    /// Check if the integration has everything it needs to send
    pub fn is_ready(&self) -> bool {
        self.validate().is_ok()
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => {}
            _ => {
                return Err(Error::Config(format!(
                    "integration.api_key is required (or set {})",
                    API_KEY_ENV
                )))
            }
        }
        if self.host.trim().is_empty() {
            return Err(Error::Config(
                "integration.host must not be empty".to_string(),
            ));
        }
        if self.host.contains("://") {
            return Err(Error::Config(
                "integration.host must not include a scheme".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

/// Cookie jar configuration
#[derive(Debug, Deserialize, Default, Clone)]
pub struct CookieConfig {
    /// Extra public suffixes, merged over the built-in list
    #[serde(default)]
    pub public_suffixes: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default path, then apply environment overrides
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Config::default()
        };

        config.apply_api_key_override(std::env::var(API_KEY_ENV).ok());
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Replace the configured api key when an override is present and non-empty
    pub fn apply_api_key_override(&mut self, api_key: Option<String>) {
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.integration.api_key = Some(key);
        }
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/astronomer/config.toml` (~/.config/astronomer/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("astronomer").join("config.toml")
    }

    /// Returns the data directory path (for the SQLite database)
    ///
    /// `$XDG_DATA_HOME/astronomer/` (~/.local/share/astronomer/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("astronomer")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/astronomer/` (~/.local/state/astronomer/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("astronomer")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/astronomer/data.db` (~/.local/share/astronomer/data.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("data.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/astronomer/astronomer.log` (~/.local/state/astronomer/astronomer.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("astronomer.log")
    }
}
