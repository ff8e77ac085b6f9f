//! eventsync configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::coordinator::CoordinatorConfig;

/// Main eventsync configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Server connection settings
    pub server: ServerConfig,

    /// Push channel settings
    pub channel: ChannelConfig,

    /// Refresh coordinator settings
    pub coordinator: CoordinatorConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that the coordinator channel can hold a request and that the
    /// publishable key environment variable is set.
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        if self.coordinator.channel_buffer == 0 {
            eyre::bail!("coordinator.channel-buffer must be at least 1");
        }
        self.server.get_publishable_key().map(|_| ())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .eventsync.yml
        let local_config = PathBuf::from(".eventsync.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/eventsync/eventsync.yml
        if let Some(user_config) = user_config_path()
            && user_config.exists()
        {
            match Self::load_from_file(&user_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are swallowed; the full load reports them once logging works.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => std::iter::once(PathBuf::from(".eventsync.yml"))
                .chain(user_config_path())
                .collect(),
        };

        candidates
            .into_iter()
            .find(|path| path.exists())
            .and_then(|path| fs::read_to_string(path).ok())
            .and_then(|content| serde_yaml::from_str::<Self>(&content).ok())
            .and_then(|config| config.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("eventsync").join("eventsync.yml"))
}

/// Whether `host` points at this machine (plain-text transports)
pub fn is_local_host(host: &str) -> bool {
    host.contains("localhost") || host.starts_with("127.") || host.starts_with("[::1]")
}

/// Server connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host (and optional port) serving views, API endpoints and pushes
    pub host: String,

    /// Environment variable containing the publishable key
    #[serde(rename = "publishable-key-env")]
    pub publishable_key_env: String,

    /// HTTP request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost:8080".to_string(),
            publishable_key_env: "EVENTSYNC_PUBLISHABLE_KEY".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl ServerConfig {
    /// Read the publishable key from the configured environment variable
    pub fn get_publishable_key(&self) -> Result<String> {
        std::env::var(&self.publishable_key_env).map_err(|_| {
            eyre::eyre!(
                "Publishable key not found. Set the {} environment variable.",
                self.publishable_key_env
            )
        })
    }
}

/// Push channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Text frame sent once the connection opens
    pub greeting: Option<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            greeting: Some("heyhihello".to_string()),
        }
    }
}
