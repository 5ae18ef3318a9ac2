//! Application configuration for the essentials host.
//!
//! Loaded from a TOML file before logging is set up. Command-line overrides
//! are applied on top, then the result is validated.

use essentials_core::DEFAULT_PROXY_CHANNEL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

fn default_sync_interval() -> u64 {
    30
}

fn default_proxy_channel() -> String {
    DEFAULT_PROXY_CHANNEL.to_string()
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub core: CoreSettings,
    pub logging: LoggingSettings,
}

/// Settings handed to the lifecycle coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreSettings {
    /// Directory configuration units keep their files in
    pub config_directory: String,
    /// Seconds between two module synchronizations (0 to disable)
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,
    /// Channel proxy method frames are sent on, as `namespace:name`
    #[serde(default = "default_proxy_channel")]
    pub proxy_channel: String,
}

/// Logging configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            core: CoreSettings {
                config_directory: "essentials".to_string(),
                sync_interval_secs: default_sync_interval(),
                proxy_channel: default_proxy_channel(),
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, a default configuration file is written to
    /// `path` and the defaults are returned.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    pub fn config_directory(&self) -> PathBuf {
        PathBuf::from(&self.core.config_directory)
    }

    /// `None` when periodic synchronization is turned off.
    pub fn sync_interval(&self) -> Option<Duration> {
        match self.core.sync_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<(), String> {
        if self.core.config_directory.trim().is_empty() {
            return Err("Configuration directory cannot be empty".to_string());
        }

        validate_channel(&self.core.proxy_channel)?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}

/// Channels are `namespace:name`, both parts lowercase identifiers.
fn validate_channel(channel: &str) -> Result<(), String> {
    let valid_part = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-' | '.'))
    };

    match channel.split_once(':') {
        Some((namespace, name)) if valid_part(namespace) && valid_part(name) => Ok(()),
        _ => Err(format!(
            "Invalid proxy channel: '{}'. Expected 'namespace:name'",
            channel
        )),
    }
}
