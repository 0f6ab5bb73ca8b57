//! Configuration for the PEX subsystem.
//!
//! Loaded from a TOML file. Every field has a default so a partial (or empty)
//! file is valid; `load_or_create` writes the defaults out on first run.

use crate::error::ConfigError;
use crate::network::rate_limiter::DEFAULT_MAX_MSG_COUNT_BY_PEER;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pex: PexConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PexConfig {
    /// How often the node checks its outbound peer count
    #[serde(default = "default_ensure_peers_period_secs")]
    pub ensure_peers_period_secs: u64,
    /// Messages accepted from one peer per flush window (one hour)
    #[serde(default = "default_max_msg_count_by_peer")]
    pub max_msg_count_by_peer: u16,
}

fn default_ensure_peers_period_secs() -> u64 {
    30
}

fn default_max_msg_count_by_peer() -> u16 {
    DEFAULT_MAX_MSG_COUNT_BY_PEER
}

impl PexConfig {
    pub fn ensure_peers_period(&self) -> Duration {
        Duration::from_secs(self.ensure_peers_period_secs)
    }
}

impl Default for PexConfig {
    fn default() -> Self {
        Self {
            ensure_peers_period_secs: default_ensure_peers_period_secs(),
            max_msg_count_by_peer: default_max_msg_count_by_peer(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or write and return the defaults if it does not exist.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load_from_file(path);
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let config = Config::default();
        config.save_to_file(path)?;
        tracing::info!("✅ Generated default config at {}", path.display());
        Ok(config)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pex.ensure_peers_period_secs == 0 {
            return Err(ConfigError::Invalid(
                "pex.ensure_peers_period_secs must be greater than zero".to_string(),
            ));
        }
        if self.pex.max_msg_count_by_peer == 0 {
            return Err(ConfigError::Invalid(
                "pex.max_msg_count_by_peer must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
