//! Configuration handling for the session engine

use crate::discovery::http::{DEFAULT_ORGANIZATION_LIST_URL, DEFAULT_SERVER_LIST_URL};
use crate::expiry::NotificationPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub storage: StorageConfig,
    pub discovery: DiscoveryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Time after an authorization before manual renewal is offered
    pub renew_cooldown_secs: u64,
    /// How long before expiry the alarm may fire at the earliest
    pub notification_lead_secs: u64,
    /// Upper bound on the alarm's delivery window
    pub notification_window_secs: u64,
    pub tick_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            renew_cooldown_secs: 30 * 60,
            notification_lead_secs: 30 * 60,
            notification_window_secs: 15 * 60,
            tick_interval_ms: 1000,
        }
    }
}

impl SessionConfig {
    pub fn renew_cooldown_millis(&self) -> i64 {
        secs_to_millis(self.renew_cooldown_secs)
    }

    pub fn notification_policy(&self) -> NotificationPolicy {
        NotificationPolicy {
            max_lead_millis: secs_to_millis(self.notification_lead_secs),
            max_window_millis: secs_to_millis(self.notification_window_secs),
        }
    }

    /// Never zero; `tokio::time::interval` rejects a zero period
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

fn secs_to_millis(secs: u64) -> i64 {
    i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Credential file; the platform data directory when unset
    pub credentials_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub organization_list_url: String,
    pub server_list_url: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            organization_list_url: DEFAULT_ORGANIZATION_LIST_URL.to_string(),
            server_list_url: DEFAULT_SERVER_LIST_URL.to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from `path`, or the defaults if the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `<config dir>/eduvpn-session/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(crate::APP_DIR_NAME).join("config.toml"))
    }
}
