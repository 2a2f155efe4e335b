//! Monitor configuration, loaded from a JSON file. Every field has a
//! default matching the legacy firmware constants, so an empty `{}` file
//! yields a working (cloud-disabled) monitor.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::event_log::DEFAULT_LOG_CAPACITY;
use super::history::DEFAULT_HISTORY_CAPACITY;

/// Template value shipped in the sample config; a key equal to it does
/// not count as configured.
pub const API_KEY_PLACEHOLDER: &str = "YOUR_THINGSPEAK_WRITE_API_KEY";

pub const DEFAULT_SENSOR_PIN: u8 = 4;
pub const DEFAULT_POLL_INTERVAL_S: u64 = 30;
pub const DEFAULT_UPLOAD_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_API_URL: &str = "https://api.thingspeak.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Validation(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub sensor_pin: u8,
    pub use_internal_pullup: bool,
    /// Acquisition tick period in seconds.
    pub poll_interval_s: u64,
    pub max_history_size: usize,
    pub max_log_size: usize,
    pub thingspeak: ThingSpeakConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sensor_pin: DEFAULT_SENSOR_PIN,
            use_internal_pullup: false,
            poll_interval_s: DEFAULT_POLL_INTERVAL_S,
            max_history_size: DEFAULT_HISTORY_CAPACITY,
            max_log_size: DEFAULT_LOG_CAPACITY,
            thingspeak: ThingSpeakConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThingSpeakConfig {
    pub enabled: bool,
    pub api_key: String,
    pub channel_id: String,
    /// Upload slot width in milliseconds.
    pub interval_ms: u64,
    pub api_url: String,
}

impl Default for ThingSpeakConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            channel_id: String::new(),
            interval_ms: DEFAULT_UPLOAD_INTERVAL_MS,
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

impl ThingSpeakConfig {
    /// True when a real write key is present (non-empty and not the
    /// template placeholder). Exposed, not the key itself, over `/config`.
    pub fn api_key_configured(&self) -> bool {
        !self.api_key.is_empty() && self.api_key != API_KEY_PLACEHOLDER
    }

    pub fn upload_interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl MonitorConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_s == 0 {
            return Err(ConfigError::Validation("poll_interval_s must be nonzero"));
        }
        if self.max_history_size == 0 {
            return Err(ConfigError::Validation("max_history_size must be nonzero"));
        }
        if self.max_log_size == 0 {
            return Err(ConfigError::Validation("max_log_size must be nonzero"));
        }
        if self.thingspeak.interval_ms == 0 {
            return Err(ConfigError::Validation(
                "thingspeak.interval_ms must be nonzero",
            ));
        }
        if self.thingspeak.enabled && self.thingspeak.api_url.is_empty() {
            return Err(ConfigError::Validation(
                "thingspeak.api_url must be set when uploads are enabled",
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_s)
    }
}
