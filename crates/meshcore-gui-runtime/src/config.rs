//! Runtime configuration
//!
//! Loaded from a TOML file where every section and field is optional; absent
//! values take the defaults below. Each load is validated before use.
//!
//! ```toml
//! [device]
//! address = "literal:AA:BB:CC:DD:EE:FF"
//! device_name = "PE1HVH T1000e"
//!
//! [reconnect]
//! max_attempts = 5
//! base_delay_ms = 5000
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use meshcore_gui_core::Channel;

use crate::error::ConfigError;

/// Whole milliseconds for a config field, rounding sub-millisecond values up
fn duration_ms(duration: Duration) -> u64 {
    let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    if ms == 0 && !duration.is_zero() {
        1
    } else {
        ms
    }
}

// ----------------------------------------------------------------------------
// Configuration Sections
// ----------------------------------------------------------------------------

/// Complete configuration of the device runtime
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub device: DeviceSettings,
    pub worker: WorkerSettings,
    pub reconnect: ReconnectSettings,
    pub commands: CommandSettings,
    pub presentation: PresentationSettings,
}

/// Which device to talk to and how it names itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// BLE address, optionally prefixed with `literal:`
    pub address: String,
    /// Name set when bot mode is off
    pub device_name: String,
    /// Name set when bot mode is on
    pub bot_device_name: String,
    /// Channels shown in the UI; reading them from the device over BLE is unreliable
    pub channels: Vec<Channel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Delay between command queue drains (in milliseconds)
    pub tick_interval_ms: u64,
    pub load_retry_attempts: u32,
    pub load_retry_delay_ms: u64,
    /// Pause after connecting before the first query (in milliseconds)
    pub connect_settle_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    pub max_attempts: u32,
    /// Attempt `n` waits `n * base_delay_ms` before trying
    pub base_delay_ms: u64,
    /// Pause between bond removal and reconnecting (in milliseconds)
    pub settle_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSettings {
    /// Pause between consecutive contact removals (in milliseconds)
    pub purge_pause_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationSettings {
    pub update_interval_ms: u64,
}

// ----------------------------------------------------------------------------
// Default Implementations
// ----------------------------------------------------------------------------

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            address: String::new(),
            device_name: "MeshCore GUI".to_string(),
            bot_device_name: "MeshCore GUI Bot".to_string(),
            channels: vec![
                Channel::new(0, "Public"),
                Channel::new(1, "#test"),
                Channel::new(2, "#zwolle"),
                Channel::new(3, "RahanSom"),
            ],
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            load_retry_attempts: 5,
            load_retry_delay_ms: 300,
            connect_settle_ms: 1000,
        }
    }
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 5000,
            settle_delay_ms: 2000,
        }
    }
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self { purge_pause_ms: 500 }
    }
}

impl Default for PresentationSettings {
    fn default() -> Self {
        Self {
            update_interval_ms: 500,
        }
    }
}

// ----------------------------------------------------------------------------
// Loading and Validation
// ----------------------------------------------------------------------------

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::Loading(format!(
                "Failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.device_name.is_empty() || self.device.bot_device_name.is_empty() {
            return Err(ConfigError::Validation(
                "Device names must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for channel in &self.device.channels {
            if !seen.insert(channel.index) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate channel index: {}",
                    channel.index
                )));
            }
        }

        if self.worker.tick_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "Worker tick interval must be greater than 0".to_string(),
            ));
        }
        if self.worker.load_retry_attempts == 0 {
            return Err(ConfigError::Validation(
                "Load retry attempts must be greater than 0".to_string(),
            ));
        }
        if self.reconnect.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "Reconnect attempts must be greater than 0".to_string(),
            ));
        }
        if self.presentation.update_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "Presentation update interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.device.address = address.into();
        self
    }

    pub fn with_device_names(mut self, regular: impl Into<String>, bot: impl Into<String>) -> Self {
        self.device.device_name = regular.into();
        self.device.bot_device_name = bot.into();
        self
    }

    pub fn with_channels(mut self, channels: Vec<Channel>) -> Self {
        self.device.channels = channels;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.worker.tick_interval_ms = duration_ms(interval);
        self
    }

    pub fn with_load_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.worker.load_retry_attempts = attempts;
        self.worker.load_retry_delay_ms = duration_ms(delay);
        self
    }

    pub fn with_connect_settle(mut self, settle: Duration) -> Self {
        self.worker.connect_settle_ms = duration_ms(settle);
        self
    }

    pub fn with_reconnect(mut self, max_attempts: u32, base_delay: Duration, settle: Duration) -> Self {
        self.reconnect.max_attempts = max_attempts;
        self.reconnect.base_delay_ms = duration_ms(base_delay);
        self.reconnect.settle_delay_ms = duration_ms(settle);
        self
    }

    pub fn with_purge_pause(mut self, pause: Duration) -> Self {
        self.commands.purge_pause_ms = duration_ms(pause);
        self
    }

    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.presentation.update_interval_ms = duration_ms(interval);
        self
    }

    // ------------------------------------------------------------------
    // Durations
    // ------------------------------------------------------------------

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.worker.tick_interval_ms)
    }

    pub fn load_retry_delay(&self) -> Duration {
        Duration::from_millis(self.worker.load_retry_delay_ms)
    }

    pub fn connect_settle(&self) -> Duration {
        Duration::from_millis(self.worker.connect_settle_ms)
    }

    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect.base_delay_ms)
    }

    pub fn reconnect_settle_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect.settle_delay_ms)
    }

    pub fn purge_pause(&self) -> Duration {
        Duration::from_millis(self.commands.purge_pause_ms)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.presentation.update_interval_ms)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.device.channels.len(), 4);
        assert_eq!(config.tick_interval(), Duration::from_millis(100));
        assert_eq!(config.reconnect_base_delay(), Duration::from_secs(5));
        assert_eq!(config.purge_pause(), Duration::from_millis(500));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            [device]
            address = "literal:AA:BB:CC:DD:EE:FF"

            [reconnect]
            max_attempts = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.device.address, "literal:AA:BB:CC:DD:EE:FF");
        assert_eq!(config.device.device_name, "MeshCore GUI");
        assert_eq!(config.reconnect.max_attempts, 3);
        assert_eq!(config.reconnect.base_delay_ms, 5000);
        assert_eq!(config.worker.load_retry_attempts, 5);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let config = RuntimeConfig::default().with_reconnect(0, Duration::from_secs(1), Duration::ZERO);
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let config = RuntimeConfig::default()
            .with_channels(vec![Channel::new(1, "a"), Channel::new(1, "b")]);
        assert!(config.validate().is_err());

        let config = RuntimeConfig::default().with_device_names("", "bot");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sub_millisecond_intervals_round_up() {
        let config = RuntimeConfig::default()
            .with_tick_interval(Duration::from_micros(500))
            .with_update_interval(Duration::from_micros(1));
        assert_eq!(config.worker.tick_interval_ms, 1);
        assert_eq!(config.presentation.update_interval_ms, 1);
        assert!(config.validate().is_ok());

        let config = RuntimeConfig::default().with_tick_interval(Duration::ZERO);
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let result = RuntimeConfig::from_toml_str("[worker]\ntick_interval_ms = \"fast\"");
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_missing_file_is_loading_error() {
        let result = RuntimeConfig::load_from_file("/nonexistent/meshcore-gui.toml");
        assert!(matches!(result, Err(ConfigError::Loading(_))));
    }
}
