//! Manager Configuration
//!
//! Settings read from the `[async_task_manager]` table of a TOML file.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Polling interval used when the setting is absent or zero
pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 50;

/// Live signal events allowed per context when not configured
pub const DEFAULT_EVENT_POOL_CAPACITY: usize = 16;

/// Task manager settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Max time the worker blocks before waking on its own
    pub polling_interval_ms: Option<u64>,
    /// Minimum age of a completed item before the consumer finalizes it.
    /// Simulates result latency; leave at zero outside of testing.
    pub debug_delay_ms: u64,
    /// Signal events a context may hand out at once
    pub event_pool_capacity: Option<usize>,
}

/// File layout: settings live under a single table
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    async_task_manager: ManagerConfig,
}

impl ManagerConfig {
    /// Parse settings from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;
        let config = file.async_task_manager;

        if config.event_pool_capacity == Some(0) {
            return Err(ConfigError::Invalid(
                "event_pool_capacity must be at least 1".to_string(),
            ));
        }

        Ok(config)
    }

    /// Load settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!("Loaded manager config from {:?}: {:?}", path, config);
        Ok(config)
    }

    /// Override the polling interval
    pub fn with_polling_interval_ms(mut self, ms: u64) -> Self {
        self.polling_interval_ms = Some(ms);
        self
    }

    /// Set the simulated finalize latency
    pub fn with_debug_delay_ms(mut self, ms: u64) -> Self {
        self.debug_delay_ms = ms;
        self
    }

    /// Resolved polling interval, falling back to the default
    pub fn polling_interval(&self) -> Duration {
        match self.polling_interval_ms {
            Some(0) => {
                warn!(
                    "polling_interval_ms = 0 is not allowed, using {}ms",
                    DEFAULT_POLLING_INTERVAL_MS
                );
                Duration::from_millis(DEFAULT_POLLING_INTERVAL_MS)
            }
            Some(ms) => Duration::from_millis(ms),
            None => Duration::from_millis(DEFAULT_POLLING_INTERVAL_MS),
        }
    }

    pub fn debug_delay(&self) -> Duration {
        Duration::from_millis(self.debug_delay_ms)
    }

    pub fn event_pool_capacity(&self) -> usize {
        self.event_pool_capacity
            .unwrap_or(DEFAULT_EVENT_POOL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_when_absent() {
        let config = ManagerConfig::from_toml_str("").unwrap();
        assert_eq!(config.polling_interval(), Duration::from_millis(50));
        assert_eq!(config.debug_delay(), Duration::ZERO);
        assert_eq!(config.event_pool_capacity(), DEFAULT_EVENT_POOL_CAPACITY);
    }

    #[test]
    fn test_parse_table() {
        let config = ManagerConfig::from_toml_str(
            "[async_task_manager]\npolling_interval_ms = 10\ndebug_delay_ms = 5\nevent_pool_capacity = 2\n",
        )
        .unwrap();
        assert_eq!(config.polling_interval(), Duration::from_millis(10));
        assert_eq!(config.debug_delay(), Duration::from_millis(5));
        assert_eq!(config.event_pool_capacity(), 2);
    }

    #[test]
    fn test_zero_interval_falls_back() {
        let config = ManagerConfig::default().with_polling_interval_ms(0);
        assert_eq!(config.polling_interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_zero_pool_capacity_rejected() {
        let result = ManagerConfig::from_toml_str("[async_task_manager]\nevent_pool_capacity = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[async_task_manager]").unwrap();
        writeln!(file, "polling_interval_ms = 25").unwrap();

        let config = ManagerConfig::load(file.path()).unwrap();
        assert_eq!(config.polling_interval_ms, Some(25));
    }

    #[test]
    fn test_load_missing_file() {
        let result = ManagerConfig::load("/definitely/not/here.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
