use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::errors::{ActionError, Result};

/// Engine configuration with scheduling and retry tuning parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Keep running later groups after a group ends FAILED
    pub continue_on_error: bool,
    /// Sleep between scheduling passes that made no progress (milliseconds)
    pub poll_interval_ms: u64,
    /// Retry budget for asynchronous tasks that do not set their own
    pub default_async_retries: u32,
    /// Interval between asynchronous retries (milliseconds)
    pub default_retry_interval_ms: u64,
    /// Upper bound on scheduling passes per group (0 = unbounded)
    pub max_passes: usize,
    /// Mute all engine signals while a run is in progress
    pub suppress_signals: bool,
    /// How long `shutdown` waits for each async worker (milliseconds)
    pub stop_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            continue_on_error: true,
            poll_interval_ms: 10,
            default_async_retries: 0,
            default_retry_interval_ms: 1000,
            max_passes: 0,
            suppress_signals: false,
            stop_timeout_ms: 5000,
        }
    }
}

impl EngineConfig {
    /// Create a new builder for EngineConfig
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn default_retry_interval(&self) -> Duration {
        Duration::from_millis(self.default_retry_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(config_error("poll_interval_ms", "must be greater than 0"));
        }
        if self.poll_interval_ms > 60_000 {
            return Err(config_error("poll_interval_ms", "cannot exceed 60 seconds"));
        }
        if self.default_async_retries > 0 && self.default_retry_interval_ms == 0 {
            return Err(config_error(
                "default_retry_interval_ms",
                "must be greater than 0 when retries are enabled",
            ));
        }
        if self.stop_timeout_ms == 0 {
            return Err(config_error("stop_timeout_ms", "must be greater than 0"));
        }
        Ok(())
    }

    /// Short intervals for tests and local iteration
    pub fn development() -> Self {
        Self {
            poll_interval_ms: 1,
            default_retry_interval_ms: 50,
            stop_timeout_ms: 1000,
            ..Default::default()
        }
    }

    /// Stop on the first failed group and emit no signals
    pub fn quiet() -> Self {
        Self {
            continue_on_error: false,
            suppress_signals: true,
            ..Default::default()
        }
    }

    pub fn from_yaml(source: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(source: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }
}

fn config_error(field: &str, message: &str) -> ActionError {
    ActionError::Configuration {
        message: format!("{} {}", field, message),
        field: Some(field.to_string()),
    }
}

/// Builder for EngineConfig
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    pub fn continue_on_error(mut self, enabled: bool) -> Self {
        self.config.continue_on_error = enabled;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the default async retry budget and interval
    pub fn async_retries(mut self, retries: u32, interval: Duration) -> Self {
        self.config.default_async_retries = retries;
        self.config.default_retry_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn max_passes(mut self, passes: usize) -> Self {
        self.config.max_passes = passes;
        self
    }

    pub fn suppress_signals(mut self, enabled: bool) -> Self {
        self.config.suppress_signals = enabled;
        self
    }

    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.config.stop_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.continue_on_error);
        assert_eq!(config.poll_interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_presets() {
        assert!(EngineConfig::development().validate().is_ok());
        let quiet = EngineConfig::quiet();
        assert!(quiet.validate().is_ok());
        assert!(quiet.suppress_signals);
        assert!(!quiet.continue_on_error);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = EngineConfig::default();
        config.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        config.poll_interval_ms = 10;
        config.default_async_retries = 3;
        config.default_retry_interval_ms = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.category(), "configuration");
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::builder()
            .continue_on_error(false)
            .poll_interval(Duration::from_millis(5))
            .async_retries(2, Duration::from_millis(20))
            .max_passes(100)
            .build()
            .unwrap();

        assert!(!config.continue_on_error);
        assert_eq!(config.poll_interval_ms, 5);
        assert_eq!(config.default_async_retries, 2);
        assert_eq!(config.default_retry_interval(), Duration::from_millis(20));
        assert_eq!(config.max_passes, 100);
    }

    #[test]
    fn test_from_yaml_fills_defaults() {
        let config = EngineConfig::from_yaml("continue_on_error: false\npoll_interval_ms: 25\n").unwrap();
        assert!(!config.continue_on_error);
        assert_eq!(config.poll_interval_ms, 25);
        assert_eq!(config.stop_timeout_ms, EngineConfig::default().stop_timeout_ms);

        assert!(EngineConfig::from_yaml("poll_interval_ms: 0\n").is_err());
    }

    #[test]
    fn test_from_json() {
        let config = EngineConfig::from_json(r#"{"suppress_signals": true}"#).unwrap();
        assert!(config.suppress_signals);
    }
}
