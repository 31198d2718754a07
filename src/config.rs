//! Configuration management for Sluice.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, SluiceError};

/// Prefix for environment overrides, e.g. `SLUICE__LIMITER__MAX_RATE=100`.
const ENV_PREFIX: &str = "SLUICE";

/// Main configuration for a Sluice batch job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SluiceConfig {
    /// Admission limits
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Batch driver settings
    #[serde(default)]
    pub batch: BatchConfig,
}

/// Leaky bucket limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Units admitted per time period
    #[serde(default = "default_max_rate")]
    pub max_rate: f64,

    /// Length of the time period in seconds
    #[serde(default = "default_time_period_secs")]
    pub time_period_secs: f64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_rate: default_max_rate(),
            time_period_secs: default_time_period_secs(),
        }
    }
}

fn default_max_rate() -> f64 {
    500.0
}

fn default_time_period_secs() -> f64 {
    60.0
}

/// Batch driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum number of fetches outstanding at once
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// How many times throttled items are requeued before being abandoned
    #[serde(default = "default_max_retry_rounds")]
    pub max_retry_rounds: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            max_retry_rounds: default_max_retry_rounds(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl BatchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_max_in_flight() -> usize {
    64
}

fn default_max_retry_rounds() -> usize {
    5
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("sluice/{}", env!("CARGO_PKG_VERSION"))
}

impl SluiceConfig {
    /// Load configuration from an optional YAML file, then apply
    /// `SLUICE__SECTION__FIELD` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Yaml),
            );
        }

        let config: SluiceConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, without environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: SluiceConfig = serde_yaml::from_str(yaml)
            .map_err(|e| SluiceError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the limiter or driver cannot run with.
    pub fn validate(&self) -> Result<()> {
        let limiter = &self.limiter;
        if !(limiter.max_rate.is_finite() && limiter.max_rate > 0.0) {
            return Err(SluiceError::Config(format!(
                "limiter.max_rate must be positive, got {}",
                limiter.max_rate
            )));
        }
        if !(limiter.time_period_secs.is_finite() && limiter.time_period_secs > 0.0) {
            return Err(SluiceError::Config(format!(
                "limiter.time_period_secs must be positive, got {}",
                limiter.time_period_secs
            )));
        }
        if self.batch.max_in_flight == 0 {
            return Err(SluiceError::Config(
                "batch.max_in_flight must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SluiceConfig::default();
        assert_eq!(config.limiter.max_rate, 500.0);
        assert_eq!(config.limiter.time_period_secs, 60.0);
        assert_eq!(config.batch.max_in_flight, 64);
        assert_eq!(config.batch.max_retry_rounds, 5);
        assert_eq!(config.batch.request_timeout(), Duration::from_secs(30));
        assert!(config.batch.user_agent.starts_with("sluice/"));
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
limiter:
  max_rate: 100
batch:
  max_retry_rounds: 2
"#;
        let config = SluiceConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.limiter.max_rate, 100.0);
        assert_eq!(config.limiter.time_period_secs, 60.0);
        assert_eq!(config.batch.max_retry_rounds, 2);
        assert_eq!(config.batch.max_in_flight, 64);
    }

    #[test]
    fn test_parse_empty_yaml_uses_defaults() {
        let config = SluiceConfig::from_yaml("{}").unwrap();
        assert_eq!(config.limiter.max_rate, 500.0);
    }

    #[test]
    fn test_rejects_non_positive_rate() {
        let yaml = r#"
limiter:
  max_rate: 0
"#;
        let err = SluiceConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, SluiceError::Config(_)));
    }

    #[test]
    fn test_rejects_zero_in_flight() {
        let yaml = r#"
batch:
  max_in_flight: 0
"#;
        assert!(SluiceConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_rejects_malformed_yaml() {
        let err = SluiceConfig::from_yaml("limiter: [1, 2").unwrap_err();
        assert!(matches!(err, SluiceError::Config(_)));
    }
}
