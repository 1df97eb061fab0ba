//! Configuration for the exporter.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Vendor API connection settings.
    pub api: ApiConfig,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Vendor status API settings. All credential fields are required;
/// a config file without them fails at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Full URL of the vendor status endpoint.
    pub url: String,

    /// Basic auth username (API token key).
    pub token_key: String,

    /// Basic auth password (API token secret).
    pub token_auth: String,

    /// Seconds between polls. Must be > 0.
    pub scrape_frequency: u64,

    /// Outbound request timeout in seconds (default: 10).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl ApiConfig {
    /// Interval between poll ticks.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.scrape_frequency)
    }

    /// Bound on a single outbound request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Prometheus HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Address to listen on (default: "0.0.0.0:8000").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_listen() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ExporterConfig = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.url.is_empty() {
            return Err(ConfigError::Validation("api.url must not be empty".to_string()));
        }

        if self.api.token_key.is_empty() {
            return Err(ConfigError::Validation(
                "api.token_key must not be empty".to_string(),
            ));
        }

        if self.api.token_auth.is_empty() {
            return Err(ConfigError::Validation(
                "api.token_auth must not be empty".to_string(),
            ));
        }

        if self.api.scrape_frequency == 0 {
            return Err(ConfigError::Validation(
                "api.scrape_frequency must be > 0".to_string(),
            ));
        }

        if self.api.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "api.timeout_secs must be > 0".to_string(),
            ));
        }

        // Validate listen address format
        if self
            .prometheus
            .listen
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.prometheus.listen
            )));
        }

        // Validate path starts with /
        if !self.prometheus.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        Ok(())
    }
}
