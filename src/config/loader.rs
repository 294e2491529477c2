use std::fs;
use std::path::{Path, PathBuf};

use reqwest::Url;
use thiserror::Error;

use crate::config::types::Config;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

impl Config {
    /// Loads and validates configuration from a TOML file.
    ///
    /// A missing or malformed file is an error: the proxy has no usable
    /// defaults for its backends.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// Checks:
    /// - Both backend URIs are absolute http(s) URLs with a host
    /// - Connection caps are non-zero
    /// - Timeouts are non-zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_backend_uri("v1", &self.backends.v1)?;
        validate_backend_uri("v2", &self.backends.v2)?;

        let transport = &self.transport;
        if transport.max_conns_per_host == 0 || transport.max_conns_total == 0 {
            return Err(ConfigError::ValidationError {
                message: "transport connection caps must be greater than zero".to_string(),
            });
        }

        if transport.connect_timeout_ms == 0
            || transport.response_header_timeout_seconds == 0
            || self.health.timeout_seconds == 0
            || self.health.connect_timeout_seconds == 0
        {
            return Err(ConfigError::ValidationError {
                message: "timeouts must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

fn validate_backend_uri(label: &str, uri: &str) -> Result<(), ConfigError> {
    let parsed = Url::parse(uri).map_err(|e| ConfigError::ValidationError {
        message: format!("backend {} has invalid URI '{}': {}", label, uri, e),
    })?;

    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ConfigError::ValidationError {
            message: format!("backend {} must be an http(s) URL with a host, got '{}'", label, uri),
        });
    }

    Ok(())
}
