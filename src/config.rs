//! Configuration management for cache invalidation

use crate::error::{InvalidationError, Result};
use crate::invalidator::DEFAULT_TAGS_HEADER;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Configuration for a cache invalidator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvalidatorConfig {
    /// Caching proxy servers, e.g. `127.0.0.1:6081` or `http://10.0.0.2`
    #[serde(default)]
    pub servers: Vec<String>,

    /// Application host with optional base path, e.g. `fos.lo/app`
    /// Required to purge or refresh paths instead of absolute URLs
    #[serde(default)]
    pub base_url: Option<String>,

    /// Timeout for each request to a caching proxy in seconds (default: 10)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum number of requests in flight during a flush (default: 8)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,

    /// Header carrying cache tags (default: X-Cache-Tags)
    #[serde(default = "default_tags_header")]
    pub tags_header: String,

    /// Ban header patterns applied when a ban does not set them
    #[serde(default)]
    pub default_ban_headers: BTreeMap<String, String>,
}

// Default value functions for serde
fn default_request_timeout() -> u64 {
    10
}

fn default_max_concurrent() -> usize {
    8
}

fn default_tags_header() -> String {
    DEFAULT_TAGS_HEADER.to_string()
}

impl Default for InvalidatorConfig {
    fn default() -> Self {
        InvalidatorConfig {
            servers: Vec::new(),
            base_url: None,
            request_timeout_secs: default_request_timeout(),
            max_concurrent_requests: default_max_concurrent(),
            tags_header: default_tags_header(),
            default_ban_headers: BTreeMap::new(),
        }
    }
}

impl InvalidatorConfig {
    /// Load configuration from a YAML file
    ///
    /// # Arguments
    /// * `path` - Path to the YAML configuration file
    ///
    /// # Returns
    /// * `Ok(InvalidatorConfig)` if loading and validation succeed
    /// * `Err(InvalidationError::ConfigError)` if the file cannot be read or
    ///   the config is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            InvalidationError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        let config: InvalidatorConfig = serde_yaml::from_str(&content).map_err(|e| {
            InvalidationError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Validation Rules
    /// - servers must not be empty
    /// - request_timeout_secs must be > 0
    /// - max_concurrent_requests must be > 0
    /// - tags_header must not be empty
    ///
    /// Server and base URL syntax is checked when the client is built.
    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(InvalidationError::ConfigError(
                "at least one caching proxy server must be configured".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(InvalidationError::ConfigError(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrent_requests == 0 {
            return Err(InvalidationError::ConfigError(
                "max_concurrent_requests must be greater than 0".to_string(),
            ));
        }

        if self.tags_header.trim().is_empty() {
            return Err(InvalidationError::ConfigError(
                "tags_header must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Create a new InvalidatorConfig with custom servers and base URL
    pub fn new<S: Into<String>>(servers: Vec<S>, base_url: Option<&str>) -> Result<Self> {
        let config = InvalidatorConfig {
            servers: servers.into_iter().map(Into::into).collect(),
            base_url: base_url.map(str::to_string),
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = InvalidatorConfig::default();
        assert!(config.servers.is_empty());
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.max_concurrent_requests, 8);
        assert_eq!(config.tags_header, "X-Cache-Tags");
        assert!(config.default_ban_headers.is_empty());
    }

    #[test]
    fn test_validate_empty_servers() {
        let config = InvalidatorConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = InvalidatorConfig::new(vec!["127.0.0.1"], None).unwrap();
        config.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_concurrent() {
        let mut config = InvalidatorConfig::new(vec!["127.0.0.1"], None).unwrap();
        config.max_concurrent_requests = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_tags_header() {
        let mut config = InvalidatorConfig::new(vec!["127.0.0.1"], None).unwrap();
        config.tags_header = " ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
servers:
  - 127.0.0.1:6081
  - http://10.0.0.2
base_url: fos.lo/app
request_timeout_secs: 3
default_ban_headers:
  X-Url: "^/static/"
"#
        )
        .unwrap();

        let config = InvalidatorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.servers, vec!["127.0.0.1:6081", "http://10.0.0.2"]);
        assert_eq!(config.base_url.as_deref(), Some("fos.lo/app"));
        assert_eq!(config.request_timeout_secs, 3);
        assert_eq!(config.max_concurrent_requests, 8);
        assert_eq!(config.default_ban_headers.get("X-Url").unwrap(), "^/static/");
    }

    #[test]
    fn test_from_file_invalid() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "servers: []").unwrap();
        assert!(matches!(
            InvalidatorConfig::from_file(file.path()),
            Err(InvalidationError::ConfigError(_))
        ));

        let result = InvalidatorConfig::from_file("/nonexistent/invalidator.yaml");
        assert!(matches!(result, Err(InvalidationError::ConfigError(_))));
    }
}
