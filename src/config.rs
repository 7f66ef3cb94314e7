//! Client configuration.
//!
//! Loaded from an optional YAML file; every field falls back to its default
//! so an empty or partial file is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

pub const DEFAULT_SERVER: &str = "http://127.0.0.1:8080";
pub const DEFAULT_API_BASE: &str = "/api/v1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Scheme, host and port of the migration service
    pub server: String,
    /// Versioned prefix shared by every API route
    pub api_base: String,
    pub wizard_poll_interval_ms: u64,
    pub detail_poll_interval_ms: u64,
    pub scan_cache_ttl_secs: u64,
    pub history_page_size: u32,
    /// Directory holding session-scoped state (CLI only)
    pub session_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            wizard_poll_interval_ms: 1000,
            detail_poll_interval_ms: 2000,
            scan_cache_ttl_secs: 300,
            history_page_size: 20,
            session_dir: std::env::temp_dir().join("stoz-session"),
        }
    }
}

impl ClientConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("{}: {e}", path.display())))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self =
            serde_yaml::from_str(content).map_err(|e| ClientError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.checked_scan_cache_ttl().is_none() {
            return Err(ClientError::Config(format!(
                "scan_cache_ttl_secs out of range: {}",
                self.scan_cache_ttl_secs
            )));
        }
        Ok(())
    }

    /// Absolute URL prefix for all API calls.
    pub fn api_url(&self) -> String {
        let server = self.server.trim_end_matches('/');
        let base = self.api_base.trim_matches('/');
        if base.is_empty() {
            server.to_string()
        } else {
            format!("{server}/{base}")
        }
    }

    pub fn wizard_poll_interval(&self) -> Duration {
        Duration::from_millis(self.wizard_poll_interval_ms)
    }

    pub fn detail_poll_interval(&self) -> Duration {
        Duration::from_millis(self.detail_poll_interval_ms)
    }

    fn checked_scan_cache_ttl(&self) -> Option<chrono::Duration> {
        i64::try_from(self.scan_cache_ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
    }

    /// Saturates for values [`validate`](Self::validate) rejects.
    pub fn scan_cache_ttl(&self) -> chrono::Duration {
        self.checked_scan_cache_ttl().unwrap_or(chrono::Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.api_url(), "http://127.0.0.1:8080/api/v1");
        assert_eq!(config.wizard_poll_interval(), Duration::from_secs(1));
        assert_eq!(config.detail_poll_interval(), Duration::from_secs(2));
        assert_eq!(config.scan_cache_ttl(), chrono::Duration::minutes(5));
        assert_eq!(config.history_page_size, 20);
    }

    #[test]
    fn test_out_of_range_scan_ttl_is_rejected() {
        let err = ClientConfig::from_yaml("scan_cache_ttl_secs: 18446744073709551615\n").unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));

        let config = ClientConfig {
            scan_cache_ttl_secs: u64::MAX,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.scan_cache_ttl(), chrono::Duration::MAX);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = ClientConfig::from_yaml("server: http://nas.local:9000/\napi_base: api/v2/\n").unwrap();
        assert_eq!(config.api_url(), "http://nas.local:9000/api/v2");
        assert_eq!(config.wizard_poll_interval_ms, 1000);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(ClientConfig::from_yaml("  \n").unwrap(), ClientConfig::default());
    }

    #[test]
    fn test_malformed_yaml_is_config_error() {
        let result = ClientConfig::from_yaml("wizard_poll_interval_ms: [not a number");
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[test]
    fn test_load_missing_and_present_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stoz.yaml");
        assert_eq!(ClientConfig::load(&path).unwrap(), ClientConfig::default());

        std::fs::write(&path, "detail_poll_interval_ms: 500\n").unwrap();
        let config = ClientConfig::load(&path).unwrap();
        assert_eq!(config.detail_poll_interval(), Duration::from_millis(500));
    }
}
