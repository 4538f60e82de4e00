//! Configuration management for docpilot
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backend API base URL
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Job status poll interval in milliseconds (500-1000 recommended)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Timeout for ordinary requests in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Timeout for file uploads in seconds
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,

    /// Vision model used when a submission does not name one
    #[serde(default = "default_vision_model")]
    pub default_vision_model: String,

    /// Consecutive failed polls tolerated before a monitor gives up
    #[serde(default = "default_max_poll_transport_failures")]
    pub max_poll_transport_failures: u32,

    /// Path to the loaded config file (internal, not user-editable)
    #[serde(skip)]
    pub config_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            upload_timeout_secs: default_upload_timeout_secs(),
            default_vision_model: default_vision_model(),
            max_poll_transport_failures: default_max_poll_transport_failures(),
            config_file: Self::default_config_path(),
        }
    }
}

impl Config {
    /// Get the default base directory for docpilot (~/.docpilot)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".docpilot")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.config_file = config_path.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, or from the default location, falling
    /// back to defaults when no config file exists
    pub fn load_or_default(config_path: Option<&Path>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load(path),
            None => {
                let path = Self::default_config_path();
                if path.exists() {
                    Self::load(&path)
                } else {
                    debug!("No config file found, using defaults");
                    Ok(Config::default())
                }
            }
        }
    }

    /// Save configuration to its file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.config_file, content)?;
        info!("Saved config to {:?}", self.config_file);
        Ok(())
    }

    /// Poll interval as a `Duration`
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Request timeout as a `Duration`
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Upload timeout as a `Duration`
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms < 100 {
            return Err(Error::Config(format!(
                "poll_interval_ms must be at least 100, got {}",
                self.poll_interval_ms
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "request_timeout_secs must be non-zero".to_string(),
            ));
        }
        if self.max_poll_transport_failures == 0 {
            return Err(Error::Config(
                "max_poll_transport_failures must be non-zero".to_string(),
            ));
        }
        url::Url::parse(&self.backend_url)
            .map_err(|e| Error::Config(format!("Invalid backend_url: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(r#"backend_url = "http://10.0.0.2:9000""#).unwrap();
        assert_eq!(config.backend_url, "http://10.0.0.2:9000");
        assert_eq!(config.poll_interval_ms, default_poll_interval_ms());
        assert_eq!(config.default_vision_model, default_vision_model());
    }

    #[test]
    fn test_rejects_bad_interval() {
        let mut config = Config::default();
        config.poll_interval_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.backend_url = "http://example.com:8000".to_string();
        config.config_file = path.clone();
        config.save().unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.backend_url, "http://example.com:8000");
        assert_eq!(loaded.config_file, path);
    }
}
