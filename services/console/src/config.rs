//! Console configuration.
//!
//! Settings come from an optional `config/console` file and `CONSOLE__*`
//! environment variables, or are built directly with [`ConsoleConfig::new`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to load configuration: {0}")]
    LoadError(String),
}

/// Connection settings for the guest registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Registry base URL, e.g. `http://localhost:3001`
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// File name the registry serves for guests without a photo
    #[serde(default = "default_asset")]
    pub default_asset: String,
}

fn default_base_url() -> String {
    "http://localhost:3001".to_string()
}

fn default_asset() -> String {
    "default-avatar.png".to_string()
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            default_asset: default_asset(),
        }
    }
}

impl ConsoleConfig {
    /// Create a config pointing at a registry
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Load configuration from an optional file and the environment
    /// (`CONSOLE__BASE_URL` -> `base_url`)
    pub fn load() -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/console").required(false))
            .add_source(
                config::Environment::with_prefix("CONSOLE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::LoadError(e.to_string()))?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| ConfigError::LoadError(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Base URL without a trailing slash
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::MissingRequired("base_url".to_string()));
        }

        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "base_url".to_string(),
                message: "must start with http:// or https://".to_string(),
            });
        }

        if self.default_asset.is_empty() || self.default_asset.contains('/') {
            return Err(ConfigError::InvalidValue {
                key: "default_asset".to_string(),
                message: "must be a bare file name".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConsoleConfig::default();
        assert_eq!(config.base_url, "http://localhost:3001");
        assert_eq!(config.default_asset, "default-avatar.png");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_source_fills_defaults() {
        let config: ConsoleConfig = config::Config::builder()
            .set_override("base_url", "http://registry:3001")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.base_url, "http://registry:3001");
        assert_eq!(config.default_asset, "default-avatar.png");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_base_strips_trailing_slash() {
        assert_eq!(ConsoleConfig::new("http://h:1/").base(), "http://h:1");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(matches!(
            ConsoleConfig::new("").validate(),
            Err(ConfigError::MissingRequired(_))
        ));
        assert!(matches!(
            ConsoleConfig::new("ftp://h").validate(),
            Err(ConfigError::InvalidValue { .. })
        ));

        let mut config = ConsoleConfig::default();
        config.default_asset = "../x.png".to_string();
        assert!(config.validate().is_err());
    }
}
