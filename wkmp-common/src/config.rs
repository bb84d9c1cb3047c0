//! Bootstrap configuration loaded from TOML
//!
//! Two sections:
//! 1. `[logging]`: log level (static, read once at startup)
//! 2. `[audio]`: initial values for the runtime-tunable `AudioParams`
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments
//! 2. Environment variables (`RUST_LOG` for logging)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::params::AudioParams;
use crate::{Error, Result};

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Raw `[audio]` table, validated by `AudioParams::from_toml`
    #[serde(default)]
    pub audio: Option<toml::Table>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load configuration if a path was given, built-in defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Runtime parameters seeded from the `[audio]` table
    pub fn audio_params(&self) -> AudioParams {
        AudioParams::from_toml(self.audio.as_ref())
    }

    fn validate(&self) -> Result<()> {
        match self.logging.level.to_ascii_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(Error::Config(format!("Invalid log level '{}'", other))),
        }
    }
}
