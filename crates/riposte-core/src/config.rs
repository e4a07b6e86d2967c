//! Engine configuration.

use std::path::Path;

use serde::Deserialize;

use riposte_speech::SpeechConfig;

/// Errors that can occur when loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Dispatcher tuning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Seed for the segment tie-break RNG, for reproducible runs.
    pub seed: u64,
}

/// Top-level engine configuration. Every field has a default, so an
/// empty file (or no file at all) yields a working setup.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RiposteConfig {
    /// Speaker scheduler parameters.
    pub speech: SpeechConfig,
    /// Dispatcher parameters.
    pub dispatcher: DispatcherConfig,
}

impl RiposteConfig {
    /// Load a configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::parse(&contents)?)
    }

    /// Parse a configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(yaml)
    }
}
