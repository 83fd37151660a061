//! TOML loading and validation for `RunConfig`.
//!
//! The core defines the configuration shape; this module reads it from disk,
//! fills defaults through serde and rejects anything `resolve` would refuse,
//! so a bad file fails before a single record is read.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use tandem_core::config::RunConfig;
use tandem_core::mode::{resolve, EngineFatalError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(#[from] EngineFatalError),
}

/// Parse and validate a configuration document.
pub fn parse_config(content: &str) -> Result<RunConfig, ConfigError> {
    let config: RunConfig = toml::from_str(content)?;
    resolve(&config)?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<RunConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

pub fn to_toml(config: &RunConfig) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(config)?)
}
