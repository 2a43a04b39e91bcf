//! Error types for the config module.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while building or writing cluster config.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid config document: {0}")]
    Parse(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
