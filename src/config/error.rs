//! Manifest error types.

use std::path::PathBuf;
use thiserror::Error;

/// Manifest-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("manifest parsing error")]
    Yaml(#[from] serde_yaml::Error),

    #[error("manifest validation error: {0}")]
    Validation(String),
}
