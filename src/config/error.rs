//! Error type for the configuration engine.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by loading, saving and watching configuration.
///
/// Validation problems are never reported here; they come back as a
/// [`ValidationResult`](crate::config::validation::ValidationResult).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Unsupported config format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("Parse error in {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Serialize error: {0}")]
    Serialize(String),

    #[error("Invalid environment name: {0:?}")]
    InvalidEnvironment(String),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Config manager has been destroyed")]
    Destroyed,
}

impl ConfigError {
    pub(crate) fn parse(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        ConfigError::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
