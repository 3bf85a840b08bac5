//! Logging errors

use thiserror::Error;

/// Result type for logger setup
pub type LogResult<T> = Result<T, LogError>;

/// Errors raised while configuring or installing the logger
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    /// The filter directive could not be parsed
    #[error("Invalid log filter: {0}")]
    Filter(String),

    /// The global subscriber could not be installed (usually: already set)
    #[error("Failed to install logger: {0}")]
    Init(String),

    /// A runtime reconfiguration failed
    #[error("Logger configuration error: {0}")]
    Config(String),
}
