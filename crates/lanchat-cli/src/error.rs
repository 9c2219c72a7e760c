//! Error handling for the LanChat CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("LanChat core error: {0}")]
    Core(#[from] lanchat_core::ChatError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("UI error: {0}")]
    UI(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

impl From<lanchat_core::ConfigError> for CliError {
    fn from(err: lanchat_core::ConfigError) -> Self {
        CliError::Config(err.to_string())
    }
}

impl From<lanchat_core::ListenerError> for CliError {
    fn from(err: lanchat_core::ListenerError) -> Self {
        CliError::Core(err.into())
    }
}
