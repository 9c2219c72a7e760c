//! Error types for the LanChat core
//!
//! Each component owns a narrow error enum so that callers can decide which
//! failures are fatal. Only [`ListenerError`] and [`ConfigError`] are allowed to
//! end the process; directory and delivery failures are contained and reported.

use std::net::SocketAddr;

use thiserror::Error;

// ----------------------------------------------------------------------------
// Component Errors
// ----------------------------------------------------------------------------

/// Failure to read the neighbor table
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Neighbor table command `{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Neighbor table command is empty")]
    EmptyCommand,

    #[error("Neighbor table I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single delivery attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("Delivery cancelled")]
    Cancelled,
}

/// Failure of the receiving endpoint
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Failed to bind receiving endpoint {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Receiving path must start with '/', got {0:?}")]
    InvalidPath(String),

    #[error("Receiving endpoint stopped: {0}")]
    Serve(#[source] std::io::Error),
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

// ----------------------------------------------------------------------------
// Unified Error
// ----------------------------------------------------------------------------

/// Core error type for LanChat
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, ChatError>;
