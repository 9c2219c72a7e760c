//! LanChat CLI library
//!
//! Wiring and terminal interface around `lanchat-core`: command line parsing,
//! application startup and the ratatui chat screen.

pub mod app;
pub mod cli;
pub mod error;
pub mod tui;

pub use app::ChatApp;
pub use cli::Cli;
pub use error::{CliError, Result};
