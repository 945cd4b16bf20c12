//! Command implementations.

pub mod cache;
pub mod sync;
pub mod zoho;

use serde::Serialize;
use thiserror::Error;
use tsh_storefront::config::{ConfigError, PortalConfig};
use tsh_storefront::state::{AppState, StateError};

/// Errors that can occur before a command runs.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Environment is incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Clients could not be built.
    #[error("Initialization error: {0}")]
    State(#[from] StateError),
}

/// Build the same state the server uses.
///
/// # Errors
///
/// Returns `SetupError` if configuration or client setup fails.
pub fn load_state() -> Result<AppState, SetupError> {
    let config = PortalConfig::from_env()?;
    Ok(AppState::new(config)?)
}

/// Write a value to stdout as pretty JSON.
///
/// # Errors
///
/// Returns `serde_json::Error` if the value cannot be serialized.
#[allow(clippy::print_stdout)]
pub fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
