//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration could not be loaded or is invalid
    #[error("Invalid configuration: {0}")]
    Config(#[from] contracts::ContractError),

    /// Source or sinks could not be brought up
    #[error("Failed to set up pipeline: {message}")]
    Setup { message: String },

    /// The capture device failed while streaming
    #[error("Capture device failed: {message}")]
    DeviceFailure { message: String },

    /// Teardown did not complete cleanly
    #[error("Error during shutdown: {message}")]
    Shutdown { message: String },

    /// Generic error wrapper
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn setup(message: impl Into<String>) -> Self {
        Self::Setup {
            message: message.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
