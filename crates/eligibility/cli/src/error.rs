//! CLI error types

use eligibility_gate::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    /// Gate configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<eligibility_types::ParseError> for CliError {
    fn from(e: eligibility_types::ParseError) -> Self {
        CliError::InvalidInput(e.to_string())
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
