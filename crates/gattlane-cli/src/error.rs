//! Error handling for the gattlane CLI

use gattlane_core::{BleError, Failure};
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Ble(#[from] BleError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),
}

impl CliError {
    /// Structured failure printed for the caller
    pub fn to_failure(&self) -> Failure {
        match self {
            CliError::Ble(e) => Failure::from(e),
            other => Failure {
                kind: match other {
                    CliError::Config(_) | CliError::TomlParsing(_) => "config",
                    CliError::InvalidArgument(_) => "invalid_argument",
                    CliError::Io(_) => "io",
                    _ => "serialization",
                }
                .to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ble_errors_keep_their_kind() {
        let failure = CliError::from(BleError::PermissionDenied).to_failure();
        assert_eq!(failure.kind, "permission_denied");
    }

    #[test]
    fn test_argument_errors_have_their_own_kind() {
        let failure = CliError::InvalidArgument("bad".into()).to_failure();
        assert_eq!(failure.kind, "invalid_argument");
        assert_eq!(failure.message, "Invalid argument: bad");
    }
}
