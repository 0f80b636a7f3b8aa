//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Courier
#[derive(Error, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum CourierError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Courier operations
pub type Result<T> = std::result::Result<T, CourierError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_context() {
        let err = CourierError::Config("destination 'slack' is disabled".into());
        assert_eq!(err.to_string(), "Configuration error: destination 'slack' is disabled");
    }

    #[test]
    fn error_serializes_with_tag() {
        let err = CourierError::Database("locked".into());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "Database");
        assert_eq!(json["message"], "locked");
    }
}
