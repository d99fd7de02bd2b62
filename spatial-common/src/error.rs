//! Common error types for spatial reconciliation

use thiserror::Error;

/// Common result type for spatial operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by every reconciliation component
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid input (empty ID, degenerate boundary, building mismatch,
    /// unknown aspect or query type). Raised before any mutation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown equipment, session, region or anchor
    #[error("Not found: {0}")]
    NotFound(String),

    /// Change refused by the sync policy. The change itself carries the
    /// same reason in its `rejection_reason` field.
    #[error("Change rejected: {0}")]
    Rejected(String),

    /// Authoritative-store or persistence collaborator failure
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Error {
    /// Shorthand for a validation failure
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Shorthand for a missing entity
    pub fn not_found(kind: &str, id: &str) -> Self {
        Error::NotFound(format!("{} '{}'", kind, id))
    }

    /// True for errors raised by input validation
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// True for unknown-entity errors
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_names_kind_and_id() {
        let err = Error::not_found("session", "S1");
        assert_eq!(err.to_string(), "Not found: session 'S1'");
        assert!(err.is_not_found());
        assert!(!err.is_validation());
    }

    #[test]
    fn test_validation_helper() {
        let err = Error::validation("boundary needs at least 3 points");
        assert!(err.is_validation());
        assert!(err.to_string().contains("at least 3 points"));
    }
}
