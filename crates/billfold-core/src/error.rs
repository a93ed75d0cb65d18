//! Error types for billfold-core

use thiserror::Error;

use crate::models::InvoiceId;
use crate::remote::TransportError;

/// Result type alias using billfold-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in billfold-core operations
///
/// `Clone` so that a single sync outcome can be handed to every caller
/// attached to the same in-flight fetch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Invoice absent at the source
    #[error("Invoice not found: {0}")]
    NotFound(InvoiceId),

    /// Model invariant violated before any I/O happened
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Network, timeout or malformed response
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Server-side business rule rejected a push
    #[error("Invoice {id} rejected by remote: {reason}")]
    Rejected {
        /// Rejected invoice
        id: InvoiceId,
        /// Reason as reported by the remote, verbatim
        reason: String,
    },

    /// Local and remote state diverged and needs a decision
    #[error("Invoice {0} has an unresolved sync conflict")]
    Conflict(InvoiceId),

    /// Local persistence I/O error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Local persistence constraint violation (do not retry blindly)
    #[error("Storage constraint violated: {0}")]
    Constraint(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// An in-flight sync ended without producing a result
    #[error("Sync interrupted: {0}")]
    Interrupted(String),
}

impl Error {
    /// Whether the sync coordinator may retry the failed operation.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(error: rusqlite::Error) -> Self {
        match error.sqlite_error_code() {
            Some(rusqlite::ErrorCode::ConstraintViolation) => Self::Constraint(error.to_string()),
            _ => Self::Storage(error.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_are_retryable() {
        assert!(Error::Transport(TransportError::Timeout).is_retryable());
        assert!(!Error::Validation("bad".into()).is_retryable());
        assert!(!Error::Rejected {
            id: InvoiceId::new(),
            reason: "closed period".into(),
        }
        .is_retryable());
        assert!(!Error::Storage("disk".into()).is_retryable());
    }

    #[test]
    fn sqlite_constraint_maps_to_constraint() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id TEXT PRIMARY KEY); INSERT INTO t VALUES ('a');")
            .unwrap();
        let error: Error = conn
            .execute("INSERT INTO t VALUES ('a')", [])
            .unwrap_err()
            .into();
        assert!(matches!(error, Error::Constraint(_)));
    }
}
