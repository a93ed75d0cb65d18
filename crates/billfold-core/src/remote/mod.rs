//! Remote invoice source boundary
//!
//! The remote is a thin port: no caching and no retries happen here. The sync
//! coordinator owns retry, backoff and timeouts; this module only defines the
//! typed results a source hands back.

mod http;

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::models::{Invoice, InvoiceFilter, InvoiceId, VersionToken};

pub use http::HttpRemoteSource;

/// Infrastructure failure talking to the remote, never a domain answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportError {
    /// Connection refused, DNS failure, no network
    Unreachable(String),
    /// The call did not complete within the configured timeout
    Timeout,
    /// The server answered with an error status
    Server { status: u16, message: String },
    /// The response could not be understood
    Malformed(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable(message) => write!(f, "remote unreachable: {message}"),
            Self::Timeout => f.write_str("remote call timed out"),
            Self::Server { status, message } if message.is_empty() => {
                write!(f, "server error (HTTP {status})")
            }
            Self::Server { status, message } => {
                write!(f, "server error (HTTP {status}): {message}")
            }
            Self::Malformed(message) => write!(f, "malformed response: {message}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Classify an HTTP status that is not a domain answer.
///
/// Anything reaching this point is the server's problem; success and redirect
/// codes never get here.
pub fn classify_status(status: u16, message: impl Into<String>) -> TransportError {
    TransportError::Server {
        status,
        message: message.into(),
    }
}

/// Result type for remote calls
pub type RemoteResult<T> = std::result::Result<T, TransportError>;

/// An invoice as published by the remote, with its version token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteInvoice {
    pub invoice: Invoice,
    pub version: VersionToken,
}

/// Answer to a single-record fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Found(RemoteInvoice),
    /// The caller's version token is still current
    NotModified,
    NotFound,
}

/// Answer to a push
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted(VersionToken),
    /// Business-rule rejection, reason verbatim from the server
    Rejected(String),
}

/// Answer to a removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Accepted,
    NotFound,
}

/// Network-backed invoice provider
///
/// Implementations must be cheap to share; the coordinator keeps one behind an
/// `Arc` and calls it from spawned tasks.
pub trait RemoteSource: Send + Sync + 'static {
    /// Identity of this source, recorded by the local store to detect a
    /// switch to a different backend.
    fn source_name(&self) -> String;

    /// Fetch one invoice; `known` enables a conditional request.
    fn fetch(
        &self,
        id: InvoiceId,
        known: Option<&VersionToken>,
    ) -> impl Future<Output = RemoteResult<FetchOutcome>> + Send;

    /// Fetch every invoice matching `filter`.
    fn fetch_all(
        &self,
        filter: &InvoiceFilter,
    ) -> impl Future<Output = RemoteResult<Vec<RemoteInvoice>>> + Send;

    /// Publish a local revision; `base` is the version it was edited from.
    fn push(
        &self,
        invoice: &Invoice,
        base: Option<&VersionToken>,
    ) -> impl Future<Output = RemoteResult<PushOutcome>> + Send;

    fn remove(&self, id: InvoiceId) -> impl Future<Output = RemoteResult<RemoveOutcome>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_status() {
        let error = classify_status(503, "maintenance");
        assert_eq!(error.to_string(), "server error (HTTP 503): maintenance");
        assert_eq!(
            classify_status(500, "").to_string(),
            "server error (HTTP 500)"
        );
    }
}
