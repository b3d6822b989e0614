//! Error taxonomy shared by the readiness and search layers.
//!
//! Readiness probing never lets these escape individually: network and
//! not-ready failures are retried inside the retry loop and only a persistent
//! failure past the deadline surfaces as [`ClientError::Timeout`]. Search and
//! report retrieval surface them immediately as a visible message.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the client core.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The request could not complete (connection refused, DNS, timeout on
    /// the socket, non-success HTTP status).
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered with a valid payload that reports it is not ready.
    #[error("backend not ready: {0}")]
    BackendNotReady(String),

    /// The backend answered with a valid payload that reports an explicit
    /// failure, or the payload could not be parsed.
    #[error("backend error: {0}")]
    Backend(String),

    /// The global readiness deadline elapsed.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The response belongs to a superseded request. Never shown to users.
    #[error("stale response discarded")]
    Stale,

    /// Input rejected before any request was issued.
    #[error("{0}")]
    Validation(String),

    /// The owning component was torn down while the work was in flight.
    #[error("cancelled")]
    Cancelled,
}

impl ClientError {
    /// Whether this error should be shown to the user at all.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, ClientError::Stale | ClientError::Cancelled)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Backend(format!("malformed payload: {}", err))
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;
