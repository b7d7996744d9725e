//! Error types for the tracking client.
//!
//! Only [`RideRequestError`] is ever shown to the user. Everything else is
//! classified, logged, and folded into a well-formed fallback value by the
//! component that observed it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for remote collaborator calls.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Failure taxonomy for remote reads and writes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrackerError {
    // ═══════════════════════════════════════════════════════════
    // Expected outcomes
    // ═══════════════════════════════════════════════════════════

    /// The requested record does not exist (a new user has no subscription).
    #[error("Not found")]
    NotFound,

    // ═══════════════════════════════════════════════════════════
    // Recoverable failures
    // ═══════════════════════════════════════════════════════════

    /// The remote call did not finish within its budget.
    #[error("Timed out")]
    Timeout,

    /// Network failure, server error, or throttling.
    #[error("Transient failure: {0}")]
    Transient(String),

    // ═══════════════════════════════════════════════════════════
    // Untrusted data
    // ═══════════════════════════════════════════════════════════

    /// Malformed payload or rejected request.
    #[error("Invalid response: {0}")]
    Invalid(String),
}

impl TrackerError {
    /// Classify an HTTP status code and response body.
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            404 => Self::NotFound,
            408 | 504 => Self::Timeout,
            429 | 500..=599 => Self::Transient(format!("HTTP {status}: {body}")),
            _ => Self::Invalid(format!("HTTP {status}: {body}")),
        }
    }

    /// `NotFound` and `Invalid` both mean "no trustworthy record exists".
    #[must_use]
    pub const fn is_not_found_like(&self) -> bool {
        matches!(self, Self::NotFound | Self::Invalid(_))
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::Transient(_) => "transient",
            Self::Invalid(_) => "invalid",
        }
    }
}

impl From<reqwest::Error> for TrackerError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::Invalid(error.to_string())
        } else if let Some(status) = error.status() {
            Self::from_status(status.as_u16(), &error.to_string())
        } else {
            Self::Transient(error.to_string())
        }
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(error: serde_json::Error) -> Self {
        Self::Invalid(error.to_string())
    }
}

/// Errors from locally persisted data (key/value cache, vehicle dataset).
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem failure.
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored blob could not be encoded or decoded.
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend refused the write (used by in-memory stores).
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Errors from the realtime transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Could not establish the connection.
    #[error("Connect failed: {0}")]
    Connect(String),

    /// The peer closed the connection or it dropped.
    #[error("Connection closed: {0}")]
    Closed(String),

    /// A frame could not be decoded.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// The one user-visible failure: a ride request that did not go through.
///
/// Every variant is recoverable; the user may retry.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RideRequestError {
    /// No active, verified entitlement.
    #[error("An active subscription is required to request a ride")]
    NotEntitled,

    /// Destination name missing or coordinates out of range.
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    /// Another ride is still active.
    #[error("A ride is already in progress")]
    RideInProgress,

    /// The backend did not accept the request.
    #[error("Ride request failed: {reason}")]
    SubmissionFailed {
        /// Why the submission failed
        reason: String,
        /// Whether retrying may succeed
        retryable: bool,
    },
}
