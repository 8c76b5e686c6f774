//! Store error types and retryability classification.
//!
//! Single source of truth for the failure kinds the engine reacts to.
//! Drivers map their native errors into [`StoreError`]; the engine never
//! sees driver-specific types.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Precondition failed: etag mismatch")]
    PreconditionFailed,

    #[error("Conflict: item already exists: {0}")]
    Conflict(String),

    #[error("Rate limited by the store")]
    RateLimited {
        /// Server-supplied hint for when to retry.
        retry_after: Option<Duration>,
    },

    #[error("Store unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Server error (status {status}): {message}")]
    Server { status: u16, message: String },
}

/// Stable, language-neutral failure kind surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    PreconditionFailed,
    Conflict,
    RateLimited,
    ServiceUnavailable,
    Timeout,
    BadRequest,
    Unauthorized,
    QueryFailed,
    ServerError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not-found",
            ErrorKind::PreconditionFailed => "precondition-failed",
            ErrorKind::Conflict => "conflict",
            ErrorKind::RateLimited => "rate-limited",
            ErrorKind::ServiceUnavailable => "service-unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::BadRequest => "bad-request",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::QueryFailed => "query-failed",
            ErrorKind::ServerError => "server-error",
        }
    }
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::PreconditionFailed => ErrorKind::PreconditionFailed,
            StoreError::Conflict(_) => ErrorKind::Conflict,
            StoreError::RateLimited { .. } => ErrorKind::RateLimited,
            StoreError::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            StoreError::Timeout(_) => ErrorKind::Timeout,
            StoreError::BadRequest(_) => ErrorKind::BadRequest,
            StoreError::Unauthorized(_) => ErrorKind::Unauthorized,
            StoreError::QueryFailed(_) => ErrorKind::QueryFailed,
            StoreError::Server { .. } => ErrorKind::ServerError,
        }
    }

    /// Default retryability: rate limiting, unavailability, timeouts and
    /// 5xx responses except 501 (Not Implemented never heals on retry).
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::RateLimited { .. }
            | StoreError::ServiceUnavailable(_)
            | StoreError::Timeout(_) => true,
            StoreError::Server { status, .. } => *status >= 500 && *status != 501,
            _ => false,
        }
    }

    /// Retry-after hint, when the store provided one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            StoreError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}
