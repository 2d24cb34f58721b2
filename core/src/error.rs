//! Error taxonomy for the Recurly client.
//!
//! # Design
//! The remote API reuses the same status codes and similar XML shapes for
//! several failure modes, so the classifier maps them onto a closed set of
//! variants callers can match on:
//!
//! - `Validation`: 4xx field errors (possibly zero of them).
//! - `TransactionFailed`: 4xx caused by a payment attempt; carries the
//!   customer-facing message callers must show verbatim.
//! - `RateLimited`: 429, described entirely by response headers.
//! - `Server`: 5xx, body never parsed.
//!
//! `Decode` is kept separate from all of them: "the server said the input is
//! wrong" must never be confused with "we could not read what the server
//! said". Nothing here is retried internally.

use serde::Serialize;
use thiserror::Error;

use crate::resources::transactions::{Transaction, TransactionError};
use crate::response::RateLimit;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by every client operation.
#[derive(Debug, Error)]
pub enum Error {
    /// The request body could not be serialized; nothing was sent.
    #[error("failed to encode request body: {0}")]
    Encode(String),

    /// The response body could not be parsed into the expected shape.
    #[error("failed to decode response body: {0}")]
    Decode(String),

    /// The server rejected the request with a 4xx status other than 429.
    #[error("{}", describe_validation(*status, errors))]
    Validation {
        status: u16,
        errors: Vec<ValidationError>,
        rate_limit: RateLimit,
    },

    /// A payment attempt was declined or failed at the gateway.
    #[error("transaction failed: {}", .0.error)]
    TransactionFailed(Box<TransactionFailure>),

    /// The server returned 429; back off until `reset_at`.
    #[error("rate limit exceeded ({} requests, resets at {})", .0.limit, describe_reset(.0))]
    RateLimited(RateLimit),

    /// The server returned a 5xx status.
    #[error("server error: HTTP {status}")]
    Server { status: u16, rate_limit: RateLimit },

    /// The call's cancellation token fired.
    #[error("request canceled")]
    Canceled,

    /// The call's deadline passed before the response arrived.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The HTTP round-trip itself failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// `Pager::fetch` was called after the last page.
    #[error("no more results")]
    NoMoreResults,

    /// The client configuration is incomplete or malformed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A resource identifier cannot be used as a single path segment.
    #[error("invalid resource identifier {0:?}")]
    InvalidIdentifier(String),
}

impl Error {
    /// The rate-limit snapshot observed on the failing response, if any.
    pub fn rate_limit(&self) -> Option<&RateLimit> {
        match self {
            Error::Validation { rate_limit, .. } | Error::Server { rate_limit, .. } => Some(rate_limit),
            Error::RateLimited(rate_limit) => Some(rate_limit),
            Error::TransactionFailed(failure) => Some(&failure.rate_limit),
            _ => None,
        }
    }

    /// HTTP status of a classified API error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Validation { status, .. } | Error::Server { status, .. } => Some(*status),
            Error::TransactionFailed(failure) => Some(failure.status),
            Error::RateLimited(_) => Some(429),
            _ => None,
        }
    }

    /// Whether the same request may succeed later without changes.
    ///
    /// Informational only: the client never retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Server { .. } | Error::RateLimited(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Validation { status: 404, .. })
    }

    /// Field errors carried by a validation or transaction failure.
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            Error::Validation { errors, .. } => errors,
            Error::TransactionFailed(failure) => &failure.errors,
            _ => &[],
        }
    }
}

/// One field-level complaint from the server.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ValidationError {
    /// Dotted field path such as `account.email`; empty for request-level errors.
    pub field: String,
    pub symbol: String,
    pub description: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.field.is_empty() {
            write!(f, "{} ({})", self.description, self.symbol)
        } else {
            write!(f, "{} {} ({})", self.field, self.description, self.symbol)
        }
    }
}

/// Details of a failed payment attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionFailure {
    pub status: u16,
    pub rate_limit: RateLimit,
    /// Snapshot of the attempted transaction, when the server included one.
    pub transaction: Option<Transaction>,
    pub error: TransactionError,
    pub errors: Vec<ValidationError>,
}

fn describe_validation(status: u16, errors: &[ValidationError]) -> String {
    if errors.is_empty() {
        return format!("request rejected: HTTP {status}");
    }
    let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
    format!("request rejected: HTTP {status}: {}", details.join("; "))
}

fn describe_reset(rate_limit: &RateLimit) -> String {
    rate_limit
        .reset_at
        .map_or_else(|| "an unknown time".to_string(), |at| at.to_rfc3339())
}
