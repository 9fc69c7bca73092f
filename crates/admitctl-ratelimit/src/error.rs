//! Error types for rate-limit storage and rule evaluation.

use thiserror::Error;

/// Result type alias for rate-limit operations.
pub type Result<T> = std::result::Result<T, RateLimitError>;

/// Errors that can occur building rules or talking to a storage backend.
///
/// # Fail-open policy
///
/// `StorageUnavailable` is recoverable by design: callers degrade to an
/// `allowed = true` decision with rule name `degraded` rather than
/// propagating the error, per the rate limiter's fail-open contract. It is
/// exposed here so storage backends have somewhere to report it and so
/// tests can assert the degrade path actually triggers.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// A rule was constructed with an invalid combination of fields.
    #[error("invalid rate-limit rule {name:?}: {reason}")]
    InvalidRule { name: String, reason: String },

    /// The storage backend failed to answer a read or write within budget.
    #[error("rate-limit storage unavailable: {0}")]
    StorageUnavailable(String),
}
