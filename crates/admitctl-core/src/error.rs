//! Error taxonomy for the admission-control pipeline.
//!
//! Distinct from [`admitctl_validator::ErrorKind`], which labels *why a
//! request was rejected*. This taxonomy instead labels *pipeline
//! infrastructure failures*: construction-time errors are fatal, hot-path
//! errors degrade gracefully and never reach the caller as an `Err`.

use thiserror::Error;

/// Pipeline result type alias.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid configuration discovered at construction time. Fatal.
    #[error("pipeline config error: {0}")]
    ConfigError(String),

    /// A storage backend call failed but is expected to succeed on retry
    /// (e.g. a transient connection error). Retried once, then degrades.
    #[error("transient storage error: {0}")]
    StoreTransient(String),

    /// A storage backend call failed persistently. The pipeline degrades
    /// and logs at most once per minute rather than retrying indefinitely.
    #[error("persistent storage error: {0}")]
    StorePersistent(String),

    /// An attack pattern failed to compile. Construction-time only, fatal.
    #[error(transparent)]
    PatternCompileError(#[from] admitctl_patterns::PatternError),

    /// The threat-intelligence snapshot could not be written. Logged and
    /// retried on the next scheduled flush; never fatal.
    #[error("snapshot write error: {0}")]
    SnapshotWriteError(String),

    /// Passthrough from the rate-limit rule builder (invalid rule
    /// definitions are a construction-time configuration error).
    #[error(transparent)]
    RateLimit(#[from] admitctl_ratelimit::RateLimitError),

    /// Passthrough from the validator (invalid `ValidationConfig`).
    #[error(transparent)]
    Validator(#[from] admitctl_validator::ValidatorError),

    /// `rate_limit_storage` selected `StorageBackend::Redis` but this build
    /// was not compiled with the `redis-backend` feature.
    #[error("redis storage backend requested but the redis-backend feature is not enabled")]
    RedisBackendDisabled,
}
