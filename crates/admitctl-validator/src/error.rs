//! Error types for request validation and security analysis.

use thiserror::Error;

/// Result type alias for validator operations.
pub type Result<T> = std::result::Result<T, ValidatorError>;

#[derive(Debug, Error)]
pub enum ValidatorError {
    /// A `ValidationConfig` was built with an invalid combination of fields.
    #[error("invalid validation config: {0}")]
    InvalidConfig(String),

    /// The pattern library failed to compile.
    #[error(transparent)]
    Pattern(#[from] admitctl_patterns::PatternError),

    /// Internal error, not attributable to the request itself.
    #[error("validator internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_display() {
        let err = ValidatorError::InvalidConfig("max_headers_count must be >= 1".to_string());
        assert!(err.to_string().contains("max_headers_count"));
    }
}
