//! Request structure validation and signal-based threat scoring (C4 + C5).
//!
//! [`analyser::SecurityAnalyser`] (C4) folds pattern matches, a behavioural
//! heuristic, and client reputation into one [`models::SecurityAssessment`].
//! [`validator::HttpValidator`] (C5) runs the fixed structural checks ahead
//! of it and turns the combined result into a [`models::ValidationResult`]
//! the pipeline coordinator can act on.
//!
//! ```rust
//! use admitctl_patterns::{PatternLibrary, Sanitiser};
//! use admitctl_threatintel::ThreatIntelStore;
//! use admitctl_validator::{HttpValidator, Request, SecurityAnalyser, ValidationConfig};
//! use std::sync::Arc;
//!
//! let sanitiser = Arc::new(Sanitiser::new());
//! let analyser = SecurityAnalyser::new(
//!     PatternLibrary::new().unwrap(),
//!     Arc::new(ThreatIntelStore::in_memory()),
//!     sanitiser.clone(),
//! );
//! let validator = HttpValidator::new(ValidationConfig::default(), analyser, sanitiser).unwrap();
//! let request = Request::new("GET", "/api/widgets").with_client_addr("203.0.113.9");
//! let result = validator.validate(&request);
//! assert!(result.is_valid);
//! ```

pub mod analyser;
pub mod error;
pub mod models;
pub mod request;
pub mod validator;

pub use analyser::SecurityAnalyser;
pub use error::{Result, ValidatorError};
pub use models::{
    ErrorKind, RecommendedAction, SanitisedSnapshot, SecurityAssessment, ValidationConfig, ValidationResult,
};
pub use request::{Headers, Request};
pub use validator::HttpValidator;
