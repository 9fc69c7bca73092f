//! # Sanitisation and Attack-Pattern Matching
//!
//! The base layer of the admission-control pipeline. It owns no state that
//! outlives a single call except a process-fixed IP-hashing salt, and
//! depends on nothing else in the workspace — every other crate builds on
//! top of the types defined here.
//!
//! ## Responsibilities
//!
//! 1. **Sanitisation** ([`Sanitiser`]) - redacting sensitive substrings,
//!    header values, and query parameters before they reach a log line or a
//!    metrics label, and hashing client IPs so raw addresses never persist.
//! 2. **Pattern matching** ([`PatternLibrary`]) - pre-compiled, categorised
//!    regex matchers for the nine recognised attack families.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                    admitctl-patterns                       │
//! ├───────────────────────────────────────────────────────────┤
//! │  ┌──────────────────┐        ┌───────────────────────┐    │
//! │  │    Sanitiser      │        │    PatternLibrary      │    │
//! │  │                    │        │                         │    │
//! │  │ sanitise_text      │        │ sql/xss/path/cmd/ldap/ │    │
//! │  │ sanitise_headers   │        │ xml/csrf/header/nosql  │    │
//! │  │ sanitise_params    │        │ categories, pre-built  │    │
//! │  │ hash_ip            │        │ at construction time   │    │
//! │  └──────────────────┘        └───────────────────────┘    │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use admitctl_patterns::{PatternLibrary, Sanitiser};
//!
//! let sanitiser = Sanitiser::new();
//! let redacted = sanitiser.sanitise_text("email me at jane@example.com");
//! assert!(redacted.contains("[REDACTED]"));
//!
//! let patterns = PatternLibrary::new().expect("pattern library compiles");
//! let hits = patterns.categories_in("id=1' OR 1=1--");
//! assert!(!hits.is_empty());
//! ```

pub mod models;
pub mod patterns;
pub mod sanitiser;

pub use models::{AttackCategory, PatternError, PatternMatch, Result, RiskTier, SanitizeError, ThreatLevel};
pub use patterns::PatternLibrary;
pub use sanitiser::{truncate_with_ellipsis, Sanitiser};
