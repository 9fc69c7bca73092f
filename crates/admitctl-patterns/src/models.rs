//! # Core Types for Attack Pattern Classification
//!
//! Defines the attack taxonomy, severity tiers, and error types shared by
//! the sanitiser and pattern library.
//!
//! ## Threat Model
//!
//! The type system encodes a fixed nine-category attack taxonomy mapped to
//! OWASP Top 10 2021 categories. Unlike a free-form tag set, the category
//! list is closed: adding a new attack class means adding a variant and an
//! accompanying pattern table, not a runtime registration call.
//!
//! ## Design Principles
//!
//! 1. **Closed Classification** - every detected pattern maps to a fixed variant
//! 2. **Ordered Severity** - [`ThreatLevel`] derives `Ord` so levels compare directly
//! 3. **Serializable** - all types derive Serde traits for logging and audit trails

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The nine attack categories the pattern library recognizes.
///
/// | Variant | OWASP Mapping |
/// |---------|----------------|
/// | `SqlInjection` | A03:2021-Injection |
/// | `Xss` | A03:2021-Injection |
/// | `PathTraversal` | A01:2021-Broken Access Control |
/// | `CommandInjection` | A03:2021-Injection |
/// | `LdapInjection` | A03:2021-Injection |
/// | `XmlInjection` | A05:2021-Security Misconfiguration |
/// | `Csrf` | A01:2021-Broken Access Control |
/// | `HeaderInjection` | A03:2021-Injection |
/// | `NoSqlInjection` | A03:2021-Injection |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttackCategory {
    SqlInjection,
    Xss,
    PathTraversal,
    CommandInjection,
    LdapInjection,
    XmlInjection,
    Csrf,
    HeaderInjection,
    NoSqlInjection,
}

impl AttackCategory {
    pub const ALL: [AttackCategory; 9] = [
        AttackCategory::SqlInjection,
        AttackCategory::Xss,
        AttackCategory::PathTraversal,
        AttackCategory::CommandInjection,
        AttackCategory::LdapInjection,
        AttackCategory::XmlInjection,
        AttackCategory::Csrf,
        AttackCategory::HeaderInjection,
        AttackCategory::NoSqlInjection,
    ];

    /// Returns the OWASP Top 10 (2021) category this attack maps to.
    pub const fn owasp_category(self) -> &'static str {
        match self {
            AttackCategory::PathTraversal | AttackCategory::Csrf => {
                "A01:2021-Broken Access Control"
            }
            AttackCategory::XmlInjection => "A05:2021-Security Misconfiguration",
            _ => "A03:2021-Injection",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            AttackCategory::SqlInjection => "sql_injection",
            AttackCategory::Xss => "xss",
            AttackCategory::PathTraversal => "path_traversal",
            AttackCategory::CommandInjection => "command_injection",
            AttackCategory::LdapInjection => "ldap_injection",
            AttackCategory::XmlInjection => "xml_injection",
            AttackCategory::Csrf => "csrf",
            AttackCategory::HeaderInjection => "header_injection",
            AttackCategory::NoSqlInjection => "nosql_injection",
        }
    }
}

impl fmt::Display for AttackCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity tier attached to a single matched pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
            RiskTier::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Aggregate threat level, ordered from `None` to `Critical`.
///
/// Deriving `Ord` gives callers a total order: folding several independent
/// signals into one level is a plain `max`, not a lookup-table scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum ThreatLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    pub const fn from_tier(tier: RiskTier) -> Self {
        match tier {
            RiskTier::Low => ThreatLevel::Low,
            RiskTier::Medium => ThreatLevel::Medium,
            RiskTier::High => ThreatLevel::High,
            RiskTier::Critical => ThreatLevel::Critical,
        }
    }

    /// `true` for the two levels that warrant rejecting a request outright.
    pub const fn is_blocking(self) -> bool {
        matches!(self, ThreatLevel::High | ThreatLevel::Critical)
    }
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ThreatLevel::None => "none",
            ThreatLevel::Low => "low",
            ThreatLevel::Medium => "medium",
            ThreatLevel::High => "high",
            ThreatLevel::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// A single pattern hit against an input string.
///
/// # Example
///
/// ```rust
/// use admitctl_patterns::{AttackCategory, PatternMatch, RiskTier};
///
/// fn handle(m: &PatternMatch) {
///     if m.tier >= RiskTier::High {
///         eprintln!("blocking on {} at offset {}", m.category, m.offset);
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub category: AttackCategory,
    pub tier: RiskTier,
    pub description: &'static str,
    /// Byte offset of the match within the scanned input.
    pub offset: usize,
}

/// Errors raised compiling or running the pattern library.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("pattern source did not compile: {0}")]
    Compile(#[from] regex::Error),
    #[error("input exceeded maximum scan length of {max} bytes (was {size})")]
    TooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, PatternError>;

/// Errors raised sanitising a value before it is logged or stored.
#[derive(Debug, Error)]
pub enum SanitizeError {
    /// Input contains invalid UTF-8 sequences.
    #[error("input was not valid UTF-8")]
    InvalidUtf8,

    /// Value exceeds the configured maximum length for sanitisation.
    #[error("input exceeded {max} bytes (was {size})")]
    TooLarge { size: usize, max: usize },
}
