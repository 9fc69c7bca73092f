//! Categorised, pre-compiled attack-pattern matchers (C2).
//!
//! Categories are a fixed set — the names are externally visible as metrics
//! labels, so they are never derived at runtime. Each category carries a
//! [`RiskTier`] consumed by the security analyser when folding matches into
//! a threat score.

use crate::models::{AttackCategory, PatternError, PatternMatch, Result, RiskTier};
use regex::Regex;

/// A single compiled pattern with its category and human-readable description.
struct CompiledPattern {
    category: AttackCategory,
    tier: RiskTier,
    description: &'static str,
    regex: Regex,
}

fn tier_for(category: AttackCategory) -> RiskTier {
    match category {
        AttackCategory::SqlInjection
        | AttackCategory::CommandInjection
        | AttackCategory::XmlInjection => RiskTier::High,
        AttackCategory::Xss | AttackCategory::PathTraversal | AttackCategory::HeaderInjection => {
            RiskTier::Medium
        }
        AttackCategory::LdapInjection | AttackCategory::NoSqlInjection | AttackCategory::Csrf => {
            RiskTier::Low
        }
    }
}

/// `(category, description, regex source)` triples defining the library.
///
/// Sourced from the project's original attack-pattern tables, one regex per
/// recognised attack shape within a category.
const PATTERN_SOURCES: &[(AttackCategory, &str, &str)] = &[
    // SQL injection
    (AttackCategory::SqlInjection, "union select", r"(?i)\bunion\b.*\bselect\b"),
    (AttackCategory::SqlInjection, "select from", r"(?i)\bselect\b.*\bfrom\b"),
    (AttackCategory::SqlInjection, "insert into", r"(?i)\binsert\b.*\binto\b"),
    (AttackCategory::SqlInjection, "delete from", r"(?i)\bdelete\b.*\bfrom\b"),
    (AttackCategory::SqlInjection, "drop table", r"(?i)\bdrop\b.*\btable\b"),
    (AttackCategory::SqlInjection, "update set", r"(?i)\bupdate\b.*\bset\b"),
    (AttackCategory::SqlInjection, "tautology or", r"(?i)\bor\b.*1\s*=\s*1"),
    (AttackCategory::SqlInjection, "tautology and", r"(?i)\band\b.*1\s*=\s*1"),
    (AttackCategory::SqlInjection, "quoted boolean", r"(?i)'.*(\bor\b|\band\b).*'"),
    (AttackCategory::SqlInjection, "stacked query", r"(?i);\s*(drop|delete|insert|update)"),
    // XSS
    (AttackCategory::Xss, "script tag open", r"(?i)<script[^>]*>"),
    (AttackCategory::Xss, "script tag close", r"(?i)</script>"),
    (AttackCategory::Xss, "javascript uri", r"(?i)javascript:"),
    (AttackCategory::Xss, "event handler attr", r"(?i)on\w+\s*="),
    (AttackCategory::Xss, "iframe tag", r"(?i)<iframe[^>]*>"),
    (AttackCategory::Xss, "object tag", r"(?i)<object[^>]*>"),
    (AttackCategory::Xss, "embed tag", r"(?i)<embed[^>]*>"),
    (AttackCategory::Xss, "link tag", r"(?i)<link[^>]*>"),
    (AttackCategory::Xss, "meta tag", r"(?i)<meta[^>]*>"),
    (AttackCategory::Xss, "vbscript uri", r"(?i)vbscript:"),
    // Path traversal
    (AttackCategory::PathTraversal, "dot dot slash", r"\.\./"),
    (AttackCategory::PathTraversal, "dot dot backslash", r"\.\.\\"),
    (AttackCategory::PathTraversal, "encoded dot dot slash", r"(?i)%2e%2e%2f"),
    (AttackCategory::PathTraversal, "encoded dot dot backslash", r"(?i)%2e%2e%5c"),
    (AttackCategory::PathTraversal, "mixed encoded slash", r"(?i)\.\.%2f"),
    (AttackCategory::PathTraversal, "mixed encoded backslash", r"(?i)\.\.%5c"),
    // Command injection
    (
        AttackCategory::CommandInjection,
        "semicolon shell command",
        r"(?i);\s*(cat|ls|pwd|whoami|id|uname)",
    ),
    (
        AttackCategory::CommandInjection,
        "piped shell command",
        r"(?i)\|\s*(cat|ls|pwd|whoami|id|uname)",
    ),
    (
        AttackCategory::CommandInjection,
        "chained shell command",
        r"(?i)&&\s*(cat|ls|pwd|whoami|id|uname)",
    ),
    (AttackCategory::CommandInjection, "backtick substitution", r"`[^`]*`"),
    (AttackCategory::CommandInjection, "dollar-paren substitution", r"\$\([^)]*\)"),
    (AttackCategory::CommandInjection, "netcat invocation", r"(?i)\bnc\s+-"),
    (AttackCategory::CommandInjection, "wget invocation", r"(?i)\bwget\s+"),
    (AttackCategory::CommandInjection, "curl invocation", r"(?i)\bcurl\s+"),
    // LDAP injection
    (AttackCategory::LdapInjection, "ldap or filter", r"\(\|"),
    (AttackCategory::LdapInjection, "ldap and filter", r"\(&"),
    (AttackCategory::LdapInjection, "ldap negation filter", r"\(!"),
    (AttackCategory::LdapInjection, "ldap wildcard close", r"\*\)"),
    (AttackCategory::LdapInjection, "ldap nested filter", r"\)\("),
    // XML injection
    (AttackCategory::XmlInjection, "xml declaration", r"(?i)<\?xml"),
    (AttackCategory::XmlInjection, "doctype declaration", r"(?i)<!DOCTYPE"),
    (AttackCategory::XmlInjection, "entity declaration", r"(?i)<!ENTITY"),
    (AttackCategory::XmlInjection, "system external entity", r"(?i)\bSYSTEM\s+"),
    (AttackCategory::XmlInjection, "public external entity", r"(?i)\bPUBLIC\s+"),
    // CSRF
    (AttackCategory::Csrf, "form action", r"(?i)<form[^>]*action\s*="),
    (
        AttackCategory::Csrf,
        "hidden input field",
        r#"(?i)<input[^>]*type\s*=\s*['"]hidden['"]"#,
    ),
    // Header injection (CRLF)
    (AttackCategory::HeaderInjection, "raw crlf", r"\r\n"),
    (AttackCategory::HeaderInjection, "encoded crlf", r"(?i)%0d%0a"),
    (AttackCategory::HeaderInjection, "encoded lf", r"(?i)%0a"),
    (AttackCategory::HeaderInjection, "encoded cr", r"(?i)%0d"),
    // NoSQL injection
    (AttackCategory::NoSqlInjection, "mongo where operator", r"\$where\b"),
    (AttackCategory::NoSqlInjection, "mongo ne operator", r"\$ne\b"),
    (AttackCategory::NoSqlInjection, "mongo gt operator", r"\$gt\b"),
    (AttackCategory::NoSqlInjection, "mongo lt operator", r"\$lt\b"),
    (AttackCategory::NoSqlInjection, "mongo regex operator", r"\$regex\b"),
    (AttackCategory::NoSqlInjection, "mongo or operator", r"\$or\b"),
    (AttackCategory::NoSqlInjection, "mongo and operator", r"\$and\b"),
];

/// Categorised, pre-compiled attack-pattern matchers.
///
/// Construction compiles every pattern once; [`PatternLibrary::matches`]
/// and [`PatternLibrary::categories_in`] only ever run the already-compiled
/// set, as the hot path must never recompile a regex.
pub struct PatternLibrary {
    patterns: Vec<CompiledPattern>,
}

impl PatternLibrary {
    /// Compiles the full library. Fails only if a pattern source itself
    /// fails to compile, which would indicate a programming error rather
    /// than bad input — callers should treat this as a construction-time
    /// fatal error.
    pub fn new() -> Result<Self> {
        let mut patterns = Vec::with_capacity(PATTERN_SOURCES.len());
        for (category, description, source) in PATTERN_SOURCES {
            let regex = Regex::new(source).map_err(PatternError::Compile)?;
            patterns.push(CompiledPattern {
                category: *category,
                tier: tier_for(*category),
                description,
                regex,
            });
        }
        Ok(Self { patterns })
    }

    /// Scans `text` once per category, returning every match found.
    pub fn matches(&self, text: &str) -> Vec<PatternMatch> {
        let mut hits = Vec::new();
        for pattern in &self.patterns {
            if let Some(m) = pattern.regex.find(text) {
                hits.push(PatternMatch {
                    category: pattern.category,
                    tier: pattern.tier,
                    description: pattern.description,
                    offset: m.start(),
                });
            }
        }
        hits
    }

    /// Convenience wrapper over [`PatternLibrary::matches`] returning the
    /// distinct set of categories hit.
    pub fn categories_in(&self, text: &str) -> Vec<AttackCategory> {
        let mut found: Vec<AttackCategory> =
            self.matches(text).into_iter().map(|m| m.category).collect();
        found.sort_unstable();
        found.dedup();
        found
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
