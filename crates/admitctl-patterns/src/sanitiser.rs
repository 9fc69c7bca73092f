//! Redaction of sensitive substrings, headers, and query parameters before
//! anything reaches a log line or a metrics label.
//!
//! All functions here are pure given a compiled [`Sanitiser`]; IP hashing is
//! the one operation that depends on a salt fixed for the process lifetime.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use uuid::Uuid;

const REDACTED: &str = "[REDACTED]";

/// Header names whose values are always fully redacted, never passed
/// through the substring scanner.
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "auth",
    "cookie",
    "set-cookie",
    "x-api-key",
    "x-auth-token",
    "x-access-token",
    "bearer",
    "basic",
];

/// Query/body parameter names whose values are always fully redacted.
const SENSITIVE_PARAMS: &[&str] = &[
    "password",
    "passwd",
    "pwd",
    "token",
    "key",
    "secret",
    "auth",
    "api_key",
    "access_token",
    "refresh_token",
    "session_id",
];

const SENSITIVE_PATTERN_SOURCES: &[&str] = &[
    // email
    r"(?i)[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}",
    // password|passwd|pwd=value style key-value pairs, checked before the
    // generic token pattern so the key name itself is also swallowed
    r"(?i)\b(?:password|passwd|pwd)\s*=\s*\S+",
    // authorization: ... header-like run embedded in free text
    r"(?i)\bauthorization\s*:\s*\S+",
    // JWT: three base64url segments joined by dots
    r"\b[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\b",
    // credit-card / SSN shaped digit runs
    r"\b\d{3}-\d{2}-\d{4}\b",
    r"\b(?:\d[ -]?){12,18}\d\b",
    // phone numbers, loosely: 7-15 digits with optional separators
    r"\+?\d[\d\-. ]{7,14}\d",
    // generic long opaque token
    r"\b[A-Za-z0-9]{32,}\b",
];

/// Compiled sanitisation rules plus a process-local IP-hashing salt.
///
/// Patterns are compiled once, at construction, per spec on pre-compiled
/// hot-path matchers; `sanitise_*` calls only ever run the already-built
/// regex set.
pub struct Sanitiser {
    patterns: Vec<Regex>,
    ip_salt: [u8; 16],
}

impl Sanitiser {
    /// Builds a sanitiser with a fresh random IP-hashing salt.
    pub fn new() -> Self {
        Self::with_salt(*Uuid::new_v4().as_bytes())
    }

    /// Builds a sanitiser with an explicit salt, for deterministic tests.
    pub fn with_salt(ip_salt: [u8; 16]) -> Self {
        let patterns = SENSITIVE_PATTERN_SOURCES
            .iter()
            .map(|src| Regex::new(src).expect("sensitive pattern source compiles"))
            .collect();
        Self { patterns, ip_salt }
    }

    /// Replaces every sensitive substring in `s` with `[REDACTED]`.
    ///
    /// Idempotent: `sanitise_text(sanitise_text(s)) == sanitise_text(s)`,
    /// since the literal `[REDACTED]` never matches a sensitive pattern.
    pub fn sanitise_text(&self, s: &str) -> String {
        let mut out = s.to_string();
        for pattern in &self.patterns {
            if pattern.is_match(&out) {
                out = pattern.replace_all(&out, REDACTED).into_owned();
            }
        }
        out
    }

    /// Redacts a header map, preserving the original key set. Sensitive
    /// header names (see [`SENSITIVE_HEADERS`]) are fully replaced; every
    /// other value still passes through [`Sanitiser::sanitise_text`].
    pub fn sanitise_headers(&self, headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        headers
            .iter()
            .map(|(k, v)| {
                let value = if is_listed(k, SENSITIVE_HEADERS) {
                    REDACTED.to_string()
                } else {
                    self.sanitise_text(v)
                };
                (k.clone(), value)
            })
            .collect()
    }

    /// Redacts a query/body parameter map, preserving the original key set.
    pub fn sanitise_params(&self, params: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        params
            .iter()
            .map(|(k, v)| {
                let value = if is_listed(k, SENSITIVE_PARAMS) {
                    REDACTED.to_string()
                } else {
                    self.sanitise_text(v)
                };
                (k.clone(), value)
            })
            .collect()
    }

    /// Hashes a client IP address against this sanitiser's process-local
    /// salt: `sha256(ip || salt)`, hex-encoded and truncated to 16 chars.
    ///
    /// Stable for the lifetime of one `Sanitiser`; two sanitisers built
    /// with distinct salts produce distinct hashes for the same IP.
    pub fn hash_ip(&self, ip: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(ip.as_bytes());
        hasher.update(self.ip_salt);
        let digest = hasher.finalize();
        hex_encode(&digest)[..16].to_string()
    }
}

impl Default for Sanitiser {
    fn default() -> Self {
        Self::new()
    }
}

fn is_listed(name: &str, list: &[&str]) -> bool {
    let lower = name.to_ascii_lowercase();
    list.iter().any(|candidate| *candidate == lower)
}

/// Truncates a string to `max_chars` characters, appending an ellipsis if
/// anything was cut. Operates on `char` boundaries to stay UTF-8 safe.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut truncated: String = s.chars().take(max_chars).collect();
    truncated.push('\u{2026}');
    truncated
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{b:02x}").expect("writing to a String never fails");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitiser() -> Sanitiser {
        Sanitiser::with_salt([7u8; 16])
    }

    #[test]
    fn redacts_email() {
        let s = sanitiser().sanitise_text("contact me at jane.doe@example.com please");
        assert!(!s.contains("jane.doe@example.com"));
        assert!(s.contains(REDACTED));
    }

    #[test]
    fn sanitise_text_is_idempotent() {
        let s = sanitiser();
        let input = "token abcdefghijklmnopqrstuvwxyz012345 and jane@example.com";
        let once = s.sanitise_text(input);
        let twice = s.sanitise_text(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn sanitise_headers_preserves_key_set_and_redacts_auth() {
        let s = sanitiser();
        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_string(), "Bearer abc123".to_string());
        headers.insert("X-Request-Id".to_string(), "req-42".to_string());
        let out = s.sanitise_headers(&headers);
        assert_eq!(out.len(), headers.len());
        assert_eq!(out["Authorization"], REDACTED);
        assert_eq!(out["X-Request-Id"], "req-42");
    }

    #[test]
    fn sanitise_params_redacts_known_keys_case_insensitively() {
        let s = sanitiser();
        let mut params = BTreeMap::new();
        params.insert("PASSWORD".to_string(), "hunter2".to_string());
        params.insert("page".to_string(), "1".to_string());
        let out = s.sanitise_params(&params);
        assert_eq!(out["PASSWORD"], REDACTED);
        assert_eq!(out["page"], "1");
    }

    #[test]
    fn hash_ip_is_stable_within_a_sanitiser_and_distinguishes_inputs() {
        let s = sanitiser();
        let a1 = s.hash_ip("192.168.1.1");
        let a2 = s.hash_ip("192.168.1.1");
        let b = s.hash_ip("192.168.1.2");
        assert_eq!(a1, a2);
        assert_ne!(a1, b);
        assert_eq!(a1.len(), 16);
    }

    #[test]
    fn distinct_salts_produce_distinct_hashes() {
        let h1 = Sanitiser::with_salt([1u8; 16]);
        let h2 = Sanitiser::with_salt([2u8; 16]);
        assert_ne!(h1.hash_ip("10.0.0.1"), h2.hash_ip("10.0.0.1"));
    }

    #[test]
    fn truncate_adds_ellipsis_only_when_cut() {
        assert_eq!(truncate_with_ellipsis("short", 10), "short");
        let long = "a".repeat(120);
        let truncated = truncate_with_ellipsis(&long, 100);
        assert_eq!(truncated.chars().count(), 101);
        assert!(truncated.ends_with('\u{2026}'));
    }
}
