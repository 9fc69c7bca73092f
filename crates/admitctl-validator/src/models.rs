//! Config, result, and assessment types for C4/C5.

use admitctl_patterns::{AttackCategory, ThreatLevel};
use admitctl_threatintel::Reputation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The four actions the analyser can recommend, in ascending severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecommendedAction {
    Allow,
    Monitor,
    RateLimit,
    Block,
}

impl std::fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecommendedAction::Allow => "allow",
            RecommendedAction::Monitor => "monitor",
            RecommendedAction::RateLimit => "rate_limit",
            RecommendedAction::Block => "block",
        };
        f.write_str(s)
    }
}

/// The six structural failure kinds C5 can report; `None` on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    MalformedRequest,
    InvalidMethod,
    InvalidHeaders,
    ContentTooLarge,
    SecurityThreat,
    ValidationError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::MalformedRequest => "malformed_request",
            ErrorKind::InvalidMethod => "invalid_method",
            ErrorKind::InvalidHeaders => "invalid_headers",
            ErrorKind::ContentTooLarge => "content_too_large",
            ErrorKind::SecurityThreat => "security_threat",
            ErrorKind::ValidationError => "validation_error",
        };
        f.write_str(s)
    }
}

/// A sanitised, loggable snapshot of a request: never the raw body or IP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitisedSnapshot {
    pub method: String,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub query_params: BTreeMap<String, String>,
    pub client_ip_hash: String,
}

/// Outcome of a full C5 validation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub threat_level: ThreatLevel,
    pub should_rate_limit: bool,
    pub sanitised_snapshot: Option<SanitisedSnapshot>,
    pub details: String,
    pub attack_categories: Vec<String>,
    pub confidence_score: f64,
}

impl ValidationResult {
    pub fn ok(threat_level: ThreatLevel, details: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            error_kind: None,
            error_message: None,
            threat_level,
            should_rate_limit: false,
            sanitised_snapshot: None,
            details: details.into(),
            attack_categories: Vec::new(),
            confidence_score: 0.0,
        }
    }

    pub fn reject(
        error_kind: ErrorKind,
        error_message: impl Into<String>,
        threat_level: ThreatLevel,
    ) -> Self {
        Self {
            is_valid: false,
            error_kind: Some(error_kind),
            error_message: Some(error_message.into()),
            threat_level,
            should_rate_limit: false,
            sanitised_snapshot: None,
            details: String::new(),
            attack_categories: Vec::new(),
            confidence_score: 0.0,
        }
    }

    #[must_use]
    pub fn with_snapshot(mut self, snapshot: SanitisedSnapshot) -> Self {
        self.sanitised_snapshot = Some(snapshot);
        self
    }

    #[must_use]
    pub fn with_rate_limit_signal(mut self, should_rate_limit: bool) -> Self {
        self.should_rate_limit = should_rate_limit;
        self
    }

    #[must_use]
    pub fn with_attack_categories(mut self, categories: Vec<String>) -> Self {
        self.attack_categories = categories;
        self
    }

    #[must_use]
    pub fn with_confidence_score(mut self, confidence_score: f64) -> Self {
        self.confidence_score = confidence_score;
        self
    }
}

/// Output of the C4 security analysis for a single request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAssessment {
    pub threat_level: ThreatLevel,
    pub detected_patterns: Vec<(AttackCategory, String)>,
    pub attack_categories: BTreeSet<AttackCategory>,
    pub client_reputation: Reputation,
    pub recommended_action: RecommendedAction,
    pub confidence_score: f64,
    pub risk_factors: Vec<String>,
    pub client_ip_hash: String,
    pub timestamp: DateTime<Utc>,
}

/// Config recognised by C5, each field defaulted per spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    pub max_content_length: u64,
    pub allowed_methods: BTreeSet<String>,
    pub max_header_size: usize,
    pub max_headers_count: usize,
    pub enable_security_analysis: bool,
    pub log_invalid_requests: bool,
    pub blocked_user_agents: Vec<String>,
    pub suspicious_headers: BTreeSet<String>,
    pub trusted_endpoint_prefixes: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_content_length: 10 * 1024 * 1024,
            allowed_methods: ["GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_header_size: 8 * 1024,
            max_headers_count: 100,
            enable_security_analysis: true,
            log_invalid_requests: true,
            blocked_user_agents: vec!["sqlmap".into(), "nikto".into(), "nmap".into(), "masscan".into()],
            suspicious_headers: ["x-forwarded-host", "x-original-url", "x-rewrite-url"]
                .into_iter()
                .map(String::from)
                .collect(),
            trusted_endpoint_prefixes: vec![
                "/api/health".into(),
                "/health".into(),
                "/api/ping".into(),
                "/ping".into(),
                "/api/status".into(),
                "/status".into(),
                "/docs".into(),
                "/openapi.json".into(),
                "/favicon.ico".into(),
            ],
        }
    }
}

impl ValidationConfig {
    #[must_use]
    pub fn with_max_content_length(mut self, bytes: u64) -> Self {
        self.max_content_length = bytes;
        self
    }

    #[must_use]
    pub fn with_allowed_methods(mut self, methods: impl IntoIterator<Item = String>) -> Self {
        self.allowed_methods = methods.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_enable_security_analysis(mut self, enabled: bool) -> Self {
        self.enable_security_analysis = enabled;
        self
    }

    #[must_use]
    pub fn with_trusted_endpoint_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.trusted_endpoint_prefixes = prefixes;
        self
    }

    #[must_use]
    pub fn with_blocked_user_agents(mut self, agents: Vec<String>) -> Self {
        self.blocked_user_agents = agents;
        self
    }

    pub fn is_trusted_endpoint(&self, path: &str) -> bool {
        self.trusted_endpoint_prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }
}
