//! Fixed six-step HTTP structural validation (C5), invoking the security
//! analyser (C4) as its last step.

use admitctl_patterns::{truncate_with_ellipsis, Sanitiser, ThreatLevel};
use std::collections::BTreeMap;

use crate::analyser::SecurityAnalyser;
use crate::error::{Result, ValidatorError};
use crate::models::{ErrorKind, RecommendedAction, SanitisedSnapshot, ValidationConfig, ValidationResult};
use crate::request::Request;

const SNAPSHOT_VALUE_MAX_CHARS: usize = 100;

/// Orchestrates C5's fixed-order structural checks, invoking C4 last.
pub struct HttpValidator {
    config: ValidationConfig,
    analyser: SecurityAnalyser,
    sanitiser: std::sync::Arc<Sanitiser>,
}

impl HttpValidator {
    /// Builds a validator, rejecting a config with no allowed methods or a
    /// zero header-count ceiling (either would reject every request).
    pub fn new(config: ValidationConfig, analyser: SecurityAnalyser, sanitiser: std::sync::Arc<Sanitiser>) -> Result<Self> {
        if config.allowed_methods.is_empty() {
            return Err(ValidatorError::InvalidConfig("allowed_methods must not be empty".into()));
        }
        if config.max_headers_count == 0 {
            return Err(ValidatorError::InvalidConfig("max_headers_count must be >= 1".into()));
        }
        Ok(Self { config, analyser, sanitiser })
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    fn snapshot(&self, request: &Request, client_ip_hash: &str) -> SanitisedSnapshot {
        let headers: BTreeMap<String, String> = request.headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let mut query_params = BTreeMap::new();
        for pair in request.query.split('&').filter(|s| !s.is_empty()) {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next().unwrap_or_default().to_string();
            let value = parts.next().unwrap_or_default().to_string();
            query_params.insert(key, value);
        }
        let headers = self.sanitiser.sanitise_headers(&headers);
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k, truncate_with_ellipsis(&v, SNAPSHOT_VALUE_MAX_CHARS)))
            .collect();
        let query_params = self.sanitiser.sanitise_params(&query_params);
        let query_params = query_params
            .into_iter()
            .map(|(k, v)| (k, truncate_with_ellipsis(&v, SNAPSHOT_VALUE_MAX_CHARS)))
            .collect();
        SanitisedSnapshot {
            method: request.method.clone(),
            path: request.path.clone(),
            headers,
            query_params,
            client_ip_hash: client_ip_hash.to_string(),
        }
    }

    /// Runs the six-step structural pipeline. Stops at the first failure.
    pub fn validate(&self, request: &Request) -> ValidationResult {
        // Step 1: basic shape.
        if request.method.trim().is_empty() || request.path.trim().is_empty() {
            return ValidationResult::reject(ErrorKind::MalformedRequest, "method or path missing", ThreatLevel::None);
        }

        // Step 2: method allow-list.
        let method = request.method.to_ascii_uppercase();
        if !self.config.allowed_methods.contains(&method) {
            return ValidationResult::reject(
                ErrorKind::InvalidMethod,
                format!("method {method} is not allowed"),
                ThreatLevel::None,
            );
        }

        // Step 3: header shape.
        if request.headers.len() > self.config.max_headers_count {
            return ValidationResult::reject(ErrorKind::InvalidHeaders, "too many headers", ThreatLevel::Medium);
        }
        for (name, value) in request.headers.iter() {
            if name.len() + value.len() > self.config.max_header_size {
                return ValidationResult::reject(ErrorKind::InvalidHeaders, "header too large", ThreatLevel::Medium);
            }
        }

        // Step 4: blocked user agents.
        if let Some(user_agent) = request.headers.get("user-agent") {
            let lower = user_agent.to_ascii_lowercase();
            if self.config.blocked_user_agents.iter().any(|blocked| lower.contains(&blocked.to_ascii_lowercase())) {
                return ValidationResult::reject(ErrorKind::InvalidHeaders, "blocked user agent", ThreatLevel::Medium);
            }
        }

        // Step 5: content-length.
        if let Some(length) = request.content_length {
            if length > self.config.max_content_length {
                return ValidationResult::reject(
                    ErrorKind::ContentTooLarge,
                    format!("content-length {length} exceeds {}", self.config.max_content_length),
                    ThreatLevel::None,
                );
            }
        }

        // Step 6: security analysis.
        if !self.config.enable_security_analysis {
            return ValidationResult::ok(ThreatLevel::None, "security analysis disabled");
        }

        let assessment = self.analyser.analyse(request);
        let is_trusted = self.config.is_trusted_endpoint(&request.path);
        let snapshot = self.snapshot(request, &assessment.client_ip_hash);

        let blocks = assessment.threat_level == ThreatLevel::Critical
            || (assessment.threat_level == ThreatLevel::High && assessment.confidence_score > 0.8);

        let attack_categories: Vec<String> = assessment.attack_categories.iter().map(|c| c.to_string()).collect();

        if blocks && !is_trusted {
            return ValidationResult::reject(
                ErrorKind::SecurityThreat,
                format!("security analysis flagged threat level {}", assessment.threat_level),
                assessment.threat_level,
            )
            .with_snapshot(snapshot)
            .with_attack_categories(attack_categories)
            .with_confidence_score(assessment.confidence_score);
        }

        let should_rate_limit = !is_trusted
            && matches!(assessment.recommended_action, RecommendedAction::RateLimit | RecommendedAction::Block);

        ValidationResult::ok(assessment.threat_level, "validated")
            .with_snapshot(snapshot)
            .with_rate_limit_signal(should_rate_limit)
            .with_attack_categories(attack_categories)
            .with_confidence_score(assessment.confidence_score)
    }
}
