//! Metrics collection (C9): a fixed set of counters/histograms/gauges with
//! low-cardinality labels, sanitised endpoints, and swallowed failures.
//!
//! Grounded on `validation_metrics.py::ValidationMetricsCollector` for the
//! metric names/labels and `_sanitize_endpoint`'s UUID/numeric-ID/opaque-
//! token replacement. Uses the `metrics` crate as the recorder-agnostic
//! facade; a concrete exporter (e.g. `metrics-exporter-prometheus`) is
//! wired by the embedding application, not by this crate (spec §1 scopes
//! the exporter itself out).

use dashmap::DashMap;
use metrics::{counter, histogram};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

const ENDPOINT_MAX_CHARS: usize = 100;
const ENDPOINT_CACHE_TTL: Duration = Duration::from_secs(300);

struct EndpointCacheEntry {
    sanitised: String,
    cached_at: Instant,
}

/// Registers the fixed metric set and exposes a small in-process summary
/// (§2.4) alongside the `metrics`-crate recording calls.
pub struct MetricsCollector {
    endpoint_cache: DashMap<String, EndpointCacheEntry>,
    total_requests: AtomicU64,
    total_threats: AtomicU64,
    total_blocked: AtomicU64,
    total_rate_limited: AtomicU64,
}

/// Snapshot returned by [`MetricsCollector::summary`] (§2.4).
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_requests: u64,
    pub total_threats: u64,
    pub total_blocked: u64,
    pub total_rate_limited: u64,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            endpoint_cache: DashMap::new(),
            total_requests: AtomicU64::new(0),
            total_threats: AtomicU64::new(0),
            total_blocked: AtomicU64::new(0),
            total_rate_limited: AtomicU64::new(0),
        }
    }

    /// Replaces UUIDs, numeric IDs, and long opaque segments with
    /// `{uuid}`/`{id}`/`{token}`, truncates at 100 chars, and caches the
    /// result for five minutes to avoid re-sanitising hot endpoints.
    fn sanitise_endpoint(&self, endpoint: &str) -> String {
        if endpoint.is_empty() {
            return "unknown".to_string();
        }
        if let Some(cached) = self.endpoint_cache.get(endpoint) {
            if cached.cached_at.elapsed() < ENDPOINT_CACHE_TTL {
                return cached.sanitised.clone();
            }
        }

        let without_query = endpoint.split(['?', '#']).next().unwrap_or(endpoint);
        let sanitised: String = without_query
            .split('/')
            .map(|segment| {
                if segment.is_empty() {
                    segment.to_string()
                } else if is_uuid(segment) {
                    "{uuid}".to_string()
                } else if segment.chars().all(|c| c.is_ascii_digit()) {
                    "{id}".to_string()
                } else if segment.len() >= 32 && segment.chars().all(|c| c.is_ascii_alphanumeric()) {
                    "{token}".to_string()
                } else {
                    segment.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("/");
        let sanitised: String = sanitised.chars().take(ENDPOINT_MAX_CHARS).collect();

        self.endpoint_cache.insert(
            endpoint.to_string(),
            EndpointCacheEntry { sanitised: sanitised.clone(), cached_at: Instant::now() },
        );
        sanitised
    }

    /// Records a validated or rejected request. Never panics: any recording
    /// failure increments `metric_recording_error` instead of propagating.
    pub fn record_validation_event(
        &self,
        event_type: &str,
        endpoint: &str,
        method: &str,
        admitted: bool,
        duration: Duration,
    ) {
        let endpoint = self.sanitise_endpoint(endpoint);
        let result = if admitted { "allowed" } else { "blocked" };
        counter!("http_validation_requests_total", "event_type" => event_type.to_string(), "endpoint" => endpoint.clone(), "method" => method.to_string(), "result" => result).increment(1);
        histogram!("http_validation_duration_seconds", "endpoint" => endpoint, "method" => method.to_string()).record(duration.as_secs_f64());
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if !admitted {
            self.total_blocked.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a detected security threat, one increment per attack category.
    pub fn record_security_threat(
        &self,
        threat_level: &str,
        attack_categories: &[String],
        endpoint: &str,
        method: &str,
        client_reputation: &str,
        confidence_score: f64,
    ) {
        let endpoint = self.sanitise_endpoint(endpoint);
        let categories: Vec<String> = if attack_categories.is_empty() { vec!["unknown".to_string()] } else { attack_categories.to_vec() };
        for category in &categories {
            counter!(
                "http_security_threats_total",
                "threat_level" => threat_level.to_string(),
                "attack_category" => category.clone(),
                "endpoint" => endpoint.clone(),
                "method" => method.to_string(),
                "client_reputation" => client_reputation.to_string(),
            )
            .increment(1);
            histogram!("http_security_threat_confidence", "threat_level" => threat_level.to_string(), "attack_category" => category.clone())
                .record(confidence_score);
        }
        self.total_threats.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a request blocked outright (C10's `Rejected{security_threat}`).
    pub fn record_blocked(&self, threat_level: &str, endpoint: &str, method: &str) {
        let endpoint = self.sanitise_endpoint(endpoint);
        counter!("http_blocked_requests_total", "block_reason" => "security_threat", "threat_level" => threat_level.to_string(), "endpoint" => endpoint, "method" => method.to_string()).increment(1);
    }

    /// Records a rate-limit denial.
    pub fn record_rate_limit_event(&self, rule_name: &str, scope: &str, algorithm: &str, endpoint: &str) {
        let endpoint = self.sanitise_endpoint(endpoint);
        counter!(
            "http_rate_limit_events_total",
            "rule_name" => rule_name.to_string(),
            "scope" => scope.to_string(),
            "algorithm" => algorithm.to_string(),
            "action" => "blocked",
            "endpoint" => endpoint,
        )
        .increment(1);
        self.total_rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an internal error in metrics or validation recording itself,
    /// matching the original's "swallow and count" error policy.
    pub fn record_internal_error(&self, error_type: &str, component: &str) {
        counter!("http_validation_errors_total", "error_type" => error_type.to_string(), "component" => component.to_string(), "severity" => "error").increment(1);
    }

    /// A point-in-time snapshot of the cheap running totals (§2.4).
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_threats: self.total_threats.load(Ordering::Relaxed),
            total_blocked: self.total_blocked.load(Ordering::Relaxed),
            total_rate_limited: self.total_rate_limited.load(Ordering::Relaxed),
        }
    }
}

fn is_uuid(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    if bytes.len() != 36 {
        return false;
    }
    for (i, b) in bytes.iter().enumerate() {
        match i {
            8 | 13 | 18 | 23 => {
                if *b != b'-' {
                    return false;
                }
            }
            _ => {
                if !b.is_ascii_hexdigit() {
                    return false;
                }
            }
        }
    }
    true
}
