//! Sanitising logger and rate-based alert escalation (C8).
//!
//! Grounded on `enhanced_logger.py`'s `EnhancedLogger`/`SecurityAlertManager`:
//! three independent sinks (here, `tracing` targets instead of separate
//! `RotatingFileHandler`s) plus a rolling per-`(event_kind, client_ip_hash)`
//! window that escalates repeated high/critical events into a critical
//! alert on the `alerts` sink.

use admitctl_patterns::Sanitiser;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::LoggingConfig;

const ALERT_WINDOW: chrono::Duration = chrono::Duration::seconds(60);

/// One of the nine recognised security event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    InvalidHttpRequest,
    MalformedHeaders,
    InvalidMethod,
    ContentTooLarge,
    RateLimitExceeded,
    AttackPatternDetected,
    SuspiciousUserAgent,
    ProtocolViolation,
    SecurityScanDetected,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::InvalidHttpRequest => "invalid_http_request",
            EventKind::MalformedHeaders => "malformed_headers",
            EventKind::InvalidMethod => "invalid_method",
            EventKind::ContentTooLarge => "content_too_large",
            EventKind::RateLimitExceeded => "rate_limit_exceeded",
            EventKind::AttackPatternDetected => "attack_pattern_detected",
            EventKind::SuspiciousUserAgent => "suspicious_user_agent",
            EventKind::ProtocolViolation => "protocol_violation",
            EventKind::SecurityScanDetected => "security_scan_detected",
        };
        f.write_str(s)
    }
}

/// A single security-relevant occurrence, as defined in the data model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub event_kind: EventKind,
    pub threat_level: admitctl_patterns::ThreatLevel,
    pub description: String,
    pub client_ip_hash: Option<String>,
    pub endpoint: Option<String>,
    pub method: Option<String>,
    pub request_id: Option<String>,
    pub attack_patterns: Vec<String>,
    pub metadata: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
    pub count: u32,
}

impl SecurityEvent {
    pub fn new(event_kind: EventKind, threat_level: admitctl_patterns::ThreatLevel, description: impl Into<String>) -> Self {
        Self {
            event_kind,
            threat_level,
            description: description.into(),
            client_ip_hash: None,
            endpoint: None,
            method: None,
            request_id: None,
            attack_patterns: Vec::new(),
            metadata: HashMap::new(),
            timestamp: Utc::now(),
            count: 1,
        }
    }

    #[must_use]
    pub fn with_client_ip_hash(mut self, hash: impl Into<String>) -> Self {
        self.client_ip_hash = Some(hash.into());
        self
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    #[must_use]
    pub fn with_attack_patterns(mut self, patterns: Vec<String>) -> Self {
        self.attack_patterns = patterns;
        self
    }
}

/// Counts of recent events by kind and by threat level (§2.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityEventStats {
    pub by_kind: HashMap<String, u64>,
    pub by_threat_level: HashMap<String, u64>,
}

struct AlertWindows {
    /// `(event_kind, client_ip_hash)` → rolling 60s deque of event times.
    windows: HashMap<(String, String), VecDeque<DateTime<Utc>>>,
}

impl AlertWindows {
    fn new() -> Self {
        Self { windows: HashMap::new() }
    }

    /// Records the event and returns the current window size.
    fn record(&mut self, event_kind: EventKind, client_ip_hash: &str, now: DateTime<Utc>) -> usize {
        let key = (event_kind.to_string(), client_ip_hash.to_string());
        let deque = self.windows.entry(key).or_default();
        while let Some(front) = deque.front() {
            if now - *front >= ALERT_WINDOW {
                deque.pop_front();
            } else {
                break;
            }
        }
        deque.push_back(now);
        deque.len()
    }
}

/// Sanitising logger with three `tracing` sinks plus alert escalation.
pub struct SanitisingLogger {
    config: LoggingConfig,
    sanitiser: std::sync::Arc<Sanitiser>,
    alert_windows: Mutex<AlertWindows>,
    recent_events: Mutex<VecDeque<SecurityEvent>>,
}

impl SanitisingLogger {
    pub fn new(config: LoggingConfig, sanitiser: std::sync::Arc<Sanitiser>) -> Self {
        Self {
            config,
            sanitiser,
            alert_windows: Mutex::new(AlertWindows::new()),
            recent_events: Mutex::new(VecDeque::new()),
        }
    }

    /// Logs an invalid (rejected) HTTP request on the `requests` sink.
    pub fn log_invalid_request(&self, error_kind: &str, client_ip_hash: &str, detail: &str) {
        let detail = if self.config.sanitize_data { self.sanitiser.sanitise_text(detail) } else { detail.to_string() };
        info!(target: "admitctl::requests", error_kind, client_ip_hash, detail, "invalid HTTP request");
    }

    /// Logs an admitted request on the `requests` sink.
    pub fn log_admitted_request(&self, method: &str, endpoint: &str, client_ip_hash: &str) {
        info!(target: "admitctl::requests", method, endpoint, client_ip_hash, "request admitted");
    }

    /// Logs a security event, updates introspection state, and escalates to
    /// an alert when the rolling window crosses its threshold (§4.8).
    pub fn log_security_event(&self, event: SecurityEvent) {
        warn!(
            target: "admitctl::security_events",
            event_kind = %event.event_kind,
            threat_level = %event.threat_level,
            client_ip_hash = event.client_ip_hash.as_deref().unwrap_or("unknown"),
            description = %event.description,
            "security event",
        );

        {
            let mut recent = self.recent_events.lock().expect("lock not poisoned");
            recent.push_back(event.clone());
            while recent.len() > self.config.recent_events_capacity {
                recent.pop_front();
            }
        }

        if self.should_alert(&event) {
            self.emit_alert(&event);
        }
    }

    fn should_alert(&self, event: &SecurityEvent) -> bool {
        use admitctl_patterns::ThreatLevel;
        if event.threat_level < ThreatLevel::High {
            return false;
        }
        let client_ip_hash = event.client_ip_hash.as_deref().unwrap_or("unknown");
        let size = self.alert_windows.lock().expect("lock not poisoned").record(event.event_kind, client_ip_hash, event.timestamp);
        match event.threat_level {
            ThreatLevel::Critical => size >= self.config.alert_threshold_critical as usize,
            ThreatLevel::High => size >= self.config.alert_threshold_high as usize,
            _ => false,
        }
    }

    fn emit_alert(&self, event: &SecurityEvent) {
        tracing::error!(
            target: "admitctl::alerts",
            threat_level = %event.threat_level,
            event_kind = %event.event_kind,
            client_ip_hash = event.client_ip_hash.as_deref().unwrap_or("unknown"),
            description = %event.description,
            "SECURITY ALERT",
        );
    }

    /// The most recent `limit` security events (§2.3, newest last).
    pub fn recent_events(&self, limit: usize) -> Vec<SecurityEvent> {
        let recent = self.recent_events.lock().expect("lock not poisoned");
        recent.iter().rev().take(limit).rev().cloned().collect()
    }

    /// Counts by event kind and threat level over the current ring buffer.
    pub fn event_stats(&self) -> SecurityEventStats {
        let recent = self.recent_events.lock().expect("lock not poisoned");
        let mut stats = SecurityEventStats::default();
        for event in recent.iter() {
            *stats.by_kind.entry(event.event_kind.to_string()).or_insert(0) += 1;
            *stats.by_threat_level.entry(event.threat_level.to_string()).or_insert(0) += 1;
        }
        stats
    }

    /// Drops ring-buffer entries older than `max_age`. Does not touch any
    /// on-disk log file; rotation there is the file backend's job.
    pub fn clear_old_events(&self, max_age: Duration) {
        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::zero());
        let mut recent = self.recent_events.lock().expect("lock not poisoned");
        recent.retain(|event| event.timestamp >= cutoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use admitctl_patterns::ThreatLevel;

    fn logger() -> SanitisingLogger {
        SanitisingLogger::new(LoggingConfig::default(), std::sync::Arc::new(Sanitiser::with_salt([1u8; 16])))
    }

    #[test]
    fn low_threat_events_never_alert() {
        let logger = logger();
        for _ in 0..20 {
            let event = SecurityEvent::new(EventKind::InvalidHttpRequest, ThreatLevel::Low, "noise").with_client_ip_hash("abc");
            logger.log_security_event(event);
        }
        assert_eq!(logger.recent_events(20).len(), 20);
    }

    #[test]
    fn high_threat_escalates_after_threshold() {
        let logger = logger();
        for i in 0..10 {
            let event = SecurityEvent::new(EventKind::AttackPatternDetected, ThreatLevel::High, format!("hit {i}"))
                .with_client_ip_hash("client-a");
            assert_eq!(logger.should_alert(&event), i + 1 >= 10);
        }
    }

    #[test]
    fn critical_threat_escalates_at_lower_threshold() {
        let logger = logger();
        for i in 0..5 {
            let event = SecurityEvent::new(EventKind::AttackPatternDetected, ThreatLevel::Critical, format!("hit {i}"))
                .with_client_ip_hash("client-b");
            assert_eq!(logger.should_alert(&event), i + 1 >= 5);
        }
    }

    #[test]
    fn event_stats_count_by_kind_and_level() {
        let logger = logger();
        logger.log_security_event(SecurityEvent::new(EventKind::InvalidMethod, ThreatLevel::None, "x"));
        logger.log_security_event(SecurityEvent::new(EventKind::InvalidMethod, ThreatLevel::None, "y"));
        let stats = logger.event_stats();
        assert_eq!(stats.by_kind["invalid_method"], 2);
        assert_eq!(stats.by_threat_level["none"], 2);
    }

    #[test]
    fn distinct_clients_have_independent_alert_windows() {
        let logger = logger();
        for _ in 0..9 {
            let event = SecurityEvent::new(EventKind::AttackPatternDetected, ThreatLevel::High, "hit").with_client_ip_hash("client-c");
            logger.log_security_event(event);
        }
        let event = SecurityEvent::new(EventKind::AttackPatternDetected, ThreatLevel::High, "hit").with_client_ip_hash("client-d");
        assert!(!logger.should_alert(&event));
    }
}
