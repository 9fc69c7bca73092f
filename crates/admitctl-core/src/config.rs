//! Configuration for the admission-control pipeline.
//!
//! Composed of one sub-config per component, following the teacher's
//! `SentinelConfig` (registry/monitor/council/global) composition pattern.
//! No environment-variable binding layer: construction is always explicit.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use admitctl_ratelimit::RateLimitRule;
use admitctl_validator::ValidationConfig;

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// C5 structural validation options.
    pub validation: ValidationConfig,

    /// C7 rate-limit rule set (sorted by priority at `RateLimiter::new`).
    pub rate_limit_rules: Vec<RateLimitRule>,

    /// Fallback rule used when no `rate_limit_rules` entry matches.
    pub rate_limit_fallback: RateLimitRule,

    /// Which storage backend C6 should use.
    pub rate_limit_storage: StorageBackend,

    /// Where C3 persists its reputation snapshot; `None` disables persistence.
    pub threat_intel_snapshot_path: Option<PathBuf>,

    /// C8 sanitising-logger options.
    pub logging: LoggingConfig,

    /// Deadline for a single `evaluate()` call (default 200ms, per spec §5).
    pub deadline_ms: u64,
}

impl PipelineConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            validation: ValidationConfig::default(),
            rate_limit_rules: admitctl_ratelimit::default_rules().expect("built-in rate-limit rules are valid"),
            rate_limit_fallback: admitctl_ratelimit::default_fallback_rule().expect("built-in fallback rule is valid"),
            rate_limit_storage: StorageBackend::Memory,
            threat_intel_snapshot_path: None,
            logging: LoggingConfig::default(),
            deadline_ms: 200,
        }
    }
}

/// Selects which `RateLimitStorage` implementation backs C7.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StorageBackend {
    /// Single-process in-memory backend. Default.
    Memory,
    /// Shared remote-KV backend (feature `redis-backend`).
    Redis { url: String, key_prefix: String },
}

/// C8 sanitising-logger and alert-escalation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Redact sensitive text/headers/params before logging (C1 pass-through).
    pub sanitize_data: bool,

    /// Hash client IPs before they ever reach a log line.
    pub hash_client_ips: bool,

    /// High-threat events per 60s, per `(event_kind, client_ip_hash)`, that
    /// trigger a critical alert.
    pub alert_threshold_high: u32,

    /// Critical-threat events per 60s that trigger a critical alert.
    pub alert_threshold_critical: u32,

    /// Capacity of the in-process recent-events ring buffer (§2.3).
    pub recent_events_capacity: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            sanitize_data: true,
            hash_client_ips: true,
            alert_threshold_high: 10,
            alert_threshold_critical: 5,
            recent_events_capacity: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_deadline() {
        let config = PipelineConfig::default();
        assert_eq!(config.deadline_ms, 200);
        assert_eq!(config.deadline(), Duration::from_millis(200));
    }

    #[test]
    fn default_config_serialises() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.deadline_ms, config.deadline_ms);
    }

    #[test]
    fn logging_defaults_match_spec() {
        let logging = LoggingConfig::default();
        assert_eq!(logging.alert_threshold_high, 10);
        assert_eq!(logging.alert_threshold_critical, 5);
    }
}
