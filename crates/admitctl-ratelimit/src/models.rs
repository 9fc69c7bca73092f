//! Data model for rate-limit rules and decisions.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{RateLimitError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateLimitAlgorithm {
    FixedWindow,
    SlidingWindow,
    TokenBucket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateLimitScope {
    Global,
    Ip,
    User,
    Endpoint,
    IpEndpoint,
    UserEndpoint,
}

impl RateLimitScope {
    const fn tag(self) -> &'static str {
        match self {
            RateLimitScope::Global => "global",
            RateLimitScope::Ip => "ip",
            RateLimitScope::User => "user",
            RateLimitScope::Endpoint => "endpoint",
            RateLimitScope::IpEndpoint => "ip_endpoint",
            RateLimitScope::UserEndpoint => "user_endpoint",
        }
    }

    /// Whether this scope requires an IP to be present for matching.
    pub const fn requires_ip(self) -> bool {
        matches!(self, RateLimitScope::Ip | RateLimitScope::IpEndpoint)
    }

    /// Whether this scope requires an authenticated user to be present.
    pub const fn requires_user(self) -> bool {
        matches!(self, RateLimitScope::User | RateLimitScope::UserEndpoint)
    }

    /// Whether this scope requires an endpoint to be present.
    pub const fn requires_endpoint(self) -> bool {
        matches!(
            self,
            RateLimitScope::Endpoint | RateLimitScope::IpEndpoint | RateLimitScope::UserEndpoint
        )
    }
}

/// A single rate-limit rule.
///
/// Invariants, enforced by [`RateLimitRule::new`]: `limit >= 1`,
/// `window_seconds >= 1`, and `burst_limit >= limit` when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub name: String,
    pub scope: RateLimitScope,
    pub algorithm: RateLimitAlgorithm,
    pub limit: u64,
    pub window_seconds: u64,
    pub burst_limit: Option<u64>,
    pub priority: i32,
    pub enabled: bool,
    pub endpoints: Option<Vec<String>>,
    pub user_types: Option<Vec<String>>,
}

impl RateLimitRule {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        scope: RateLimitScope,
        algorithm: RateLimitAlgorithm,
        limit: u64,
        window_seconds: u64,
        burst_limit: Option<u64>,
        priority: i32,
    ) -> Result<Self> {
        let name = name.into();
        if limit < 1 {
            return Err(RateLimitError::InvalidRule {
                name,
                reason: "limit must be >= 1".into(),
            });
        }
        if window_seconds < 1 {
            return Err(RateLimitError::InvalidRule {
                name,
                reason: "window_seconds must be >= 1".into(),
            });
        }
        if let Some(burst) = burst_limit {
            if burst < limit {
                return Err(RateLimitError::InvalidRule {
                    name,
                    reason: "burst_limit must be >= limit".into(),
                });
            }
        }
        Ok(Self {
            name,
            scope,
            algorithm,
            limit,
            window_seconds,
            burst_limit,
            priority,
            enabled: true,
            endpoints: None,
            user_types: None,
        })
    }

    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    #[must_use]
    pub fn with_user_types(mut self, user_types: Vec<String>) -> Self {
        self.user_types = Some(user_types);
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn capacity(&self) -> u64 {
        self.burst_limit.unwrap_or(self.limit)
    }

    /// Deterministic storage key for this rule given a match context.
    pub fn storage_key(&self, ip: Option<&str>, endpoint: Option<&str>, user: Option<&str>) -> String {
        match self.scope {
            RateLimitScope::Global => format!("global:{}", self.name),
            RateLimitScope::Ip => format!("ip:{}:{}", ip.unwrap_or(""), self.name),
            RateLimitScope::User => format!("user:{}:{}", user.unwrap_or(""), self.name),
            RateLimitScope::Endpoint => format!("endpoint:{}:{}", endpoint.unwrap_or(""), self.name),
            RateLimitScope::IpEndpoint => {
                format!("ip_endpoint:{}:{}:{}", ip.unwrap_or(""), endpoint.unwrap_or(""), self.name)
            }
            RateLimitScope::UserEndpoint => {
                format!("user_endpoint:{}:{}:{}", user.unwrap_or(""), endpoint.unwrap_or(""), self.name)
            }
        }
    }
}

impl fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Outcome of a rate-limit check.
///
/// Invariant: if `!allowed` then `retry_after_seconds >= 1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub rule_name: String,
    pub current_count: u64,
    pub limit: u64,
    pub window_seconds: u64,
    pub reset_time: chrono::DateTime<chrono::Utc>,
    pub retry_after_seconds: Option<u64>,
    pub details: String,
}

impl RateLimitDecision {
    /// Sentinel decision returned when the storage backend is unavailable:
    /// never deny because of an infrastructure failure.
    pub fn degraded(now: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            allowed: true,
            rule_name: "degraded".to_string(),
            current_count: 0,
            limit: 0,
            window_seconds: 0,
            reset_time: now,
            retry_after_seconds: None,
            details: "rate-limit storage unavailable, admitting request".to_string(),
        }
    }
}
