//! Rule selection and the three rate-limit algorithms (C7).

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::{RateLimitAlgorithm, RateLimitDecision, RateLimitRule, RateLimitScope};
use crate::storage::RateLimitStorage;

/// Context identifying the caller for rule matching and key derivation.
#[derive(Debug, Clone, Default)]
pub struct RateLimitContext {
    pub ip: Option<String>,
    pub endpoint: Option<String>,
    pub user: Option<String>,
    pub user_type: Option<String>,
}

struct RuleCacheEntry {
    rule_index: Option<usize>,
    cached_at: Instant,
}

/// Orders rules by descending priority, selects the first match for a
/// request context, and runs the selected algorithm against [`RateLimitStorage`].
///
/// `S` is left `?Sized` so callers that select a storage backend at
/// runtime (rather than at the type level) can hold a `RateLimiter<dyn
/// RateLimitStorage>` behind one concrete type.
pub struct RateLimiter<S: RateLimitStorage + ?Sized> {
    rules: Vec<RateLimitRule>,
    default_rule: RateLimitRule,
    storage: Arc<S>,
    rule_cache: DashMap<String, RuleCacheEntry>,
    rule_cache_ttl: Duration,
}

impl<S: RateLimitStorage + ?Sized> RateLimiter<S> {
    pub fn new(mut rules: Vec<RateLimitRule>, default_rule: RateLimitRule, storage: Arc<S>) -> Self {
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self {
            rules,
            default_rule,
            storage,
            rule_cache: DashMap::new(),
            rule_cache_ttl: Duration::from_secs(30),
        }
    }

    fn cache_key(ctx: &RateLimitContext) -> String {
        format!(
            "{}|{}|{}|{}",
            ctx.ip.as_deref().unwrap_or(""),
            ctx.endpoint.as_deref().unwrap_or(""),
            ctx.user.as_deref().unwrap_or(""),
            ctx.user_type.as_deref().unwrap_or("")
        )
    }

    fn matches(rule: &RateLimitRule, ctx: &RateLimitContext) -> bool {
        if !rule.enabled {
            return false;
        }
        if rule.scope.requires_ip() && ctx.ip.is_none() {
            return false;
        }
        if rule.scope.requires_user() && ctx.user.is_none() {
            return false;
        }
        if rule.scope.requires_endpoint() && ctx.endpoint.is_none() {
            return false;
        }
        if let Some(endpoints) = &rule.endpoints {
            let Some(endpoint) = &ctx.endpoint else { return false };
            if !endpoints.iter().any(|e| e == endpoint) {
                return false;
            }
        }
        if let Some(user_types) = &rule.user_types {
            let Some(user_type) = &ctx.user_type else { return false };
            if !user_types.iter().any(|t| t == user_type) {
                return false;
            }
        }
        true
    }

    /// Selects the applicable rule for `ctx`, falling back to the default
    /// rule when nothing matches. Results are cached briefly per context.
    fn select_rule(&self, ctx: &RateLimitContext) -> &RateLimitRule {
        let key = Self::cache_key(ctx);
        if let Some(cached) = self.rule_cache.get(&key) {
            if cached.cached_at.elapsed() < self.rule_cache_ttl {
                return match cached.rule_index {
                    Some(i) => &self.rules[i],
                    None => &self.default_rule,
                };
            }
        }
        let found = self.rules.iter().position(|r| Self::matches(r, ctx));
        self.rule_cache.insert(
            key,
            RuleCacheEntry {
                rule_index: found,
                cached_at: Instant::now(),
            },
        );
        match found {
            Some(i) => &self.rules[i],
            None => &self.default_rule,
        }
    }

    /// Read-only admission check; may refill a token bucket as a side
    /// effect but never increments counters or appends timestamps. Callers
    /// must call [`RateLimiter::record`] only after an allowed check.
    ///
    /// On storage failure, degrades to `allowed = true` with rule name
    /// `degraded` — the limiter never denies because of an infra failure.
    pub async fn check(&self, ctx: &RateLimitContext, cost: u64) -> RateLimitDecision {
        let rule = self.select_rule(ctx);
        let key = rule.storage_key(ctx.ip.as_deref(), ctx.endpoint.as_deref(), ctx.user.as_deref());
        let now = Utc::now();
        let outcome = match rule.algorithm {
            RateLimitAlgorithm::FixedWindow => self.check_fixed_window(rule, &key, cost, now).await,
            RateLimitAlgorithm::SlidingWindow => self.check_sliding_window(rule, &key, cost, now).await,
            RateLimitAlgorithm::TokenBucket => self.check_token_bucket(rule, &key, cost, now).await,
        };
        outcome.unwrap_or_else(|_| RateLimitDecision::degraded(now))
    }

    /// Actually increments counters / appends timestamps for an allowed
    /// check. A no-op for token bucket, which already consumed on check.
    pub async fn record(&self, ctx: &RateLimitContext, cost: u64) {
        let rule = self.select_rule(ctx);
        let key = rule.storage_key(ctx.ip.as_deref(), ctx.endpoint.as_deref(), ctx.user.as_deref());
        let now = Utc::now();
        match rule.algorithm {
            RateLimitAlgorithm::FixedWindow => {
                let _ = self.storage.increment_count(&key, rule.window_seconds, cost).await;
            }
            RateLimitAlgorithm::SlidingWindow => {
                let ttl = rule.window_seconds * 2;
                let _ = self.storage.add_timestamp(&key, now, ttl).await;
            }
            RateLimitAlgorithm::TokenBucket => {}
        }
    }

    async fn check_fixed_window(
        &self,
        rule: &RateLimitRule,
        key: &str,
        cost: u64,
        now: DateTime<Utc>,
    ) -> crate::error::Result<RateLimitDecision> {
        let window = ChronoDuration::seconds(rule.window_seconds as i64);
        let start = self.storage.get_window_start(key).await?;
        let needs_reset = match start {
            None => true,
            Some(start) => now - start >= window,
        };
        let window_start = if needs_reset {
            self.storage.set_window_start(key, now, rule.window_seconds * 2).await?;
            now
        } else {
            start.unwrap_or(now)
        };
        let current = if needs_reset { 0 } else { self.storage.get_count(key, rule.window_seconds).await? };
        let allowed = current + cost <= rule.limit;
        let reset_time = window_start + window;
        let retry_after = if allowed {
            None
        } else {
            Some((reset_time - now).num_seconds().max(1) as u64)
        };
        Ok(RateLimitDecision {
            allowed,
            rule_name: rule.name.clone(),
            current_count: current,
            limit: rule.limit,
            window_seconds: rule.window_seconds,
            reset_time,
            retry_after_seconds: retry_after,
            details: format!("fixed_window current={current} limit={}", rule.limit),
        })
    }

    async fn check_sliding_window(
        &self,
        rule: &RateLimitRule,
        key: &str,
        cost: u64,
        now: DateTime<Utc>,
    ) -> crate::error::Result<RateLimitDecision> {
        let window = ChronoDuration::seconds(rule.window_seconds as i64);
        let since = now - window;
        let timestamps = self.storage.timestamps_since(key, since).await?;
        let current = timestamps.len() as u64;
        let allowed = current + cost <= rule.limit;
        let retry_after = if allowed {
            None
        } else {
            let oldest = timestamps.first().copied().unwrap_or(now);
            Some((oldest + window - now).num_seconds().max(1) as u64)
        };
        Ok(RateLimitDecision {
            allowed,
            rule_name: rule.name.clone(),
            current_count: current,
            limit: rule.limit,
            window_seconds: rule.window_seconds,
            reset_time: now + window,
            retry_after_seconds: retry_after,
            details: format!("sliding_window current={current} limit={}", rule.limit),
        })
    }

    async fn check_token_bucket(
        &self,
        rule: &RateLimitRule,
        key: &str,
        cost: u64,
        now: DateTime<Utc>,
    ) -> crate::error::Result<RateLimitDecision> {
        let capacity = rule.capacity();
        let rate_per_second = rule.limit as f64 / rule.window_seconds as f64;
        let tokens = match self.storage.get_window_start(key).await? {
            // A key seen before: refill by elapsed time since the last touch.
            Some(last_refill) => {
                let elapsed = (now - last_refill).num_milliseconds().max(0) as f64 / 1000.0;
                let current_tokens = self.storage.get_count(key, rule.window_seconds).await?;
                let replenished = (elapsed * rate_per_second).floor() as u64;
                (current_tokens + replenished).min(capacity)
            }
            // A fresh key starts with a full bucket, not an empty one.
            None => capacity,
        };
        let allowed = tokens >= cost;
        let remaining = if allowed {
            self.storage.set_window_start(key, now, rule.window_seconds * 2).await?;
            let new_tokens = tokens - cost;
            self.storage.increment_count(key, rule.window_seconds, 0).await?;
            self.storage.set_window_start(key, now, rule.window_seconds * 2).await?;
            // Persist the post-consumption token count via the counter slot.
            self.force_set_tokens(key, new_tokens).await?;
            new_tokens
        } else {
            self.force_set_tokens(key, tokens).await?;
            self.storage.set_window_start(key, now, rule.window_seconds * 2).await?;
            tokens
        };
        let retry_after = if allowed {
            None
        } else {
            let deficit = cost.saturating_sub(remaining) as f64;
            let seconds = (deficit * rule.window_seconds as f64 / rule.limit as f64).ceil() as u64;
            Some(seconds + 1)
        };
        Ok(RateLimitDecision {
            allowed,
            rule_name: rule.name.clone(),
            current_count: remaining,
            limit: capacity,
            window_seconds: rule.window_seconds,
            reset_time: now,
            retry_after_seconds: retry_after,
            details: format!("token_bucket tokens={remaining} capacity={capacity}"),
        })
    }

    async fn force_set_tokens(&self, key: &str, tokens: u64) -> crate::error::Result<()> {
        let current = self.storage.get_count(key, 0).await?;
        if tokens >= current {
            self.storage.increment_count(key, 0, tokens - current).await?;
        } else {
            // No native decrement in the storage interface; re-derive by
            // resetting the window, which also zeroes the counter.
            self.storage.set_window_start(key, Utc::now(), 0).await?;
            self.storage.increment_count(key, 0, tokens).await?;
        }
        Ok(())
    }
}

/// Builds the default rule set (from highest priority): strict auth-endpoint
/// IP+endpoint sliding window; per-user token bucket with burst; per-IP
/// sliding window; global fixed-window fallback.
pub fn default_rules() -> crate::error::Result<Vec<RateLimitRule>> {
    Ok(vec![
        RateLimitRule::new(
            "auth_strict",
            RateLimitScope::IpEndpoint,
            RateLimitAlgorithm::SlidingWindow,
            5,
            60,
            None,
            100,
        )?
        .with_endpoints(vec!["/auth/login".to_string(), "/auth/register".to_string()]),
        RateLimitRule::new(
            "per_user_burst",
            RateLimitScope::User,
            RateLimitAlgorithm::TokenBucket,
            60,
            60,
            Some(100),
            50,
        )?,
        RateLimitRule::new(
            "per_ip_sliding",
            RateLimitScope::Ip,
            RateLimitAlgorithm::SlidingWindow,
            120,
            60,
            None,
            10,
        )?,
    ])
}

pub fn default_fallback_rule() -> crate::error::Result<RateLimitRule> {
    RateLimitRule::new(
        "global_fallback",
        RateLimitScope::Global,
        RateLimitAlgorithm::FixedWindow,
        1000,
        60,
        None,
        0,
    )
}
