//! Rate-limit storage and rule evaluation (C6 + C7).
//!
//! [`storage`] defines the [`storage::RateLimitStorage`] trait plus an
//! in-memory implementation; [`redis_storage`] (feature `redis-backend`)
//! adds a shared remote-KV backend. [`limiter::RateLimiter`] selects the
//! highest-priority matching rule for a request context and evaluates it
//! against one of three algorithms: fixed window, sliding window, or token
//! bucket.
//!
//! ```rust
//! # use std::sync::Arc;
//! # use admitctl_ratelimit::{RateLimiter, RateLimitContext, MemoryRateLimitStorage, default_rules, default_fallback_rule};
//! # tokio_test::block_on(async {
//! let storage = Arc::new(MemoryRateLimitStorage::new());
//! let limiter = RateLimiter::new(default_rules().unwrap(), default_fallback_rule().unwrap(), storage);
//! let ctx = RateLimitContext { ip: Some("203.0.113.7".into()), ..Default::default() };
//! let decision = limiter.check(&ctx, 1).await;
//! assert!(decision.allowed);
//! # });
//! ```

pub mod error;
pub mod limiter;
pub mod models;
#[cfg(feature = "redis-backend")]
pub mod redis_storage;
pub mod storage;

pub use error::{RateLimitError, Result};
pub use limiter::{default_fallback_rule, default_rules, RateLimitContext, RateLimiter};
pub use models::{RateLimitAlgorithm, RateLimitDecision, RateLimitRule, RateLimitScope};
#[cfg(feature = "redis-backend")]
pub use redis_storage::RedisRateLimitStorage;
pub use storage::{MemoryRateLimitStorage, RateLimitStorage, StorageStats};
