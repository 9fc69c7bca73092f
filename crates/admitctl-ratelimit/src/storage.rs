//! Abstract counter/timestamp store for the rate limiter (C6), plus an
//! in-memory backend.
//!
//! Per-key deques are capped at [`MAX_TIMESTAMPS_PER_KEY`] entries; past
//! that, the oldest timestamps are evicted before the newest is pushed, the
//! same bounded-growth trade-off the context manager makes for execution
//! frames — guaranteed memory bounds over unlimited history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::error::Result;

/// Per-key deques are capped at this many timestamps; oldest entries are
/// evicted first once the cap is reached.
pub const MAX_TIMESTAMPS_PER_KEY: usize = 10_000;

/// Aggregate storage statistics, exposed for operational introspection.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageStats {
    pub tracked_keys: usize,
    pub approximate_entries: usize,
}

/// Abstract counter/timestamp store. Both the in-memory and remote-KV
/// implementations must be safe under concurrent use from many request
/// evaluations at once.
#[async_trait]
pub trait RateLimitStorage: Send + Sync {
    async fn get_count(&self, key: &str, window_seconds: u64) -> Result<u64>;

    /// Increments `key`'s counter by `amount`, returning the new count.
    /// Must atomically set a TTL of `2 * window_seconds` on first write.
    async fn increment_count(&self, key: &str, window_seconds: u64, amount: u64) -> Result<u64>;

    async fn get_window_start(&self, key: &str) -> Result<Option<DateTime<Utc>>>;

    async fn set_window_start(&self, key: &str, start: DateTime<Utc>, ttl_seconds: u64) -> Result<()>;

    async fn add_timestamp(&self, key: &str, t: DateTime<Utc>, ttl_seconds: u64) -> Result<()>;

    /// Timestamps for `key` strictly after `since`; entries at or before
    /// `since` are evicted as a side effect.
    async fn timestamps_since(&self, key: &str, since: DateTime<Utc>) -> Result<Vec<DateTime<Utc>>>;

    async fn cleanup(&self, cutoff: DateTime<Utc>) -> Result<()>;

    async fn stats(&self) -> Result<StorageStats>;
}

#[derive(Default)]
struct KeyState {
    count: AtomicU64,
    window_start_unix: AtomicI64,
    timestamps: std::sync::Mutex<VecDeque<DateTime<Utc>>>,
}

/// Single-process in-memory backend. Bounded per-key deques, opportunistic
/// cleanup every five minutes of last activity.
pub struct MemoryRateLimitStorage {
    keys: DashMap<String, KeyState>,
    last_cleanup: std::sync::Mutex<Instant>,
    cleanup_interval: Duration,
}

impl MemoryRateLimitStorage {
    pub fn new() -> Self {
        Self {
            keys: DashMap::new(),
            last_cleanup: std::sync::Mutex::new(Instant::now()),
            cleanup_interval: Duration::from_secs(5 * 60),
        }
    }

    async fn maybe_opportunistic_cleanup(&self) {
        let should_run = {
            let mut last = self.last_cleanup.lock().expect("lock not poisoned");
            if last.elapsed() >= self.cleanup_interval {
                *last = Instant::now();
                true
            } else {
                false
            }
        };
        if should_run {
            let cutoff = Utc::now() - chrono::Duration::from_std(self.cleanup_interval).unwrap();
            let _ = self.cleanup(cutoff).await;
        }
    }
}

impl Default for MemoryRateLimitStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimitStorage for MemoryRateLimitStorage {
    async fn get_count(&self, key: &str, _window_seconds: u64) -> Result<u64> {
        self.maybe_opportunistic_cleanup().await;
        Ok(self
            .keys
            .get(key)
            .map(|s| s.count.load(Ordering::Relaxed))
            .unwrap_or(0))
    }

    async fn increment_count(&self, key: &str, _window_seconds: u64, amount: u64) -> Result<u64> {
        let entry = self.keys.entry(key.to_string()).or_default();
        Ok(entry.count.fetch_add(amount, Ordering::Relaxed) + amount)
    }

    async fn get_window_start(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.keys.get(key).and_then(|s| {
            let unix = s.window_start_unix.load(Ordering::Relaxed);
            if unix == 0 {
                None
            } else {
                DateTime::from_timestamp(unix, 0)
            }
        }))
    }

    async fn set_window_start(&self, key: &str, start: DateTime<Utc>, _ttl_seconds: u64) -> Result<()> {
        let entry = self.keys.entry(key.to_string()).or_default();
        entry.window_start_unix.store(start.timestamp(), Ordering::Relaxed);
        entry.count.store(0, Ordering::Relaxed);
        Ok(())
    }

    async fn add_timestamp(&self, key: &str, t: DateTime<Utc>, _ttl_seconds: u64) -> Result<()> {
        let entry = self.keys.entry(key.to_string()).or_default();
        let mut deque = entry.timestamps.lock().expect("lock not poisoned");
        if deque.len() >= MAX_TIMESTAMPS_PER_KEY {
            deque.pop_front();
        }
        deque.push_back(t);
        Ok(())
    }

    async fn timestamps_since(&self, key: &str, since: DateTime<Utc>) -> Result<Vec<DateTime<Utc>>> {
        let Some(entry) = self.keys.get(key) else {
            return Ok(Vec::new());
        };
        let mut deque = entry.timestamps.lock().expect("lock not poisoned");
        while matches!(deque.front(), Some(front) if *front <= since) {
            deque.pop_front();
        }
        Ok(deque.iter().copied().collect())
    }

    async fn cleanup(&self, cutoff: DateTime<Utc>) -> Result<()> {
        for entry in self.keys.iter() {
            let mut deque = entry.timestamps.lock().expect("lock not poisoned");
            while matches!(deque.front(), Some(front) if *front < cutoff) {
                deque.pop_front();
            }
        }
        self.keys.retain(|_, state| {
            !state.timestamps.lock().expect("lock not poisoned").is_empty() || state.count.load(Ordering::Relaxed) > 0
        });
        Ok(())
    }

    async fn stats(&self) -> Result<StorageStats> {
        let tracked_keys = self.keys.len();
        let approximate_entries = self
            .keys
            .iter()
            .map(|e| e.timestamps.lock().expect("lock not poisoned").len())
            .sum();
        Ok(StorageStats {
            tracked_keys,
            approximate_entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn increment_count_accumulates() {
        let storage = MemoryRateLimitStorage::new();
        assert_eq!(storage.increment_count("k", 60, 1).await.unwrap(), 1);
        assert_eq!(storage.increment_count("k", 60, 1).await.unwrap(), 2);
        assert_eq!(storage.get_count("k", 60).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn set_window_start_resets_count() {
        let storage = MemoryRateLimitStorage::new();
        storage.increment_count("k", 60, 5).await.unwrap();
        storage.set_window_start("k", Utc::now(), 120).await.unwrap();
        assert_eq!(storage.get_count("k", 60).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn timestamps_since_evicts_old_entries() {
        let storage = MemoryRateLimitStorage::new();
        let base = Utc::now();
        storage.add_timestamp("k", base - chrono::Duration::seconds(120), 300).await.unwrap();
        storage.add_timestamp("k", base, 300).await.unwrap();
        let since = base - chrono::Duration::seconds(60);
        let remaining = storage.timestamps_since("k", since).await.unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn per_key_deque_is_bounded() {
        let storage = MemoryRateLimitStorage::new();
        for i in 0..(MAX_TIMESTAMPS_PER_KEY + 10) {
            storage
                .add_timestamp("k", Utc::now() + chrono::Duration::milliseconds(i as i64), 300)
                .await
                .unwrap();
        }
        let all = storage.timestamps_since("k", Utc::now() - chrono::Duration::hours(1)).await.unwrap();
        assert!(all.len() <= MAX_TIMESTAMPS_PER_KEY);
    }
}
