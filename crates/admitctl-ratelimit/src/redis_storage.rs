//! Remote-KV backend for [`RateLimitStorage`] (feature `redis-backend`).
//!
//! Counters and window starts are plain `SET`/`INCRBY` keys with a TTL of
//! `2 * window_seconds`; sliding-window timestamps are stored in a sorted
//! set scored by Unix-millis timestamp, matching the storage rotation
//! semantics of a Redis sorted set.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::{RateLimitError, Result};
use crate::storage::{RateLimitStorage, StorageStats};

const KEY_PREFIX: &str = "rl:";

fn counter_key(key: &str) -> String {
    format!("{KEY_PREFIX}count:{key}")
}

fn window_key(key: &str) -> String {
    format!("{KEY_PREFIX}window:{key}")
}

fn timestamps_key(key: &str) -> String {
    format!("{KEY_PREFIX}ts:{key}")
}

/// Redis-backed storage, intended for deployments sharing rate-limit state
/// across multiple process instances.
pub struct RedisRateLimitStorage {
    conn: ConnectionManager,
}

impl RedisRateLimitStorage {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| RateLimitError::StorageUnavailable(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| RateLimitError::StorageUnavailable(e.to_string()))?;
        Ok(Self { conn })
    }
}

fn map_err(e: redis::RedisError) -> RateLimitError {
    RateLimitError::StorageUnavailable(e.to_string())
}

#[async_trait]
impl RateLimitStorage for RedisRateLimitStorage {
    async fn get_count(&self, key: &str, _window_seconds: u64) -> Result<u64> {
        let mut conn = self.conn.clone();
        let value: Option<u64> = conn.get(counter_key(key)).await.map_err(map_err)?;
        Ok(value.unwrap_or(0))
    }

    async fn increment_count(&self, key: &str, window_seconds: u64, amount: u64) -> Result<u64> {
        let mut conn = self.conn.clone();
        let ck = counter_key(key);
        let (new_count,): (u64,) = redis::pipe()
            .atomic()
            .incr(&ck, amount)
            .expire(&ck, (window_seconds * 2) as i64)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(new_count)
    }

    async fn get_window_start(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let mut conn = self.conn.clone();
        let unix: Option<i64> = conn.get(window_key(key)).await.map_err(map_err)?;
        Ok(unix.and_then(|u| DateTime::from_timestamp(u, 0)))
    }

    async fn set_window_start(&self, key: &str, start: DateTime<Utc>, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let wk = window_key(key);
        let ck = counter_key(key);
        redis::pipe()
            .atomic()
            .set_ex(&wk, start.timestamp(), ttl_seconds.max(1))
            .set_ex(&ck, 0u64, ttl_seconds.max(1))
            .query_async::<()>(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn add_timestamp(&self, key: &str, t: DateTime<Utc>, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let tk = timestamps_key(key);
        let millis = t.timestamp_millis();
        redis::pipe()
            .atomic()
            .zadd(&tk, millis, millis)
            .expire(&tk, ttl_seconds.max(1) as i64)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn timestamps_since(&self, key: &str, since: DateTime<Utc>) -> Result<Vec<DateTime<Utc>>> {
        let mut conn = self.conn.clone();
        let tk = timestamps_key(key);
        let since_millis = since.timestamp_millis();
        let _: () = conn
            .zrembyscore(&tk, "-inf", format!("({since_millis}"))
            .await
            .map_err(map_err)?;
        let millis: Vec<i64> = conn
            .zrangebyscore(&tk, format!("({since_millis}"), "+inf")
            .await
            .map_err(map_err)?;
        Ok(millis
            .into_iter()
            .filter_map(|m| DateTime::from_timestamp_millis(m))
            .collect())
    }

    async fn cleanup(&self, cutoff: DateTime<Utc>) -> Result<()> {
        // Expiring keys already age out via TTL; nothing to do eagerly here
        // beyond what timestamps_since already trims on read.
        let _ = cutoff;
        Ok(())
    }

    async fn stats(&self) -> Result<StorageStats> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(format!("{KEY_PREFIX}*"))
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(StorageStats {
            tracked_keys: keys.len(),
            approximate_entries: keys.len(),
        })
    }
}
