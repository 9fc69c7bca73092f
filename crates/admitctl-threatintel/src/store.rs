//! Concurrent per-client threat-intelligence map with JSON snapshot
//! persistence (C3).

use crate::models::{PersistedEntry, Reputation, Result, ThreatIntelEntry, ThreatIntelError, ThreatIntelStats};
use admitctl_patterns::{AttackCategory, ThreatLevel};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

fn score_delta(level: ThreatLevel) -> f64 {
    match level {
        ThreatLevel::Critical => 0.30,
        ThreatLevel::High => 0.20,
        ThreatLevel::Medium => 0.10,
        ThreatLevel::Low => 0.05,
        ThreatLevel::None => 0.0,
    }
}

/// How often (in mutations) the snapshot file is rewritten.
const DEFAULT_FLUSH_EVERY: u64 = 10;

/// Per-client-hash reputation store backed by a `DashMap` and a JSON
/// snapshot file reloaded at construction.
///
/// A malformed or missing snapshot is treated as an empty store rather than
/// a construction error — persistence is best-effort, never a precondition
/// for serving traffic.
pub struct ThreatIntelStore {
    entries: DashMap<String, ThreatIntelEntry>,
    snapshot_path: Option<PathBuf>,
    flush_every: u64,
    mutations_since_flush: AtomicU64,
}

impl ThreatIntelStore {
    /// Builds a store with no persistence; useful for tests and for
    /// deployments that accept losing reputation state across restarts.
    pub fn in_memory() -> Self {
        Self {
            entries: DashMap::new(),
            snapshot_path: None,
            flush_every: DEFAULT_FLUSH_EVERY,
            mutations_since_flush: AtomicU64::new(0),
        }
    }

    /// Builds a store backed by a JSON snapshot file, loading any existing
    /// state immediately. The snapshot is rewritten every `flush_every`
    /// mutations (default 10).
    pub fn with_snapshot(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = load_snapshot(&path).unwrap_or_else(|err| {
            warn!(error = %err, path = %path.display(), "threat-intel snapshot unreadable, starting empty");
            DashMap::new()
        });
        Self {
            entries,
            snapshot_path: Some(path),
            flush_every: DEFAULT_FLUSH_EVERY,
            mutations_since_flush: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_flush_every(mut self, n: u64) -> Self {
        self.flush_every = n.max(1);
        self
    }

    /// Upserts an entry for `hash`, applying the threat-score delta and
    /// category set for this observation. Auto-blocks once the score
    /// reaches 0.90 or the attack count reaches 20; blocking is sticky.
    pub fn record(&self, hash: &str, level: ThreatLevel, categories: &[AttackCategory]) {
        let now = Utc::now();
        {
            let mut entry = self
                .entries
                .entry(hash.to_string())
                .or_insert_with(|| ThreatIntelEntry::fresh(now));
            entry.attack_count += 1;
            entry.last_seen = now;
            for category in categories {
                entry.attack_categories.insert(*category);
            }
            entry.threat_score = (entry.threat_score + score_delta(level)).min(1.0);
            if entry.threat_score >= 0.90 || entry.attack_count >= 20 {
                entry.blocked = true;
            }
        }
        self.maybe_flush();
    }

    /// Coarse reputation label for `hash`. `unknown` if no entry exists.
    pub fn reputation(&self, hash: &str) -> Reputation {
        let Some(entry) = self.entries.get(hash) else {
            return Reputation::Unknown;
        };
        if entry.blocked || entry.threat_score > 0.8 {
            Reputation::Malicious
        } else if entry.threat_score > 0.5 || entry.attack_count > 5 {
            Reputation::Suspicious
        } else if entry.threat_score < 0.1 && entry.attack_count == 0 {
            Reputation::Trusted
        } else {
            Reputation::Unknown
        }
    }

    /// Returns a clone of the entry for `hash`, if any.
    pub fn entry(&self, hash: &str) -> Option<ThreatIntelEntry> {
        self.entries.get(hash).map(|e| e.clone())
    }

    /// Removes non-blocked entries whose `last_seen` predates `cutoff`.
    pub fn prune(&self, cutoff: DateTime<Utc>) {
        self.entries.retain(|_, entry| entry.blocked || entry.last_seen >= cutoff);
    }

    /// Removes entries unseen for longer than `max_age`; convenience
    /// wrapper over [`ThreatIntelStore::prune`].
    pub fn prune_older_than(&self, max_age: Duration) {
        self.prune(Utc::now() - max_age);
    }

    pub fn stats(&self) -> ThreatIntelStats {
        let total_entries = self.entries.len();
        let mut blocked_entries = 0usize;
        let mut score_sum = 0.0;
        for entry in self.entries.iter() {
            if entry.blocked {
                blocked_entries += 1;
            }
            score_sum += entry.threat_score;
        }
        let mean_threat_score = if total_entries == 0 {
            0.0
        } else {
            score_sum / total_entries as f64
        };
        ThreatIntelStats {
            total_entries,
            blocked_entries,
            mean_threat_score,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forces an immediate snapshot rewrite, bypassing the mutation counter.
    pub fn flush(&self) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        write_snapshot(path, &self.entries)
    }

    fn maybe_flush(&self) {
        if self.snapshot_path.is_none() {
            return;
        }
        let count = self.mutations_since_flush.fetch_add(1, Ordering::Relaxed) + 1;
        if count % self.flush_every == 0 {
            if let Err(err) = self.flush() {
                warn!(error = %err, "failed to write threat-intel snapshot");
            }
        }
    }
}

fn load_snapshot(path: &Path) -> Result<DashMap<String, ThreatIntelEntry>> {
    if !path.exists() {
        return Ok(DashMap::new());
    }
    let raw = std::fs::read_to_string(path)?;
    let persisted: BTreeMap<String, PersistedEntry> = match serde_json::from_str(&raw) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "threat-intel snapshot is malformed, starting empty");
            return Ok(DashMap::new());
        }
    };
    let entries = DashMap::new();
    for (hash, persisted_entry) in persisted {
        entries.insert(hash, persisted_entry.into());
    }
    Ok(entries)
}

fn write_snapshot(path: &Path, entries: &DashMap<String, ThreatIntelEntry>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let persisted: BTreeMap<String, PersistedEntry> = entries
        .iter()
        .map(|entry| (entry.key().clone(), PersistedEntry::from(entry.value())))
        .collect();
    let json = serde_json::to_string_pretty(&persisted).map_err(ThreatIntelError::Serde)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Spawns a background task that periodically forces a snapshot flush,
/// independent of the mutation-count trigger, so a quiet store still
/// eventually persists.
pub fn spawn_periodic_flush(store: Arc<ThreatIntelStore>, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(err) = store.flush() {
                warn!(error = %err, "periodic threat-intel flush failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn unknown_hash_has_unknown_reputation() {
        let store = ThreatIntelStore::in_memory();
        assert_eq!(store.reputation("nohash"), Reputation::Unknown);
    }

    #[test]
    fn record_raises_reputation() {
        let store = ThreatIntelStore::in_memory();
        store.record("abc123", ThreatLevel::High, &[AttackCategory::SqlInjection]);
        let rep = store.reputation("abc123");
        assert!(matches!(rep, Reputation::Suspicious | Reputation::Malicious));
    }

    #[test]
    fn blocked_is_sticky() {
        let store = ThreatIntelStore::in_memory();
        for _ in 0..20 {
            store.record("repeat-offender", ThreatLevel::Low, &[]);
        }
        assert_eq!(store.reputation("repeat-offender"), Reputation::Malicious);
        let entry = store.entry("repeat-offender").unwrap();
        assert!(entry.blocked);
    }

    #[test]
    fn critical_hits_push_score_to_malicious_quickly() {
        let store = ThreatIntelStore::in_memory();
        store.record("attacker", ThreatLevel::Critical, &[AttackCategory::CommandInjection]);
        store.record("attacker", ThreatLevel::Critical, &[AttackCategory::CommandInjection]);
        store.record("attacker", ThreatLevel::Critical, &[AttackCategory::CommandInjection]);
        assert_eq!(store.reputation("attacker"), Reputation::Malicious);
    }

    #[test]
    fn snapshot_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("threat_intel.json");
        {
            let store = ThreatIntelStore::with_snapshot(&path);
            store.record("client-a", ThreatLevel::High, &[AttackCategory::Xss]);
            store.flush().unwrap();
        }
        let reloaded = ThreatIntelStore::with_snapshot(&path);
        let entry = reloaded.entry("client-a").expect("entry persisted");
        assert_eq!(entry.attack_count, 1);
        assert!(entry.attack_categories.contains(&AttackCategory::Xss));
    }

    #[test]
    fn malformed_snapshot_file_is_treated_as_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("threat_intel.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = ThreatIntelStore::with_snapshot(&path);
        assert!(store.is_empty());
    }

    #[test]
    fn prune_removes_stale_non_blocked_entries() {
        let store = ThreatIntelStore::in_memory();
        store.record("stale", ThreatLevel::Low, &[]);
        store.prune(Utc::now() + Duration::seconds(1));
        assert_eq!(store.reputation("stale"), Reputation::Unknown);
    }

    #[test]
    fn prune_never_removes_blocked_entries() {
        let store = ThreatIntelStore::in_memory();
        for _ in 0..20 {
            store.record("blocked-client", ThreatLevel::Low, &[]);
        }
        store.prune(Utc::now() + Duration::seconds(1));
        assert_eq!(store.reputation("blocked-client"), Reputation::Malicious);
    }

    #[test]
    fn trusted_requires_zero_attacks_and_low_score() {
        let store = ThreatIntelStore::in_memory();
        assert_eq!(store.reputation("never-seen"), Reputation::Unknown);
    }
}
