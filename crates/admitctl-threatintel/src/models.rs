//! Types for the per-client threat-intelligence store (C3).

use admitctl_patterns::AttackCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Coarse reputation label derived from a [`ThreatIntelEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reputation {
    Trusted,
    Unknown,
    Suspicious,
    Malicious,
}

impl fmt::Display for Reputation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Reputation::Trusted => "trusted",
            Reputation::Unknown => "unknown",
            Reputation::Suspicious => "suspicious",
            Reputation::Malicious => "malicious",
        };
        f.write_str(s)
    }
}

/// Per-client-hash threat record.
///
/// Invariants (enforced by [`crate::store::ThreatIntelStore`]):
/// `first_seen <= last_seen`; `threat_score` is monotonically
/// non-decreasing within a single `record` call but may decay between
/// calls; `blocked` is sticky once set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatIntelEntry {
    pub threat_score: f64,
    pub attack_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub attack_categories: BTreeSet<AttackCategory>,
    pub blocked: bool,
    pub notes: Option<String>,
}

impl ThreatIntelEntry {
    pub(crate) fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            threat_score: 0.0,
            attack_count: 0,
            first_seen: now,
            last_seen: now,
            attack_categories: BTreeSet::new(),
            blocked: false,
            notes: None,
        }
    }
}

/// On-disk representation of a [`ThreatIntelEntry`], keyed by
/// `client_ip_hash`, matching the JSON snapshot field names from §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub threat_score: f64,
    pub attack_count: u64,
    pub last_seen: DateTime<Utc>,
    pub attack_types: Vec<AttackCategory>,
    pub first_seen: DateTime<Utc>,
    pub blocked: bool,
    pub notes: Option<String>,
}

impl From<&ThreatIntelEntry> for PersistedEntry {
    fn from(e: &ThreatIntelEntry) -> Self {
        Self {
            threat_score: e.threat_score,
            attack_count: e.attack_count,
            last_seen: e.last_seen,
            attack_types: e.attack_categories.iter().copied().collect(),
            first_seen: e.first_seen,
            blocked: e.blocked,
            notes: e.notes.clone(),
        }
    }
}

impl From<PersistedEntry> for ThreatIntelEntry {
    fn from(p: PersistedEntry) -> Self {
        Self {
            threat_score: p.threat_score,
            attack_count: p.attack_count,
            first_seen: p.first_seen,
            last_seen: p.last_seen,
            attack_categories: p.attack_types.into_iter().collect(),
            blocked: p.blocked,
            notes: p.notes,
        }
    }
}

/// Aggregate statistics over the whole store, added for operational
/// introspection beyond the per-client contract.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ThreatIntelStats {
    pub total_entries: usize,
    pub blocked_entries: usize,
    pub mean_threat_score: f64,
}

#[derive(Debug, Error)]
pub enum ThreatIntelError {
    #[error("threat-intel snapshot path has no parent directory")]
    InvalidSnapshotPath,
    #[error("failed to (de)serialize threat-intel snapshot: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("failed to write threat-intel snapshot: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ThreatIntelError>;
