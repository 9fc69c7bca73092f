//! # Threat Intelligence Store
//!
//! A concurrent per-client reputation map (C3). Every observed attack
//! against a client raises that client's threat score; the security
//! analyser consults the resulting reputation label when scoring future
//! requests from the same client.
//!
//! ## Persistence
//!
//! The store loads from a JSON snapshot file at construction and rewrites
//! it asynchronously every `flush_every` mutations (default 10). A missing
//! or malformed snapshot is treated as an empty store — persistence is
//! best-effort and never blocks startup.
//!
//! ## Usage
//!
//! ```rust
//! use admitctl_patterns::{AttackCategory, ThreatLevel};
//! use admitctl_threatintel::{Reputation, ThreatIntelStore};
//!
//! let store = ThreatIntelStore::in_memory();
//! assert_eq!(store.reputation("unseen"), Reputation::Unknown);
//!
//! store.record("abc123", ThreatLevel::High, &[AttackCategory::SqlInjection]);
//! assert_ne!(store.reputation("abc123"), Reputation::Unknown);
//! ```

pub mod models;
pub mod store;

pub use models::{PersistedEntry, Reputation, Result, ThreatIntelEntry, ThreatIntelError, ThreatIntelStats};
pub use store::{spawn_periodic_flush, ThreatIntelStore};
