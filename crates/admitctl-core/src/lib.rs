//! # Admission-control pipeline coordinator
//!
//! Wires the sanitiser and pattern library ([`admitctl_patterns`]), the
//! threat-intelligence store ([`admitctl_threatintel`]), the rate limiter
//! ([`admitctl_ratelimit`]), and the HTTP validator ([`admitctl_validator`])
//! into one admission-control decision per request, plus the sanitising
//! logger and metrics collector that give that decision an audit trail.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         admitctl-core                            │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                        ┌─────────────┐                           │
//! │                        │  Pipeline   │  ← single entry point      │
//! │                        └──────┬──────┘                           │
//! │                               │                                  │
//! │        ┌──────────────────────┼──────────────────────┐           │
//! │        ▼                      ▼                      ▼           │
//! │  ┌───────────┐         ┌──────────────┐       ┌──────────────┐   │
//! │  │ Validator │ ──C4──▶ │ RateLimiter   │──────▶│ Logger/Metrics│  │
//! │  │ (C4 + C5) │         │ (C6 + C7)     │       │ (C8 + C9)     │  │
//! │  └───────────┘         └──────────────┘       └──────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! # tokio_test::block_on(async {
//! use admitctl_core::{Pipeline, PipelineConfig};
//! use admitctl_validator::Request;
//!
//! let pipeline = Pipeline::new(PipelineConfig::default()).await.unwrap();
//! let request = Request::new("GET", "/api/widgets").with_client_addr("203.0.113.9");
//! let decision = pipeline.evaluate(&request).await;
//! assert!(decision.is_admitted());
//! # });
//! ```
//!
//! ## Security notes
//!
//! - Checks execute in a fixed order: C5 (validate) → C7 (rate-limit) → C8/C9 (log+record).
//! - The pipeline is fail-*open*: a storage outage or a deadline expiry admits the
//!   request with a `degraded` marker rather than blocking it (§5, §7) — an
//!   admission-control layer must never itself become a denial-of-service vector.
//! - Construction-time errors (bad config, pattern-compile failure) are eager `Err`s;
//!   hot-path errors never reach the caller as an `Err` — they become a conservative
//!   [`Decision`] plus a logged event.

mod config;
mod decision;
mod error;
mod logger;
mod metrics;
mod pipeline;

pub use config::{LoggingConfig, PipelineConfig, StorageBackend};
pub use decision::{http_status_for, Decision};
pub use error::{PipelineError, Result};
pub use logger::{EventKind, SanitisingLogger, SecurityEvent, SecurityEventStats};
pub use metrics::{MetricsCollector, MetricsSummary};
pub use pipeline::Pipeline;

// Re-exported for callers building a request view without an extra dependency.
pub use admitctl_validator::{ErrorKind, Headers, Request};
