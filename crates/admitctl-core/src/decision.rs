//! The pipeline's external-facing outcome type (§6).
//!
//! Replaces the teacher's `Verdict` (`Allow`/`Block`/`Review`) with the
//! three-way shape the HTTP admission-control contract requires. The
//! caller is responsible for translating a `Decision` into an HTTP
//! response; this type never writes one itself.

use serde::{Deserialize, Serialize};

use admitctl_validator::ErrorKind;

/// Outcome of one `Pipeline::evaluate` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decision {
    /// The request may proceed. `degraded` is set when a component failed
    /// open (a storage outage, or the overall evaluation deadline expired)
    /// rather than having genuinely cleared every check.
    Admit { degraded: bool },

    /// C5 rejected the request before it reached the rate limiter.
    Rejected {
        error_kind: ErrorKind,
        http_status: u16,
        retry_after_seconds: Option<u64>,
    },

    /// C7 denied the request.
    RateLimited { rule_name: String, retry_after_seconds: u64 },
}

impl Decision {
    pub fn admit() -> Self {
        Self::Admit { degraded: false }
    }

    pub fn admit_degraded() -> Self {
        Self::Admit { degraded: true }
    }

    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admit { .. })
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Admit { degraded: true })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// The HTTP status a caller should respond with.
    pub fn http_status(&self) -> u16 {
        match self {
            Decision::Admit { .. } => 200,
            Decision::Rejected { http_status, .. } => *http_status,
            Decision::RateLimited { .. } => 429,
        }
    }
}

/// Maps a C5 `error_kind` + client reputation to the status table in §4.10.
pub fn http_status_for(error_kind: ErrorKind, reputation_is_malicious: bool) -> u16 {
    match error_kind {
        ErrorKind::MalformedRequest => 400,
        ErrorKind::InvalidMethod => 405,
        ErrorKind::InvalidHeaders => 400,
        ErrorKind::ContentTooLarge => 413,
        ErrorKind::SecurityThreat => {
            if reputation_is_malicious {
                403
            } else {
                400
            }
        }
        ErrorKind::ValidationError => 400,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admit_degraded_reports_degraded() {
        let decision = Decision::admit_degraded();
        assert!(decision.is_admitted());
        assert!(decision.is_degraded());
        assert_eq!(decision.http_status(), 200);
    }

    #[test]
    fn status_mapping_matches_table() {
        assert_eq!(http_status_for(ErrorKind::MalformedRequest, false), 400);
        assert_eq!(http_status_for(ErrorKind::InvalidMethod, false), 405);
        assert_eq!(http_status_for(ErrorKind::ContentTooLarge, false), 413);
        assert_eq!(http_status_for(ErrorKind::SecurityThreat, false), 400);
        assert_eq!(http_status_for(ErrorKind::SecurityThreat, true), 403);
    }

    #[test]
    fn rate_limited_status_is_429() {
        let decision = Decision::RateLimited { rule_name: "per_ip".to_string(), retry_after_seconds: 5 };
        assert_eq!(decision.http_status(), 429);
    }
}
