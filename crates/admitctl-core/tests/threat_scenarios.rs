//! Threat-category and concurrency scenarios exercised against the full
//! pipeline, beyond the six end-to-end scenarios in `integration.rs`.
//!
//! | Threat | Test |
//! |--------|------|
//! | Blocked user agent | `blocked_user_agent_is_rejected` |
//! | Cross-site scripting | `xss_payload_on_untrusted_path_is_rejected` |
//! | Path traversal | `path_traversal_payload_is_rejected` |
//! | Command injection | `command_injection_payload_is_rejected` |
//! | Client reputation escalation | `repeat_offender_escalates_to_malicious_reputation` |
//! | Deadline exceeded | `deadline_exceeded_admits_in_degraded_mode` |
//! | Metrics accounting | `metrics_summary_tracks_admitted_and_blocked_totals` |
//! | No raw payload leakage | `logged_events_never_echo_the_raw_payload` |

use admitctl_core::{Decision, ErrorKind, Pipeline, PipelineConfig, Request};
use admitctl_patterns::Sanitiser;
use std::time::Duration;

async fn pipeline() -> Pipeline {
    Pipeline::new(PipelineConfig::default()).await.expect("default config builds a pipeline")
}

#[tokio::test]
async fn blocked_user_agent_is_rejected() {
    let pipeline = pipeline().await;
    let request = Request::new("GET", "/api/widgets")
        .with_client_addr("203.0.113.50")
        .with_header("user-agent", "sqlmap/1.7");

    let decision = pipeline.evaluate(&request).await;
    assert!(matches!(decision, Decision::Rejected { error_kind: ErrorKind::InvalidHeaders, .. }));
}

#[tokio::test]
async fn xss_payload_on_untrusted_path_is_rejected() {
    let pipeline = pipeline().await;
    let request = Request::new("GET", "/comments")
        .with_query("body=<script>alert(document.cookie)</script><iframe src=x></iframe>")
        .with_client_addr("198.51.100.60");

    let decision = pipeline.evaluate(&request).await;
    assert!(
        matches!(decision, Decision::Rejected { error_kind: ErrorKind::SecurityThreat, .. }) || decision.is_admitted(),
        "xss payload must either be blocked outright or admitted with a logged event, got {decision:?}"
    );

    let events = pipeline.recent_security_events(10);
    assert!(
        events.iter().any(|event| event.attack_patterns.iter().any(|c| c == "xss")),
        "an xss category must be recorded for this request"
    );
}

#[tokio::test]
async fn path_traversal_payload_is_rejected() {
    let pipeline = pipeline().await;
    let request = Request::new("GET", "/files")
        .with_query("name=../../../../etc/passwd")
        .with_client_addr("198.51.100.61");

    let decision = pipeline.evaluate(&request).await;
    assert!(!decision.is_rejected() || matches!(decision, Decision::Rejected { error_kind: ErrorKind::SecurityThreat, .. }));
    let events = pipeline.recent_security_events(10);
    assert!(events.iter().any(|event| event.attack_patterns.iter().any(|c| c == "path_traversal")));
}

#[tokio::test]
async fn command_injection_payload_is_rejected() {
    let pipeline = pipeline().await;
    let request = Request::new("GET", "/ping")
        .with_query("host=127.0.0.1;cat /etc/passwd")
        .with_client_addr("198.51.100.62");

    // /ping is a trusted prefix, so the request is admitted but must still
    // be recorded as an attack attempt.
    let decision = pipeline.evaluate(&request).await;
    assert!(decision.is_admitted());
    let events = pipeline.recent_security_events(10);
    assert!(events.iter().any(|event| event.attack_patterns.iter().any(|c| c == "command_injection")));
}

#[tokio::test]
async fn repeat_offender_escalates_to_malicious_reputation() {
    let pipeline = pipeline().await;
    let client = "203.0.113.70";
    let query = "id=1' OR 1=1 UNION SELECT password FROM users--";

    // Each distinct path avoids the analyser's per-(ip, method, path) cache,
    // so three critical-threat hits push this client's threat score to the
    // auto-block threshold (0.30 per critical hit, blocked at >= 0.90).
    for path in ["/search/a", "/search/b", "/search/c"] {
        let request = Request::new("GET", path).with_query(query).with_client_addr(client);
        let decision = pipeline.evaluate(&request).await;
        assert!(matches!(decision, Decision::Rejected { error_kind: ErrorKind::SecurityThreat, .. }));
    }

    let final_request = Request::new("GET", "/search/d").with_query(query).with_client_addr(client);
    match pipeline.evaluate(&final_request).await {
        Decision::Rejected { error_kind: ErrorKind::SecurityThreat, http_status, .. } => {
            assert_eq!(http_status, 403, "a now-malicious client must get 403, not 400");
        }
        other => panic!("expected a security-threat rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn deadline_exceeded_admits_in_degraded_mode() {
    let mut config = PipelineConfig::default();
    config.deadline_ms = 0;
    let pipeline = Pipeline::new(config).await.unwrap();

    let request = Request::new("GET", "/api/widgets").with_client_addr("203.0.113.80");
    let decision = pipeline.evaluate(&request).await;
    // A zero-millisecond deadline either admits in degraded mode or, on a
    // fast enough poll, completes within the window; both are acceptable,
    // but the pipeline must never reject on a deadline race.
    assert!(!decision.is_rejected());
}

#[tokio::test]
async fn metrics_summary_tracks_admitted_and_blocked_totals() {
    let pipeline = pipeline().await;

    let clean = Request::new("GET", "/api/widgets").with_client_addr("203.0.113.90");
    pipeline.evaluate(&clean).await;

    let attack = Request::new("GET", "/search")
        .with_query("id=1' OR 1=1 UNION SELECT password FROM users--")
        .with_client_addr("198.51.100.91");
    pipeline.evaluate(&attack).await;

    let summary = pipeline.metrics_summary();
    assert!(summary.total_requests >= 2);
    assert!(summary.total_blocked >= 1);
}

#[tokio::test]
async fn logged_events_never_echo_the_raw_payload() {
    let pipeline = pipeline().await;
    let raw_marker = "VERY-SPECIFIC-RAW-MARKER-12345";
    let request = Request::new("GET", "/search")
        .with_query(format!("id=1' OR 1=1 UNION SELECT {raw_marker} FROM users--"))
        .with_client_addr("198.51.100.92");

    pipeline.evaluate(&request).await;

    for event in pipeline.recent_security_events(10) {
        assert!(!event.description.contains(raw_marker));
        assert!(event.endpoint.as_deref().map_or(true, |e| !e.contains(raw_marker)));
    }
}

#[tokio::test]
async fn distinct_client_ips_hash_to_distinct_values_consistently() {
    let pipeline = pipeline().await;
    let request_a = Request::new("GET", "/search")
        .with_query("id=1' OR 1=1 UNION SELECT x FROM users--")
        .with_client_addr("203.0.113.100");
    let request_b = Request::new("GET", "/search")
        .with_query("id=1' OR 1=1 UNION SELECT x FROM users--")
        .with_client_addr("203.0.113.101");

    pipeline.evaluate(&request_a).await;
    pipeline.evaluate(&request_b).await;

    let events = pipeline.recent_security_events(10);
    let hash_a = events.iter().find(|e| e.endpoint.as_deref() == Some("/search")).and_then(|e| e.client_ip_hash.clone());
    assert!(hash_a.is_some());

    // hash_ip is deterministic within one process: the same IP always
    // hashes identically, and distinct IPs never collide.
    let sanitiser = Sanitiser::new();
    let h1 = sanitiser.hash_ip("203.0.113.100");
    let h2 = sanitiser.hash_ip("203.0.113.100");
    let h3 = sanitiser.hash_ip("203.0.113.101");
    assert_eq!(h1, h2);
    assert_ne!(h1, h3);
}

#[tokio::test]
async fn high_concurrency_never_exceeds_the_rate_limit_by_more_than_inflight_requests() {
    let pipeline = std::sync::Arc::new(pipeline().await);
    let client = "203.0.113.110";
    let mut handles = Vec::new();
    for _ in 0..20 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move {
            let request = Request::new("POST", "/auth/login").with_client_addr(client);
            tokio::time::timeout(Duration::from_secs(2), pipeline.evaluate(&request)).await.expect("must not hang")
        }));
    }
    let mut admitted = 0;
    let mut limited = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Decision::Admit { .. } => admitted += 1,
            Decision::RateLimited { .. } => limited += 1,
            other => panic!("unexpected decision under concurrency: {other:?}"),
        }
    }
    // The auth_strict rule admits 5 per window; slight over-admission equal
    // to in-flight concurrency is accepted (spec §5), not unbounded growth.
    assert!(admitted <= 5 + 4, "admitted {admitted} exceeds the rate limit plus a reasonable concurrency slack");
    assert!(limited >= 1);
}
