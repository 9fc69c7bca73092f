//! End-to-end admission-control scenarios.
//!
//! | Scenario | Input | Expected |
//! |----------|-------|----------|
//! | S1 | clean `GET /api/users?page=1` | `Admit`, threat_level none |
//! | S2 | `BREW /coffee` | `Rejected{invalid_method, 405}` |
//! | S3 | oversized `POST /upload` | `Rejected{content_too_large, 413}` |
//! | S4 | SQL injection on a non-trusted path | `Rejected{security_threat, 400}` |
//! | S5 | same injection on a trusted path | `Admit`, with an `attack_pattern_detected` event logged |
//! | S6 | 6 logins from one IP inside one window | 5th `Admit`, 6th `RateLimited{auth_strict, 429}` |

use admitctl_core::{Decision, ErrorKind, Pipeline, PipelineConfig, Request};

async fn pipeline() -> Pipeline {
    Pipeline::new(PipelineConfig::default()).await.expect("default config builds a pipeline")
}

#[tokio::test]
async fn s1_clean_request_is_admitted_with_no_threat() {
    let pipeline = pipeline().await;
    let request = Request::new("GET", "/api/users")
        .with_query("page=1")
        .with_client_addr("192.168.1.100")
        .with_header("user-agent", "test-client/1.0");

    let decision = pipeline.evaluate(&request).await;
    assert_eq!(decision, Decision::Admit { degraded: false });

    let events = pipeline.recent_security_events(10);
    assert!(events.is_empty(), "a clean request must not log a security event");
}

#[tokio::test]
async fn s2_unsupported_method_is_rejected_with_405() {
    let pipeline = pipeline().await;
    let request = Request::new("BREW", "/coffee").with_client_addr("203.0.113.5");

    let decision = pipeline.evaluate(&request).await;
    match decision {
        Decision::Rejected { error_kind, http_status, .. } => {
            assert_eq!(error_kind, ErrorKind::InvalidMethod);
            assert_eq!(http_status, 405);
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn s3_oversized_body_is_rejected_with_413() {
    let pipeline = pipeline().await;
    let request = Request::new("POST", "/upload")
        .with_content_length(20_971_520)
        .with_client_addr("203.0.113.6");
    assert!(request.content_length.unwrap() > pipeline.config().validation.max_content_length);

    let decision = pipeline.evaluate(&request).await;
    match decision {
        Decision::Rejected { error_kind, http_status, .. } => {
            assert_eq!(error_kind, ErrorKind::ContentTooLarge);
            assert_eq!(http_status, 413);
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

fn sql_injection_query() -> &'static str {
    "id=1' OR 1=1 UNION SELECT password FROM users--"
}

#[tokio::test]
async fn s4_sql_injection_on_untrusted_path_is_rejected_with_400() {
    let pipeline = pipeline().await;
    let request = Request::new("GET", "/api/users")
        .with_query(sql_injection_query())
        .with_client_addr("198.51.100.7")
        .with_header("user-agent", "curl/8");

    let decision = pipeline.evaluate(&request).await;
    match decision {
        Decision::Rejected { error_kind, http_status, .. } => {
            assert_eq!(error_kind, ErrorKind::SecurityThreat);
            assert_eq!(http_status, 400);
        }
        other => panic!("expected Rejected, got {other:?}"),
    }

    let events = pipeline.recent_security_events(10);
    let logged = events
        .iter()
        .find(|event| event.attack_patterns.iter().any(|category| category == "sql_injection"));
    assert!(logged.is_some(), "sql_injection must appear among logged attack categories");
}

#[tokio::test]
async fn s5_same_injection_on_trusted_path_is_admitted_but_logged() {
    let pipeline = pipeline().await;
    let request = Request::new("GET", "/api/health")
        .with_query(sql_injection_query())
        .with_client_addr("198.51.100.8")
        .with_header("user-agent", "curl/8");

    let decision = pipeline.evaluate(&request).await;
    assert!(decision.is_admitted(), "a trusted endpoint is never rejected for a matched pattern");

    let events = pipeline.recent_security_events(10);
    let logged = events
        .iter()
        .find(|event| event.event_kind.to_string() == "attack_pattern_detected");
    assert!(logged.is_some(), "the trusted-path admission must still log an attack_pattern_detected event");
}

#[tokio::test]
async fn s6_sixth_login_within_window_is_rate_limited() {
    let pipeline = pipeline().await;
    let mut decisions = Vec::new();
    for _ in 0..6 {
        let request = Request::new("POST", "/auth/login").with_client_addr("203.0.113.9");
        decisions.push(pipeline.evaluate(&request).await);
    }

    for decision in &decisions[..5] {
        assert!(decision.is_admitted(), "expected the first 5 logins to be admitted, got {decision:?}");
    }

    match &decisions[5] {
        Decision::RateLimited { rule_name, retry_after_seconds } => {
            assert_eq!(rule_name, "auth_strict");
            assert!((1..=60).contains(retry_after_seconds), "retry_after {retry_after_seconds} out of [1, 60]");
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn trusted_prefix_never_rejects_for_security_threat_even_with_matching_query() {
    let pipeline = pipeline().await;
    for trusted_path in ["/health", "/api/health", "/status", "/docs"] {
        let request = Request::new("GET", trusted_path)
            .with_query(sql_injection_query())
            .with_client_addr("198.51.100.20");
        let decision = pipeline.evaluate(&request).await;
        assert!(
            !matches!(decision, Decision::Rejected { error_kind: ErrorKind::SecurityThreat, .. }),
            "{trusted_path} must never be rejected as a security threat, got {decision:?}"
        );
    }
}

#[tokio::test]
async fn content_length_boundary_is_admitted_one_byte_over_is_rejected() {
    let pipeline = pipeline().await;
    let limit = pipeline.config().validation.max_content_length;

    let at_limit = Request::new("POST", "/upload").with_content_length(limit).with_client_addr("203.0.113.30");
    assert!(pipeline.evaluate(&at_limit).await.is_admitted());

    let over_limit = Request::new("POST", "/upload").with_content_length(limit + 1).with_client_addr("203.0.113.31");
    let decision = pipeline.evaluate(&over_limit).await;
    assert!(matches!(decision, Decision::Rejected { error_kind: ErrorKind::ContentTooLarge, .. }));
}

#[tokio::test]
async fn header_count_boundary_is_admitted_one_over_is_rejected() {
    let pipeline = pipeline().await;
    let max_headers = pipeline.config().validation.max_headers_count;

    let mut at_limit = Request::new("GET", "/api/widgets").with_client_addr("203.0.113.32");
    for i in 0..max_headers {
        at_limit = at_limit.with_header(format!("x-custom-{i}"), "v");
    }
    assert!(pipeline.evaluate(&at_limit).await.is_admitted());

    let mut over_limit = Request::new("GET", "/api/widgets").with_client_addr("203.0.113.33");
    for i in 0..=max_headers {
        over_limit = over_limit.with_header(format!("x-custom-{i}"), "v");
    }
    let decision = pipeline.evaluate(&over_limit).await;
    assert!(matches!(decision, Decision::Rejected { error_kind: ErrorKind::InvalidHeaders, .. }));
}

#[tokio::test]
async fn concurrent_evaluations_never_panic_and_each_returns_one_decision() {
    let pipeline = std::sync::Arc::new(pipeline().await);
    let mut handles = Vec::new();
    for i in 0..32 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move {
            let request = Request::new("GET", "/api/widgets").with_client_addr(format!("203.0.113.{}", 40 + i % 20));
            pipeline.evaluate(&request).await
        }));
    }
    for handle in handles {
        let decision = handle.await.expect("task must not panic");
        assert!(decision.is_admitted() || decision.is_rejected() || decision.is_rate_limited());
    }
}
