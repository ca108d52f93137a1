//! HTTP adapter tests
//!
//! Drive the router in-process with `tower::ServiceExt::oneshot`; no socket is
//! bound. Time comes from a manual clock shared with the app state.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use gatekeep::auth::{AdminKey, Grant, Identity};
use gatekeep::clock::{Clock, ManualClock};
use gatekeep::config::GatekeepConfig;
use gatekeep::pipeline::AuthPipeline;
use gatekeep::server::{create_router, AppState, ADMIN_KEY_HEADER};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

const ADMIN_KEY: &str = "test-admin-key";

struct Harness {
    app: Router,
    pipeline: Arc<AuthPipeline>,
    clock: Arc<ManualClock>,
}

fn harness() -> Harness {
    let mut config = GatekeepConfig::new("http-test-secret");
    config.admission.precision = 3;
    let pipeline = Arc::new(AuthPipeline::from_config(&config).unwrap());

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let now = Utc::now();
    pipeline.grants().load([Grant::new(
        "editor",
        "/whoami",
        "GET",
        now - Duration::days(1),
        now + Duration::days(1),
    )]);

    let state = AppState::new(pipeline.clone())
        .with_admin_key(AdminKey::new(ADMIN_KEY.to_string()))
        .with_clock(clock.clone());

    Harness {
        app: create_router(state),
        pipeline,
        clock,
    }
}

fn token(h: &Harness, role: &str, budget: f64) -> String {
    let now = h.clock.now();
    let identity = Identity {
        subject_id: "42".to_string(),
        tenant_type: "users".to_string(),
        role: role.to_string(),
        rate_budget: budget,
        valid_from: now,
        valid_until: now + Duration::minutes(30),
    };
    h.pipeline.codec().issue(&identity, now).unwrap().into_string()
}

fn whoami(bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri("/whoami").method("GET");
    if let Some(bearer) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", bearer));
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_is_open() {
    let h = harness();
    let response = h
        .app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_valid_token_reaches_handler() {
    let h = harness();
    let bearer = token(&h, "editor", 10.0);

    let response = h.app.clone().oneshot(whoami(Some(&bearer))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["subjectId"], "42");
    assert_eq!(body["tenantType"], "users");
    assert_eq!(body["role"], "editor");
}

#[tokio::test]
async fn test_missing_or_malformed_bearer() {
    let h = harness();

    let response = h.app.clone().oneshot(whoami(None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["kind"], "missing_bearer");

    let response = h.app.clone().oneshot(whoami(Some("not-a-token"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["kind"], "malformed_token");
}

#[tokio::test]
async fn test_tampered_token_rejected() {
    let h = harness();
    let bearer = token(&h, "editor", 10.0);

    // Swap the signature for one made with a different secret
    let other = GatekeepConfig::new("some-other-secret");
    let forged = AuthPipeline::from_config(&other).unwrap();
    let now = h.clock.now();
    let forged_token = forged
        .codec()
        .issue(
            &Identity {
                subject_id: "42".to_string(),
                tenant_type: "users".to_string(),
                role: "editor".to_string(),
                rate_budget: 10.0,
                valid_from: now,
                valid_until: now + Duration::minutes(30),
            },
            now,
        )
        .unwrap()
        .into_string();
    let signature = forged_token.rsplit('.').next().unwrap();
    let (head, _) = bearer.rsplit_once('.').unwrap();
    let tampered = format!("{}.{}", head, signature);

    let response = h.app.clone().oneshot(whoami(Some(&tampered))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["kind"], "tampered_token");
}

#[tokio::test]
async fn test_expired_token_rejected() {
    let h = harness();
    let bearer = token(&h, "editor", 10.0);

    h.clock.advance(Duration::minutes(30));

    let response = h.app.clone().oneshot(whoami(Some(&bearer))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["kind"], "expired_token");
}

#[tokio::test]
async fn test_role_without_grant_is_forbidden() {
    let h = harness();
    let bearer = token(&h, "viewer", 10.0);

    let response = h.app.clone().oneshot(whoami(Some(&bearer))).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["kind"], "forbidden");
}

#[tokio::test]
async fn test_rate_limited_with_retry_after() {
    let h = harness();
    let bearer = token(&h, "editor", 2.0);

    for _ in 0..2 {
        let response = h.app.clone().oneshot(whoami(Some(&bearer))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        h.clock.advance(Duration::milliseconds(100));
    }

    // Third request inside 200ms: 15 req/s against a budget of 2
    let response = h.app.clone().oneshot(whoami(Some(&bearer))).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let retry_after: i64 = response
        .headers()
        .get(header::RETRY_AFTER)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(retry_after, 450);

    let body = json_body(response).await;
    assert_eq!(body["kind"], "rate_limited");
    let resume_at: DateTime<Utc> = serde_json::from_value(body["resume_at"].clone()).unwrap();
    assert!(resume_at > h.clock.now());
}

#[tokio::test]
async fn test_admin_revoke() {
    let h = harness();
    let bearer = token(&h, "editor", 10.0);

    let revoke = |key: Option<&str>| {
        let mut builder = Request::builder()
            .uri("/admin/revoke")
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(key) = key {
            builder = builder.header(ADMIN_KEY_HEADER, key);
        }
        builder
            .body(Body::from(r#"{"tenant_type":"users","subject_id":"42"}"#))
            .unwrap()
    };

    let response = h.app.clone().oneshot(revoke(Some("wrong-key"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(h.pipeline.revocations().is_empty());

    h.clock.advance(Duration::seconds(1));
    let response = h.app.clone().oneshot(revoke(Some(ADMIN_KEY))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(json_body(response).await["revoked_at"].is_string());

    let response = h.app.clone().oneshot(whoami(Some(&bearer))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["kind"], "revoked_token");

    // A token issued after the marker is accepted
    h.clock.advance(Duration::seconds(1));
    let fresh = token(&h, "editor", 10.0);
    let response = h.app.clone().oneshot(whoami(Some(&fresh))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_grant_reload_without_source() {
    let h = harness();
    let request = Request::builder()
        .uri("/admin/grants/reload")
        .method("POST")
        .header(ADMIN_KEY_HEADER, ADMIN_KEY)
        .body(Body::empty())
        .unwrap();

    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_grant_reload_from_source() {
    let mut config = GatekeepConfig::new("http-test-secret");
    config.admission.precision = 3;
    let pipeline = Arc::new(AuthPipeline::from_config(&config).unwrap());
    let now = Utc::now();
    let source: Vec<Grant> = vec![Grant::new(
        "editor",
        "/whoami",
        "GET",
        now - Duration::days(1),
        now + Duration::days(1),
    )];

    let state = AppState::new(pipeline.clone())
        .with_admin_key(AdminKey::new(ADMIN_KEY.to_string()))
        .with_grant_source(Arc::new(source));
    let app = create_router(state);
    assert!(pipeline.grants().is_empty());

    let request = Request::builder()
        .uri("/admin/grants/reload")
        .method("POST")
        .header(ADMIN_KEY_HEADER, ADMIN_KEY)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["grants"], 1);
    assert!(pipeline.grants().valid("editor", "/whoami", "GET", now));
}
