// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! REST surface, driven through the router without a socket.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;
use visible_auth::TokenAuthority;
use visible_core::Role;
use visible_gateway::{GatewayState, HealthState, build_router};
use visible_session::RatingRequest;
use visible_test_utils::{PROVIDER_ID, SEEKER_ID, TestHarness};

const SECRET: &str = "gateway-test-secret-0123456789";

struct App {
    harness: TestHarness,
    auth: Arc<TokenAuthority>,
}

impl App {
    async fn new() -> Self {
        let harness = TestHarness::builder().build().await.unwrap();
        let auth = Arc::new(TokenAuthority::new(SECRET, 3600, harness.clock.clone()).unwrap());
        Self { harness, auth }
    }

    fn router(&self, metrics: bool) -> axum::Router {
        let prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>> = if metrics {
            Some(Arc::new(|| "visible_active_sessions 0\n".to_string()))
        } else {
            None
        };
        build_router(GatewayState {
            engine: self.harness.engine.clone(),
            identity: self.auth.clone(),
            health: HealthState {
                start_time: std::time::Instant::now(),
                prometheus_render,
            },
        })
    }

    fn token(&self, user_id: i64, role: Role) -> String {
        self.auth.mint(user_id, role).unwrap()
    }
}

async fn json_body(resp: axum::http::Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn post_assignment(token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/v1/assignments")
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_session(token: &str, id: &str) -> Request<Body> {
    Request::builder()
        .uri(format!("/v1/sessions/{id}"))
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let app = App::new().await;
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let resp = app.router(false).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = json_body(resp).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["live_sessions"], 0);
}

#[tokio::test]
async fn metrics_follow_exporter_setting() {
    let app = App::new().await;
    let req = || Request::builder().uri("/metrics").body(Body::empty()).unwrap();

    let resp = app.router(false).oneshot(req()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app.router(true).oneshot(req()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = axum::body::to_bytes(resp.into_body(), 4096).await.unwrap();
    assert!(String::from_utf8_lossy(&body).contains("visible_active_sessions"));
}

#[tokio::test]
async fn assignment_requires_a_token() {
    let app = App::new().await;
    let body = serde_json::json!({"provider_id": PROVIDER_ID, "service_type": "plumbing"});

    let resp = app
        .router(false)
        .oneshot(post_assignment(None, body.clone()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .router(false)
        .oneshot(post_assignment(Some("10.seeker.1.deadbeef"), body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn seeker_dispatches_work() {
    let app = App::new().await;
    let token = app.token(SEEKER_ID, Role::Seeker);
    let body = serde_json::json!({
        "provider_id": PROVIDER_ID,
        "service_type": "plumbing",
        "message": "leaking tap",
        "latitude": 12.9716,
        "longitude": 77.5946,
    });

    let resp = app
        .router(false)
        .oneshot(post_assignment(Some(&token), body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let json = json_body(resp).await;
    assert_eq!(json["status"], "pending");
    assert_eq!(json["provider_id"], PROVIDER_ID);
    assert_eq!(json["seeker_location"]["latitude"], 12.9716);
    app.harness.engine.flush().await;
    assert_eq!(app.harness.push.deliveries_of(PROVIDER_ID, "work_assigned").len(), 1);
}

#[tokio::test]
async fn provider_cannot_dispatch() {
    let app = App::new().await;
    let token = app.token(PROVIDER_ID, Role::Provider);
    let body = serde_json::json!({"provider_id": PROVIDER_ID, "service_type": "plumbing"});

    let resp = app
        .router(false)
        .oneshot(post_assignment(Some(&token), body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(resp).await["code"], "permission_denied");
}

#[tokio::test]
async fn session_snapshot_is_party_scoped() {
    let app = App::new().await;
    let session = app.harness.accepted_session().await.unwrap();
    let id = session.id.to_string();

    let resp = app
        .router(false)
        .oneshot(get_session(&app.token(SEEKER_ID, Role::Seeker), &id))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["state"], "waiting");

    let resp = app
        .router(false)
        .oneshot(get_session(&app.token(99, Role::Seeker), &id))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app
        .router(false)
        .oneshot(get_session(&app.token(SEEKER_ID, Role::Seeker), "no-such-session"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(resp).await["code"], "session_not_found");

    app.harness.engine.shutdown().await;
}

#[tokio::test]
async fn provider_snapshot_omits_rating() {
    let app = App::new().await;
    let session = app.harness.accepted_session().await.unwrap();
    app.harness
        .engine
        .finish(
            &app.harness.seeker(),
            &session.id,
            &RatingRequest {
                stars: Some(5),
                description: Some("Great".into()),
            },
        )
        .await
        .unwrap();
    let id = session.id.to_string();

    let resp = app
        .router(false)
        .oneshot(get_session(&app.token(SEEKER_ID, Role::Seeker), &id))
        .await
        .unwrap();
    let seeker_view = json_body(resp).await;
    assert_eq!(seeker_view["state"], "completed");
    assert_eq!(seeker_view["rating"]["stars"], 5);

    let resp = app
        .router(false)
        .oneshot(get_session(&app.token(PROVIDER_ID, Role::Provider), &id))
        .await
        .unwrap();
    let provider_view = json_body(resp).await;
    assert_eq!(provider_view["state"], "completed");
    assert!(provider_view["rating"].is_null());
}
