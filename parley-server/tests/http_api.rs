//! HTTP API tests for the operator endpoints
//!
//! Run against the in-memory store, so no database is needed. Uses both the
//! inner functions and the Axum `oneshot` approach for full handler dispatch.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use parley_core::{
    CompletionClient, CompletionError, CompletionRequest, MemoryUserStore, UserSession, UserStore,
};
use parley_server::http::{build_router, health_inner, reset_counters_inner, user_inner, HttpState};
use parley_server::session::{SessionManager, SessionSettings};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct NeverCalled;

#[async_trait]
impl CompletionClient for NeverCalled {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String, CompletionError> {
        Err(CompletionError::MissingChoice)
    }

    fn model(&self) -> &str {
        "none"
    }
}

async fn make_state() -> (Arc<MemoryUserStore>, HttpState) {
    let store = Arc::new(MemoryUserStore::new());
    store
        .put(&UserSession {
            user_id: 7,
            transcript: "User: héllo\nBot: hi".to_string(),
            message_count: 100,
            last_activity: Utc::now(),
        })
        .await
        .unwrap();

    let manager = Arc::new(SessionManager::new(
        store.clone(),
        Arc::new(NeverCalled),
        SessionSettings {
            daily_limit: 100,
            max_tokens: 150,
            temperature: 0.7,
            completion_timeout: Duration::from_secs(5),
            display_ceiling: 3800,
        },
    ));
    (store, HttpState { pool: None, manager })
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_without_database() {
    let (_store, state) = make_state().await;
    let (status, body) = health_inner(&state).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "memory");
    assert!(body["postgresql"].is_null());
}

#[tokio::test]
async fn test_version_endpoint() {
    let (_store, state) = make_state().await;
    let app = build_router(Arc::new(state));

    let req = Request::builder()
        .method("GET")
        .uri("/version")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    assert!(json["version"].is_string());
    assert_eq!(json["protocol"], "parley/1");
}

#[tokio::test]
async fn test_user_summary() {
    let (_store, state) = make_state().await;
    let (status, body) = user_inner(&state, 7).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], 7);
    assert_eq!(body["message_count"], 100);
    assert_eq!(body["limit"], 100);
    assert_eq!(body["exceeded"], true);
    assert_eq!(body["transcript_chars"], 19);
    assert_eq!(body["archived_conversations"], 0);
}

#[tokio::test]
async fn test_unknown_user_is_404_via_router() {
    let (_store, state) = make_state().await;
    let app = build_router(Arc::new(state));

    let req = Request::builder()
        .method("GET")
        .uri("/users/999")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let json = body_json(resp).await;
    assert_eq!(json["status"], "error");
}

#[tokio::test]
async fn test_reset_counters_via_router() {
    let (store, state) = make_state().await;
    let app = build_router(Arc::new(state));

    let req = Request::builder()
        .method("POST")
        .uri("/counters/reset")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    assert_eq!(json["reset"], true);
    assert_eq!(json["sessions"], 1);

    let session = store.get(7).await.unwrap().unwrap();
    assert_eq!(session.message_count, 0);
    assert_eq!(session.transcript, "User: héllo\nBot: hi");
}

#[tokio::test]
async fn test_reset_counters_reports_store_failure() {
    let (store, state) = make_state().await;
    store.set_unavailable(true);

    let (status, body) = reset_counters_inner(&state).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
}
