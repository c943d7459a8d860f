//! Parley operator HTTP API
//!
//! Axum-based HTTP server for operators. Each endpoint has a thin axum
//! handler that delegates to an inner function, which tests call directly.
//!
//! Endpoints:
//! - GET  /health         : health check with DB status
//! - GET  /version        : server version info
//! - GET  /users/:user_id : session summary for one user
//! - POST /counters/reset : zero every message counter now

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use parley_core::config::HttpConfig;

use crate::session::SessionManager;

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    /// `None` when running on the in-memory store.
    pub pool: Option<PgPool>,
    pub manager: Arc<SessionManager>,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/users/:user_id", get(user_handler))
        .route("/counters/reset", post(reset_counters_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: HttpState,
    config: HttpConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let app = build_router(Arc::new(state));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Parley HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Response DTOs
// ============================================================================

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub user_id: i64,
    pub message_count: i32,
    pub limit: i32,
    pub exceeded: bool,
    pub transcript_chars: usize,
    pub archived_conversations: usize,
    pub last_activity: String,
}

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

pub async fn health_inner(state: &HttpState) -> (StatusCode, serde_json::Value) {
    let store = state.manager.store().name().to_string();

    let Some(pool) = state.pool.as_ref() else {
        return (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "store": store,
                "postgresql": null,
            }),
        );
    };

    match parley_core::db::health_check(pool).await {
        Ok(pg_ver) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "store": store,
                "postgresql": pg_ver,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "version": env!("CARGO_PKG_VERSION"),
                "store": store,
                "error": e.to_string(),
            }),
        ),
    }
}

pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "parley/1",
    })
}

pub async fn user_inner(state: &HttpState, user_id: i64) -> (StatusCode, serde_json::Value) {
    let store = state.manager.store();

    let session = match store.get(user_id).await {
        Ok(Some(s)) => s,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                serde_json::json!(ErrorResponse::new(format!("No session for user {}", user_id))),
            )
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!(ErrorResponse::new(e.to_string())),
            )
        }
    };

    let archived = match store.log_entries(user_id).await {
        Ok(entries) => entries.len(),
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!(ErrorResponse::new(e.to_string())),
            )
        }
    };

    let limit = state.manager.settings().daily_limit;
    let summary = UserSummary {
        user_id,
        message_count: session.message_count,
        limit,
        exceeded: !parley_core::quota::admit(session.message_count, limit).is_allowed(),
        transcript_chars: session.transcript().char_len(),
        archived_conversations: archived,
        last_activity: session.last_activity.to_rfc3339(),
    };
    (StatusCode::OK, serde_json::json!(summary))
}

pub async fn reset_counters_inner(state: &HttpState) -> (StatusCode, serde_json::Value) {
    match state.manager.reset_all_counters(Utc::now()).await {
        Ok(sessions) => {
            tracing::info!(sessions, "Counters reset via HTTP");
            (
                StatusCode::OK,
                serde_json::json!({ "reset": true, "sessions": sessions }),
            )
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!(ErrorResponse::new(e.to_string())),
        ),
    }
}

// ============================================================================
// Axum handlers
// ============================================================================

async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

async fn version_handler() -> impl IntoResponse {
    Json(version_inner())
}

async fn user_handler(
    State(state): State<Arc<HttpState>>,
    Path(user_id): Path<i64>,
) -> impl IntoResponse {
    let (status, body) = user_inner(&state, user_id).await;
    (status, Json(body))
}

async fn reset_counters_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = reset_counters_inner(&state).await;
    (status, Json(body))
}
