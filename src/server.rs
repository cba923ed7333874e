//! HTTP API for agents and the dashboard UI.
//!
//! `POST /api/report` ingests agent pushes, `POST /api/servers` registers
//! hosts for pull collection and `GET /api/status` serves the merged view.

use std::net::SocketAddr;
use std::sync::Arc;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::collector::HostReport;
use crate::config::HostConfig;
use crate::dashboard::{Dashboard, DashboardError};

pub type AppState = Arc<Dashboard>;

/// An error returned to the HTTP client as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Dashboard(#[from] DashboardError),

    /// Body missing, not JSON, or sent without a JSON content type.
    #[error(transparent)]
    Body(#[from] JsonRejection),

    #[error("request handler failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Dashboard(DashboardError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Dashboard(DashboardError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Body(rejection) => rejection.status(),
            ApiError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/report", post(push_report))
        .route("/api/servers", get(list_servers).post(add_server))
        .route("/api/status", get(status))
        .route("/api/collect", post(collect))
        .with_state(state)
}

/// Serves the API until the listener fails.
pub async fn run(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("dashboard API listening on {}", addr);
    axum::serve(listener, router(state)).await
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

/// Store writes are blocking file I/O.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, DashboardError> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

/// POST /api/report
async fn push_report(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = payload?;
    blocking(move || state.ingest_report(payload)).await?;
    Ok(Json(json!({ "ok": true })))
}

/// GET /api/servers
async fn list_servers(State(state): State<AppState>) -> Json<Vec<HostConfig>> {
    Json(state.hosts())
}

/// POST /api/servers
async fn add_server(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = payload?;
    blocking(move || state.register_host(payload)).await?;
    Ok(Json(json!({ "ok": true })))
}

/// GET /api/status
async fn status(State(state): State<AppState>) -> Json<Vec<HostReport>> {
    Json(state.status().await)
}

/// POST /api/collect
async fn collect(State(state): State<AppState>) -> Json<Value> {
    let reports = state.collect().await;
    let failed = reports.iter().filter(|r| r.is_error()).count();
    Json(json!({
        "ok": true,
        "collected": reports.len(),
        "failed": failed,
    }))
}
