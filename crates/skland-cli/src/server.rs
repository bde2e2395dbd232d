use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use skland_core::{AttendanceConfig, AttendanceError, DedupeStore, execute};
use tokio::net::TcpListener;
use tokio::time::Instant;
use tracing::{error, info};

pub const ATTENDANCE_ENDPOINT: &str = "/attendance";

/// End-to-end budget for one HTTP-triggered run.
pub const RUN_TIMEOUT: Duration = Duration::from_secs(120);

/// Loaded once at startup and shared by every request.
pub struct AppState {
    pub config: AttendanceConfig,
    pub store: Arc<dyn DedupeStore>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            ATTENDANCE_ENDPOINT,
            get(handle_attendance).post(handle_attendance),
        )
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve HTTP listen address")?;
    info!(addr = %local_addr, endpoint = ATTENDANCE_ENDPOINT, "HTTP mode listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server exited unexpectedly")?;
    Ok(())
}

async fn handle_attendance(State(state): State<Arc<AppState>>) -> Response {
    let deadline = Instant::now() + RUN_TIMEOUT;
    match execute(&state.config, state.store.as_ref(), Some(deadline)).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => setup_failure(&err),
    }
}

fn setup_failure(err: &AttendanceError) -> Response {
    error!(error = %err, "Attendance run could not start");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "result": "failed",
            "error": err.to_string(),
        })),
    )
        .into_response()
}
