//! HTTP surface: `POST /api/generate` and `GET /health`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use studio_contracts::api::{response_for, ErrorBody, GenerateRequestBody};
use studio_contracts::generation::{GenerationError, UPSTREAM_FALLBACK_MESSAGE};
use studio_engine::GenerationEngine;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<GenerationEngine>,
}

/// Request body cap. Edit requests carry earlier images inline as base64, so
/// this sits well above axum's 2 MiB default.
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

pub fn create_router(engine: Arc<GenerationEngine>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/api/generate", post(generate))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(AppState { engine })
}

pub async fn serve(
    addr: SocketAddr,
    engine: Arc<GenerationEngine>,
    max_body_bytes: usize,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let bound = listener.local_addr().unwrap_or(addr);
    info!(addr = %bound, backend = engine.backend_name(), max_body_bytes, "listening");
    axum::serve(listener, create_router(engine, max_body_bytes))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "ctrl-c handler failed; serving until killed");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

async fn generate(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(status = %rejection.status(), error = %rejection, "request body rejected");
            return error_response(rejection.status(), rejection.body_text());
        }
    };
    // Parsed by hand so malformed JSON reports like any other failure.
    let parsed: GenerateRequestBody = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(error = %err, "unreadable request body");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
        }
    };
    let request = match parsed.into_request() {
        Ok(request) => request,
        Err(err) => return generation_error_response(&err),
    };

    let engine = Arc::clone(&state.engine);
    let result = match tokio::task::spawn_blocking(move || engine.submit(&request)).await {
        Ok(result) => result,
        Err(err) => {
            error!(error = %err, "generation task aborted");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                UPSTREAM_FALLBACK_MESSAGE.to_string(),
            );
        }
    };

    match response_for(result) {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(err) => generation_error_response(&err),
    }
}

fn generation_error_response(err: &GenerationError) -> Response {
    let status = if err.is_client_fault() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(ErrorBody::from(err))).into_response()
}

fn error_response(status: StatusCode, message: String) -> Response {
    let message = if message.trim().is_empty() {
        UPSTREAM_FALLBACK_MESSAGE.to_string()
    } else {
        message
    };
    (status, Json(ErrorBody { error: message })).into_response()
}
