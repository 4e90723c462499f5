//! HTTP surface over `RunService`.
//!
//! Provides endpoints for:
//! - Projects (`/projects`)
//! - Runs, events and control actions (`/runs/...`)
//! - Live event tail as Server-Sent Events (`/runs/:id/stream`)
//! - Provider and workflow listings (`/providers`, `/workflows`)
//! - Worker status and manual batch trigger (`/worker/...`)
//! - Health check (`/health`)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::core::{RunScheduler, RunService, ServiceError, TailOptions};

mod handlers;

/// Shared state for all handlers
pub struct HttpState {
    pub service: RunService,
    pub scheduler: Arc<RunScheduler>,
    pub tail: TailOptions,

    /// Whether a background loop runs alongside the server
    pub worker_running: bool,
    pub batch_size: usize,
    pub poll_interval: Duration,

    /// Browser origins allowed by CORS; empty allows any
    pub cors_origins: Vec<String>,
}

/// Create the HTTP router.
pub fn create_router(state: Arc<HttpState>) -> Router {
    let cors = cors_layer(&state.cors_origins);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/projects",
            post(handlers::create_project).get(handlers::list_projects),
        )
        .route("/runs", post(handlers::create_run).get(handlers::list_runs))
        .route("/runs/:id", get(handlers::get_run))
        .route("/runs/:id/events", get(handlers::list_events))
        .route("/runs/:id/stream", get(handlers::stream_events))
        .route("/runs/:id/directive", post(handlers::create_directive))
        .route("/runs/:id/:action", post(handlers::control_run))
        .route("/providers", get(handlers::list_providers))
        .route("/workflows", get(handlers::list_workflows))
        .route("/worker/status", get(handlers::worker_status))
        .route("/worker/process", post(handlers::trigger_processing))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow = if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        AllowOrigin::from(Any)
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(allow)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Bind `addr` and serve until `shutdown` resolves
pub async fn serve(
    addr: &str,
    state: Arc<HttpState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")
}

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::InvalidRequest(_) | ServiceError::ProviderRejected(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Internal(_) => {
                error!(error = %self, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (
            status,
            Json(ErrorResponse {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}
