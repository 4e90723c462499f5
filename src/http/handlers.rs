//! Request handlers.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::HttpState;
use crate::core::{CreateProject, CreateRun, RunFilter, ServiceError, TailItem};
use crate::domain::RunStatus;

/// Health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn create_project(
    State(state): State<Arc<HttpState>>,
    Json(request): Json<CreateProject>,
) -> Result<impl IntoResponse, ServiceError> {
    let project = state.service.create_project(request)?;
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn list_projects(
    State(state): State<Arc<HttpState>>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(state.service.list_projects()?))
}

pub async fn create_run(
    State(state): State<Arc<HttpState>>,
    Json(request): Json<CreateRun>,
) -> Result<impl IntoResponse, ServiceError> {
    let run = state.service.create_run(request).await?;
    Ok((StatusCode::CREATED, Json(run)))
}

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    pub status: Option<String>,
    pub project_id: Option<i64>,
    pub limit: Option<usize>,
}

pub async fn list_runs(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<ListRunsQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<RunStatus>)
        .transpose()
        .map_err(ServiceError::InvalidRequest)?;

    let runs = state.service.list_runs(&RunFilter {
        status,
        project_id: query.project_id,
        limit: query.limit,
    })?;
    Ok(Json(runs))
}

pub async fn get_run(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(state.service.get_run(&id)?))
}

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub after_id: Option<i64>,
}

pub async fn list_events(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<EventsQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(state.service.list_events(&id, query.after_id)?))
}

/// Live tail as Server-Sent Events.
///
/// Resumes after the `Last-Event-ID` header when a client reconnects,
/// else after the `after_id` query parameter.
pub async fn stream_events(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<EventsQuery>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ServiceError> {
    let last_event_id = headers
        .get("last-event-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<i64>().ok());
    let from_id = last_event_id.or(query.after_id).unwrap_or(0);

    let tail = state.service.tail(&id, from_id, state.tail)?;
    info!(run_id = %id, from_id, "SSE client connected");

    let stream = tail.map(move |item| {
        let event = match item {
            Ok(TailItem::Event(event)) => SseEvent::default()
                .id(event.id.to_string())
                .event(event.event_type.clone())
                .json_data(&event)
                .unwrap_or_else(|e| SseEvent::default().event("error").data(e.to_string())),
            Ok(TailItem::KeepAlive) => SseEvent::default().comment("keepalive"),
            Err(e) => {
                warn!(run_id = %id, error = %e, "Event tail failed");
                SseEvent::default().event("error").data(e.to_string())
            }
        };
        Ok(event)
    });

    // Transport-level pings cover the gaps between tail keepalives
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(state.tail.keepalive_interval)))
}

#[derive(Debug, Deserialize)]
pub struct DirectiveRequest {
    pub text: String,
}

pub async fn create_directive(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<DirectiveRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let event = state.service.directive(&id, &request.text)?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn control_run(
    State(state): State<Arc<HttpState>>,
    Path((id, action)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, ServiceError> {
    let run = match action.to_ascii_lowercase().as_str() {
        "pause" => state.service.pause(&id)?,
        "resume" => state.service.resume(&id)?,
        "stop" => state.service.stop(&id)?,
        other => {
            return Err(ServiceError::InvalidRequest(format!(
                "Invalid action: {other} (expected pause, resume or stop)"
            )))
        }
    };
    Ok(Json(run))
}

pub async fn list_providers(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(state.service.providers().await)
}

pub async fn list_workflows(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(state.service.workflows())
}

pub async fn worker_status(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "running": state.worker_running,
        "check_interval": state.poll_interval.as_secs(),
        "batch_size": state.batch_size,
    }))
}

/// Process one batch in the background and return immediately
pub async fn trigger_processing(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let scheduler = Arc::clone(&state.scheduler);
    let batch_size = state.batch_size;
    tokio::spawn(async move {
        let completed = scheduler.process_queued_runs(batch_size).await;
        info!(completed, "Manual batch processed");
    });

    Json(serde_json::json!({ "message": "Processing triggered" }))
}
