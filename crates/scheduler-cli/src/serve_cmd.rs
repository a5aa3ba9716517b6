//! The `scheduler serve` admin HTTP surface.
//!
//! A headless JSON API over the same operations an operator would otherwise
//! reach for with individual CLI subcommands: create/toggle/delete
//! schedules, enqueue/cancel/delete tasks, and run a handler manually
//! outside the normal poll loop. Every mutating endpoint replies with a
//! uniform envelope (`ok`, `type`, `payload`, `cost_ms`, `error`, `info`)
//! instead of the form-post redirects an interactive UI would use, since
//! this binary has no browser-facing surface.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use scheduler_core::engine::Engine;
use scheduler_core::handler::{ExecutionContext, HandlerRegistry};
use scheduler_db::models::{Schedule, Task, TaskStatus};
use scheduler_db::queries::{schedules, tasks};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AdminError {
    status: StatusCode,
    message: String,
}

impl AdminError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.into(),
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{err:#}"),
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> axum::response::Response {
        let body = Envelope::<()>::error(&self.message);
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub ok: bool,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_ms: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl<T: Serialize> Envelope<T> {
    fn ok(kind: &'static str, payload: T, cost_ms: u128, info: Option<String>) -> Self {
        Self {
            ok: true,
            kind,
            payload: Some(payload),
            cost_ms: Some(cost_ms),
            error: None,
            info,
        }
    }

    fn error(message: &str) -> Self
    where
        T: Default,
    {
        Self {
            ok: false,
            kind: "error",
            payload: None,
            cost_ms: None,
            error: Some(message.to_owned()),
            info: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub handlers: Arc<HandlerRegistry>,
    pub engine: Arc<Engine>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/schedules", get(list_schedules).post(create_schedule))
        .route("/schedules/{id}", delete(delete_schedule))
        .route("/schedules/{id}/toggle", post(toggle_schedule))
        .route("/tasks", get(list_tasks))
        .route("/tasks/enqueue", post(enqueue_task))
        .route("/tasks/{id}", get(get_task).delete(delete_task))
        .route("/tasks/{id}/cancel", post(cancel_task))
        .route("/manual/run", post(manual_run))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_serve(state: AppState, bind: &str, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!(%addr, "admin surface listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("admin surface shut down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    pub name: String,
    pub type_code: String,
    pub cron_expr: String,
    pub payload: String,
}

#[derive(Debug, Deserialize)]
pub struct ToggleScheduleRequest {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct EnqueueTaskRequest {
    pub type_code: String,
    pub payload: String,
    #[serde(default)]
    pub ticket: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub max_attempts: Option<i32>,
    #[serde(default)]
    pub not_before: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ManualRunRequest {
    pub type_code: String,
    pub payload: String,
}

#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    pub status: Option<String>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validate_payload(payload: &str) -> Result<(), AdminError> {
    serde_json::from_str::<Value>(payload)
        .map(|_| ())
        .map_err(|e| AdminError::bad_request(format!("payload is not valid JSON: {e}")))
}

fn validate_type_code(handlers: &HandlerRegistry, type_code: &str) -> Result<(), AdminError> {
    if handlers.get(type_code).is_some() {
        Ok(())
    } else {
        Err(AdminError::bad_request(format!(
            "unknown type code: {type_code}"
        )))
    }
}

/// Parses `YYYY-MM-DD HH:MM[:SS]` or the ISO-like `YYYY-MM-DDTHH:MM[:SS]`,
/// both assumed UTC. A string without seconds is accepted (`:00` is
/// appended); a longer string (e.g. with fractional seconds or a timezone
/// suffix) is truncated to the first 19 characters before parsing.
fn parse_not_before(s: &str) -> Result<DateTime<Utc>, AdminError> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ];

    let mut normalized = s.to_owned();
    if normalized.len() > 19 {
        normalized.truncate(19);
    }
    if normalized.len() == 16 {
        normalized.push_str(":00");
    }

    for fmt in FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    Err(AdminError::bad_request(format!(
        "invalid not_before: expected 'YYYY-MM-DD HH:MM[:SS]' or 'YYYY-MM-DDTHH:MM', got {s:?}"
    )))
}

#[cfg(test)]
mod not_before_tests {
    use super::*;

    #[test]
    fn accepts_missing_seconds() {
        let parsed = parse_not_before("2026-01-02T03:04").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-01-02T03:04:00+00:00");
    }

    #[test]
    fn truncates_longer_strings_to_19_chars() {
        let parsed = parse_not_before("2026-01-02T03:04:05.999Z").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-01-02T03:04:05+00:00");
    }

    #[test]
    fn rejects_unparseable_input() {
        assert!(parse_not_before("not a date").is_err());
    }
}

// ---------------------------------------------------------------------------
// Handlers: schedules
// ---------------------------------------------------------------------------

async fn list_schedules(
    State(state): State<AppState>,
) -> Result<Json<Vec<Schedule>>, AdminError> {
    let rows = schedules::list_schedules(&state.pool)
        .await
        .map_err(AdminError::internal)?;
    Ok(Json(rows))
}

async fn create_schedule(
    State(state): State<AppState>,
    Json(req): Json<CreateScheduleRequest>,
) -> Result<Json<Envelope<Schedule>>, AdminError> {
    let start = Instant::now();
    validate_type_code(&state.handlers, &req.type_code)?;
    validate_payload(&req.payload)?;

    let schedule = schedules::insert_schedule(
        &state.pool,
        &req.name,
        &req.type_code,
        &req.cron_expr,
        &req.payload,
    )
    .await
    .map_err(AdminError::internal)?;

    Ok(Json(Envelope::ok(
        "schedule_created",
        schedule,
        start.elapsed().as_millis(),
        None,
    )))
}

async fn toggle_schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ToggleScheduleRequest>,
) -> Result<Json<Envelope<()>>, AdminError> {
    let start = Instant::now();
    let rows = schedules::set_schedule_enabled(&state.pool, id, req.enabled)
        .await
        .map_err(AdminError::internal)?;

    if rows == 0 {
        return Err(AdminError::not_found(format!("schedule {id} not found")));
    }

    Ok(Json(Envelope::ok(
        "schedule_toggled",
        (),
        start.elapsed().as_millis(),
        Some(format!("enabled={}", req.enabled)),
    )))
}

async fn delete_schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<()>>, AdminError> {
    let start = Instant::now();
    let referencing = tasks::count_tasks_for_schedule(&state.pool, id)
        .await
        .map_err(AdminError::internal)?;
    if referencing > 0 {
        return Err(AdminError::conflict(format!(
            "schedule {id} has {referencing} task(s) referencing it"
        )));
    }

    let rows = schedules::delete_schedule(&state.pool, id)
        .await
        .map_err(AdminError::internal)?;
    if rows == 0 {
        return Err(AdminError::not_found(format!("schedule {id} not found")));
    }

    Ok(Json(Envelope::ok(
        "schedule_deleted",
        (),
        start.elapsed().as_millis(),
        None,
    )))
}

// ---------------------------------------------------------------------------
// Handlers: tasks
// ---------------------------------------------------------------------------

async fn list_tasks(
    State(state): State<AppState>,
    Query(q): Query<TaskListQuery>,
) -> Result<Json<Vec<Task>>, AdminError> {
    let rows = match q.status {
        Some(s) => {
            let status: TaskStatus = s
                .parse()
                .map_err(|_| AdminError::bad_request(format!("invalid status: {s}")))?;
            tasks::list_tasks_by_status(&state.pool, status)
                .await
                .map_err(AdminError::internal)?
        }
        None => tasks::list_recent_tasks(&state.pool, 200)
            .await
            .map_err(AdminError::internal)?,
    };
    Ok(Json(rows))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, AdminError> {
    let task = tasks::get_task(&state.pool, id)
        .await
        .map_err(AdminError::internal)?
        .ok_or_else(|| AdminError::not_found(format!("task {id} not found")))?;
    Ok(Json(task))
}

async fn enqueue_task(
    State(state): State<AppState>,
    Json(req): Json<EnqueueTaskRequest>,
) -> Result<Json<Envelope<Task>>, AdminError> {
    let start = Instant::now();
    validate_type_code(&state.handlers, &req.type_code)?;
    validate_payload(&req.payload)?;

    let not_before = req
        .not_before
        .as_deref()
        .map(parse_not_before)
        .transpose()?;

    let ticket = req.ticket.unwrap_or_else(|| Uuid::new_v4().to_string());

    let task = tasks::insert_task(
        &state.pool,
        &ticket,
        &req.type_code,
        &req.payload,
        req.priority.unwrap_or(0),
        req.max_attempts.unwrap_or(3),
        not_before,
    )
    .await
    .map_err(AdminError::internal)?;

    Ok(Json(Envelope::ok(
        "task_enqueued",
        task,
        start.elapsed().as_millis(),
        None,
    )))
}

async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<()>>, AdminError> {
    let start = Instant::now();

    let pending_rows = tasks::cancel_pending_task(&state.pool, id)
        .await
        .map_err(AdminError::internal)?;
    if pending_rows > 0 {
        return Ok(Json(Envelope::ok(
            "task_canceled",
            (),
            start.elapsed().as_millis(),
            Some("pending task canceled immediately".to_owned()),
        )));
    }

    let running_rows = tasks::request_cancel_running_task(&state.pool, id)
        .await
        .map_err(AdminError::internal)?;
    if running_rows > 0 {
        state.engine.interrupt_if_running(id).await;
        return Ok(Json(Envelope::ok(
            "task_cancel_requested",
            (),
            start.elapsed().as_millis(),
            Some("running task signaled for cooperative cancellation".to_owned()),
        )));
    }

    Err(AdminError::conflict(format!(
        "task {id} is not pending or running"
    )))
}

async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<()>>, AdminError> {
    let start = Instant::now();
    let rows = tasks::delete_task(&state.pool, id)
        .await
        .map_err(AdminError::internal)?;
    if rows == 0 {
        return Err(AdminError::conflict(format!(
            "task {id} not found or not in a terminal state"
        )));
    }

    Ok(Json(Envelope::ok(
        "task_deleted",
        (),
        start.elapsed().as_millis(),
        None,
    )))
}

async fn manual_run(
    State(state): State<AppState>,
    Json(req): Json<ManualRunRequest>,
) -> Result<Json<Envelope<()>>, AdminError> {
    let start = Instant::now();
    validate_payload(&req.payload)?;

    let handler = state
        .handlers
        .get(&req.type_code)
        .ok_or_else(|| AdminError::bad_request(format!("unknown type code: {}", req.type_code)))?;

    let ctx = ExecutionContext::for_test();
    handler
        .execute(&req.payload, &ctx)
        .await
        .map_err(AdminError::internal)?;

    Ok(Json(Envelope::ok(
        "manual_run",
        (),
        start.elapsed().as_millis(),
        Some(format!("{} executed synchronously", req.type_code)),
    )))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
