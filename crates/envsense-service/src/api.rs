//! REST API endpoints for the envsense-service.
//!
//! # Sensors
//!
//! Every sensor request refreshes the device(s) before answering. The store
//! serializes refreshes, so concurrent requests queue up behind each other.
//! A request whose deadline elapses gets 504 while its refresh completes in
//! the background.
//!
//! # Error Handling
//!
//! All endpoints return structured JSON errors via [`AppError`]:
//!
//! | Condition | Status |
//! |-----------|--------|
//! | Malformed id or body | 400 (or the extractor's own 4xx) |
//! | Unknown sensor or task | 404 |
//! | Device or database failure | 500 |
//! | Sensor deadline elapsed | 504 |

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;
use time::OffsetDateTime;

use envsense_core::{SensorId, SensorSnapshot};
use envsense_store::{NewTask, Task};

use crate::state::AppState;

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health))
        // Sensors
        .route("/api/v1/sensor", get(list_sensors))
        .route("/api/v1/sensor/{id}", get(get_sensor))
        // Tasks
        .route(
            "/api/v1/task",
            get(list_tasks).post(create_task).delete(delete_all_tasks),
        )
        .route(
            "/api/v1/task/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Number of sensors bound at startup.
    pub sensors: usize,
}

/// Health check endpoint. Never touches the bus.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
        sensors: state.sensor_ids().len(),
    })
}

/// Refresh and list every sensor. Any device failure fails the whole listing.
async fn list_sensors(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SensorSnapshot>>, AppError> {
    let snapshots = state
        .with_sensors("list sensors", |sensors| sensors.get_all())
        .await?;
    Ok(Json(snapshots))
}

async fn get_sensor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SensorSnapshot>, AppError> {
    let id: SensorId = id
        .parse()
        .map_err(|e: envsense_types::ParseError| AppError::BadRequest(e.to_string()))?;

    let snapshot = state
        .with_sensors("get sensor", move |sensors| sensors.get(id))
        .await?;
    Ok(Json(snapshot))
}

/// Response for a created task.
#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub id: i64,
}

/// Response for a bulk delete.
#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: usize,
}

fn parse_task_id(raw: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::BadRequest(format!("invalid task id '{}'", raw)))
}

fn task_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("task with id={} not found", id))
}

async fn list_tasks(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Task>>, AppError> {
    let store = state.tasks.lock().await;
    Ok(Json(store.list_tasks()?))
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewTask>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(new_task) = payload?;
    let mut store = state.tasks.lock().await;
    let task = store.create_task(&new_task)?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id: task.id })))
}

async fn delete_all_tasks(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DeletedResponse>, AppError> {
    let mut store = state.tasks.lock().await;
    let deleted = store.delete_all_tasks()?;
    Ok(Json(DeletedResponse { deleted }))
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Task>, AppError> {
    let id = parse_task_id(&id)?;
    let store = state.tasks.lock().await;
    store
        .get_task(id)?
        .map(Json)
        .ok_or_else(|| task_not_found(id))
}

async fn update_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<NewTask>, JsonRejection>,
) -> Result<Json<Task>, AppError> {
    let id = parse_task_id(&id)?;
    let Json(new_task) = payload?;
    let mut store = state.tasks.lock().await;
    store
        .update_task(id, &new_task)?
        .map(Json)
        .ok_or_else(|| task_not_found(id))
}

async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_task_id(&id)?;
    let mut store = state.tasks.lock().await;
    if store.delete_task(id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(task_not_found(id))
    }
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    /// A rejected request body, with the extractor's own status.
    Body(StatusCode, String),
    Sensor(envsense_core::Error),
    Store(envsense_store::Error),
    Timeout(String),
    Internal(String),
}

impl From<envsense_core::Error> for AppError {
    fn from(e: envsense_core::Error) -> Self {
        AppError::Sensor(e)
    }
}

impl From<envsense_store::Error> for AppError {
    fn from(e: envsense_store::Error) -> Self {
        AppError::Store(e)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Body(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Body(status, msg) => (status, msg),
            AppError::Sensor(e) if e.is_not_found() => (StatusCode::NOT_FOUND, e.to_string()),
            AppError::Sensor(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            AppError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            AppError::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}
