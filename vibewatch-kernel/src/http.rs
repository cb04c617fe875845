/**
 * CONTROL PLANE API - HTTP server of the kernel
 *
 * ROLE:
 * Operator-facing surface of the monitor. The dashboard and the monitor
 * itself talk to these routes; every durable change ends up in the shared
 * control file.
 *
 * HOW IT WORKS:
 * - Axum router, JSON in and out
 * - Writes run load-mutate-save on the control store under one in-process lock
 * - The latest status report (with statistics) is kept in memory
 * - Unknown scenario -> 404, unknown status or channel -> 400
 * - Unreadable measurement export -> 503
 *
 * ROUTES:
 * - /health, /system/health, /scenarios
 * - scenario: /set_scenario/{id}, /get_period
 * - status:   /status, /set_status/{status}, /get_status, /get_stats
 * - data:     /get_data (measurement export as JSON rows)
 * - alarm:    /set_alarm_muted, /get_alarm_muted
 * - monitor:  /stop_monitor, /start_monitor
 * - lamps:    /leds, /leds/{channel}
 */

use crate::health::{HealthTracker, KernelHealth};
use crate::state::{ReportBoard, Shared};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use vibewatch_core::{
    ControlState, ControlStore, MonitorMode, Scenario, ScenarioCatalog, Series, SeriesError, Status, StatusReport,
    StoreError, CHANNEL_COUNT,
};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unknown scenario '{0}'")]
    UnknownScenario(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("control file error: {0}")]
    Store(#[from] StoreError),
    #[error("measurement data unavailable: {0}")]
    Data(#[from] SeriesError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match &self {
            ApiError::UnknownScenario(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Data(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (code, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

#[derive(Clone)]
pub struct AppState {
    pub store: ControlStore,
    /// Serialises load-mutate-save sequences of this process.
    pub write_lock: Shared<()>,
    pub catalog: Arc<ScenarioCatalog>,
    pub reports: Shared<ReportBoard>,
    pub health_tracker: HealthTracker,
    pub data_file: PathBuf,
    pub timestamp_column: String,
}

impl AppState {
    fn update<F: FnOnce(&mut ControlState)>(&self, f: F) -> Result<ControlState, ApiError> {
        let _guard = self.write_lock.lock();
        Ok(self.store.update(f)?)
    }
}

#[derive(Debug, Deserialize)]
pub struct AlarmMutedRequest {
    pub alarm_muted: bool,
}

#[derive(Debug, Deserialize)]
pub struct LedRequest {
    pub on: bool,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/scenarios", get(list_scenarios))
        .route("/set_scenario/{id}", post(set_scenario))
        .route("/get_period", get(get_period))
        .route("/set_status/{status}", post(set_status))
        .route("/status", post(post_status))
        .route("/get_status", get(get_status))
        .route("/get_stats", get(get_stats))
        .route("/get_data", get(get_data))
        .route("/set_alarm_muted", post(set_alarm_muted))
        .route("/get_alarm_muted", get(get_alarm_muted))
        .route("/stop_monitor", post(stop_monitor))
        .route("/start_monitor", post(start_monitor))
        .route("/leds", get(get_leds))
        .route("/leds/{channel}", post(set_led))
        .with_state(app_state)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health(&app.catalog, &app.reports, app.store.load()))
}

// GET /scenarios
async fn list_scenarios(State(app): State<AppState>) -> Json<Vec<Scenario>> {
    Json(app.catalog.list().to_vec())
}

// POST /set_scenario/{id}
async fn set_scenario(State(app): State<AppState>, Path(id): Path<String>) -> ApiResult {
    if app.catalog.get(&id).is_none() {
        return Err(ApiError::UnknownScenario(id));
    }
    app.update(|s| s.scenario = id.clone())?;
    info!("scenario {} selected", id);
    Ok(Json(json!({ "status": "ok", "selected": id })))
}

// GET /get_period
async fn get_period(State(app): State<AppState>) -> Json<Value> {
    Json(json!({ "selected": app.store.load().scenario }))
}

// POST /set_status/{status} (plain status, short names accepted)
async fn set_status(State(app): State<AppState>, Path(status): Path<String>) -> ApiResult {
    let status: Status = status.parse().map_err(|e: vibewatch_core::status::UnknownStatus| ApiError::BadRequest(e.to_string()))?;
    app.update(|s| s.status = status)?;
    Ok(Json(json!({ "result": "ok" })))
}

// POST /status (full report from the monitor)
async fn post_status(State(app): State<AppState>, Json(report): Json<StatusReport>) -> ApiResult {
    let status = report.status;
    app.update(|s| s.status = status)?;
    app.reports.lock().record(report);
    Ok(Json(json!({ "result": "ok" })))
}

// GET /get_status
async fn get_status(State(app): State<AppState>) -> Json<Value> {
    Json(json!({ "status": app.store.load().status }))
}

// GET /get_stats
async fn get_stats(State(app): State<AppState>) -> Json<Value> {
    let board = app.reports.lock();
    match &board.last {
        Some(report) => Json(json!({
            "scenario": report.scenario,
            "status": report.status,
            "stats": report.stats,
        })),
        None => Json(json!({ "scenario": null, "status": null, "stats": null })),
    }
}

// GET /get_data (read fresh on every request)
async fn get_data(State(app): State<AppState>) -> Result<Json<Vec<Map<String, Value>>>, ApiError> {
    let series = Series::from_csv_path(&app.data_file, &app.timestamp_column)?;
    Ok(Json(series.records(&app.timestamp_column)))
}

// POST /set_alarm_muted
async fn set_alarm_muted(State(app): State<AppState>, Json(req): Json<AlarmMutedRequest>) -> ApiResult {
    let state = app.update(|s| s.alarm_muted = req.alarm_muted)?;
    info!("alarm lamp {}", if state.alarm_muted { "muted" } else { "unmuted" });
    Ok(Json(json!({ "alarm_muted": state.alarm_muted })))
}

// GET /get_alarm_muted
async fn get_alarm_muted(State(app): State<AppState>) -> Json<Value> {
    Json(json!({ "alarm_muted": app.store.load().alarm_muted }))
}

// POST /stop_monitor
async fn stop_monitor(State(app): State<AppState>) -> ApiResult {
    app.update(|s| s.monitor = MonitorMode::Stopped)?;
    info!("monitor stop requested");
    Ok(Json(json!({ "monitor": MonitorMode::Stopped })))
}

// POST /start_monitor
async fn start_monitor(State(app): State<AppState>) -> ApiResult {
    app.update(|s| s.monitor = MonitorMode::Running)?;
    info!("monitor start requested");
    Ok(Json(json!({ "monitor": MonitorMode::Running })))
}

// GET /leds
async fn get_leds(State(app): State<AppState>) -> Json<BTreeMap<u8, bool>> {
    Json(app.store.load().leds)
}

// POST /leds/{channel} (override applied by the monitor while stopped)
async fn set_led(State(app): State<AppState>, Path(channel): Path<u8>, Json(req): Json<LedRequest>) -> ApiResult {
    if channel as usize >= CHANNEL_COUNT {
        return Err(ApiError::BadRequest(format!("channel {} out of range 0..{}", channel, CHANNEL_COUNT)));
    }
    app.update(|s| {
        s.leds.insert(channel, req.on);
    })?;
    Ok(Json(json!({ "channel": channel, "on": req.on })))
}
