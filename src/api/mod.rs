//! HTTP command surface
//!
//! - `GET  /`                  liveness
//! - `POST /actions`           `{assetId, statusLight}` ("Light On" / "Light Off")
//! - `POST /actions/light`     `{assetId, state}`
//! - `POST /actions/time-sync` `{assetId, timestamp?}`
//! - `POST /actions/schedule`  `{assetId, slot1: {time, dimLevel}, slot2: {...}}`
//!
//! Each action runs the dispatch pipeline in its own task and answers with
//! the per-device report. The task outlives the request: a caller that
//! disconnects or times out does not cut the batch short.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::error::BridgeError;
use crate::frame::{Action, ClockTimestamp, SlotSpec};
use crate::pipeline::{DispatchReport, Dispatcher};

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
}

/// Original operator contract: free-text light status
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusLightRequest {
    pub asset_id: String,
    pub status_light: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightRequest {
    pub asset_id: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSyncRequest {
    pub asset_id: String,
    /// `"<Weekday> <YYYY-MM-DD> <HH:MM:SS>"`; the bridge's local time if absent
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    pub asset_id: String,
    #[serde(default)]
    pub slot1: Option<SlotSpec>,
    #[serde(default)]
    pub slot2: Option<SlotSpec>,
}

impl StatusLightRequest {
    pub fn action(&self) -> crate::Result<Action> {
        Action::turn_light(&self.status_light)
    }
}

impl LightRequest {
    pub fn action(&self) -> crate::Result<Action> {
        Action::turn_light(&self.state)
    }
}

impl TimeSyncRequest {
    pub fn action(&self) -> crate::Result<Action> {
        match &self.timestamp {
            Some(text) => Action::time_sync(text),
            None => Ok(Action::TimeSync(ClockTimestamp::from_datetime(
                &chrono::Local::now(),
            ))),
        }
    }
}

impl ScheduleRequest {
    pub fn action(&self) -> crate::Result<Action> {
        Action::schedule(self.slot1.as_ref(), self.slot2.as_ref())
    }
}

/// Maps the error taxonomy onto HTTP status codes
#[derive(Debug)]
pub enum ApiError {
    Bridge(BridgeError),
    /// The dispatch task panicked or was aborted
    Task(String),
}

impl From<BridgeError> for ApiError {
    fn from(e: BridgeError) -> Self {
        ApiError::Bridge(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, label, details) = match self {
            ApiError::Bridge(e @ BridgeError::InvalidInput(_)) => {
                (StatusCode::BAD_REQUEST, "Invalid input", e.to_string())
            }
            ApiError::Bridge(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                e.to_string(),
            ),
            ApiError::Task(details) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", details)
            }
        };
        let body = serde_json::json!({
            "error": label,
            "details": details,
        });
        (status, Json(body)).into_response()
    }
}

pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/actions", post(status_light))
        .route("/actions/light", post(turn_light))
        .route("/actions/time-sync", post(time_sync))
        .route("/actions/schedule", post(schedule))
        .with_state(AppState { dispatcher })
}

/// Serve the command surface until `shutdown` resolves
pub async fn start_server<F>(bind: SocketAddr, dispatcher: Arc<Dispatcher>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(bind).await?;
    info!("Command API listening on {}", bind);
    axum::serve(listener, router(dispatcher))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn health() -> &'static str {
    "Server is up and running!"
}

async fn status_light(
    State(state): State<AppState>,
    Json(req): Json<StatusLightRequest>,
) -> Result<Json<DispatchReport>, ApiError> {
    run(&state, &req.asset_id, req.action()).await
}

async fn turn_light(
    State(state): State<AppState>,
    Json(req): Json<LightRequest>,
) -> Result<Json<DispatchReport>, ApiError> {
    run(&state, &req.asset_id, req.action()).await
}

async fn time_sync(
    State(state): State<AppState>,
    Json(req): Json<TimeSyncRequest>,
) -> Result<Json<DispatchReport>, ApiError> {
    run(&state, &req.asset_id, req.action()).await
}

async fn schedule(
    State(state): State<AppState>,
    Json(req): Json<ScheduleRequest>,
) -> Result<Json<DispatchReport>, ApiError> {
    run(&state, &req.asset_id, req.action()).await
}

async fn run(
    state: &AppState,
    asset_id: &str,
    action: crate::Result<Action>,
) -> Result<Json<DispatchReport>, ApiError> {
    if asset_id.trim().is_empty() {
        return Err(BridgeError::invalid("assetId is required").into());
    }
    let action = action.map_err(|e| {
        warn!("Rejected request for asset {}: {}", asset_id, e);
        e
    })?;

    // Detached from the request future: if the client goes away the handle
    // is dropped but the task keeps running
    let dispatcher = state.dispatcher.clone();
    let asset_id = asset_id.trim().to_string();
    let task = tokio::spawn(async move {
        let result = dispatcher.dispatch(&asset_id, &action).await;
        if let Err(e) = &result {
            error!("Dispatch for asset {} failed: {}", asset_id, e);
        }
        result
    });

    let report = task
        .await
        .map_err(|e| ApiError::Task(format!("dispatch task failed: {}", e)))??;
    Ok(Json(report))
}
