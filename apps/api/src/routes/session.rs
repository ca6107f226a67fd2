//! Session control and full-state pull
//!
//! - `GET /api/state` - Snapshot for resynchronizing listeners
//! - `POST /api/session/start` - `{trackId?}`; no track means idle
//! - `POST /api/session/{pause,resume,stop,skip}`
//! - `POST /api/session/seek` - `{positionSeconds}`
//!
//! Every mutation answers with the resulting `STATE_UPDATE` payload, the
//! same one broadcast to listeners.

use axum::{extract::State, routing::get, routing::post, Json, Router};
use erwin_protocol::{SessionSnapshot, StateUpdate};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;

pub fn session_router() -> Router<AppState> {
    Router::new()
        .route("/state", get(get_state))
        .route("/session/start", post(start))
        .route("/session/pause", post(pause))
        .route("/session/resume", post(resume))
        .route("/session/stop", post(stop))
        .route("/session/skip", post(skip))
        .route("/session/seek", post(seek))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    #[serde(default)]
    pub track_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeekRequest {
    pub position_seconds: f64,
}

async fn get_state(State(state): State<AppState>) -> ApiResult<Json<SessionSnapshot>> {
    Ok(Json(state.playback.snapshot().await?))
}

async fn start(
    State(state): State<AppState>,
    Json(request): Json<StartRequest>,
) -> ApiResult<Json<StateUpdate>> {
    Ok(Json(state.playback.start(request.track_id).await?))
}

async fn pause(State(state): State<AppState>) -> ApiResult<Json<StateUpdate>> {
    Ok(Json(state.playback.pause().await?))
}

async fn resume(State(state): State<AppState>) -> ApiResult<Json<StateUpdate>> {
    Ok(Json(state.playback.resume().await?))
}

async fn stop(State(state): State<AppState>) -> ApiResult<Json<StateUpdate>> {
    Ok(Json(state.playback.stop().await?))
}

async fn skip(State(state): State<AppState>) -> ApiResult<Json<StateUpdate>> {
    Ok(Json(state.playback.skip().await?))
}

async fn seek(
    State(state): State<AppState>,
    Json(request): Json<SeekRequest>,
) -> ApiResult<Json<StateUpdate>> {
    Ok(Json(state.playback.seek(request.position_seconds).await?))
}
