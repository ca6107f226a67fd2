//! Queue and pool routes
//!
//! - `GET /api/queue`, `POST /api/queue` - `{trackId, source?}`
//! - `POST /api/queue/:entry_id/move` - `{direction: "up" | "down"}`
//! - `DELETE /api/queue/:entry_id`
//! - `GET /api/pool`

use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use erwin_protocol::{PoolItem, QueueItem, QueueSource};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::models::MoveDirection;
use crate::state::AppState;

pub fn queue_router() -> Router<AppState> {
    Router::new()
        .route("/queue", get(list_queue).post(enqueue))
        .route("/queue/:entry_id/move", post(move_entry))
        .route("/queue/:entry_id", delete(remove_entry))
        .route("/pool", get(list_pool))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    pub track_id: Uuid,
    #[serde(default)]
    pub source: QueueSource,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub direction: MoveDirection,
}

async fn list_queue(State(state): State<AppState>) -> ApiResult<Json<Vec<QueueItem>>> {
    Ok(Json(state.queue.list().await?))
}

async fn enqueue(
    State(state): State<AppState>,
    Json(request): Json<EnqueueRequest>,
) -> ApiResult<Json<Vec<QueueItem>>> {
    Ok(Json(
        state.queue.enqueue(request.track_id, request.source).await?,
    ))
}

async fn move_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
    Json(request): Json<MoveRequest>,
) -> ApiResult<Json<Vec<QueueItem>>> {
    Ok(Json(
        state.queue.move_entry(entry_id, request.direction).await?,
    ))
}

async fn remove_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
) -> ApiResult<Json<Vec<QueueItem>>> {
    Ok(Json(state.queue.remove(entry_id).await?))
}

async fn list_pool(State(state): State<AppState>) -> ApiResult<Json<Vec<PoolItem>>> {
    Ok(Json(state.queue.pool().await?))
}
