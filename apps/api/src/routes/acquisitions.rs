//! Acquisition request routes
//!
//! - `POST /api/acquisitions` - `{url, playlistId?}` enqueues a fetch
//! - `GET /api/acquisitions` - recent jobs, newest first
//! - `POST /api/acquisitions/clear` - drop finished jobs

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::models::AcquisitionJob;
use crate::state::AppState;

pub fn acquisitions_router() -> Router<AppState> {
    Router::new()
        .route("/acquisitions", get(list_jobs).post(request_acquisition))
        .route("/acquisitions/clear", post(clear_jobs))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquisitionRequestBody {
    pub url: String,
    #[serde(default)]
    pub playlist_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub removed: u64,
}

async fn request_acquisition(
    State(state): State<AppState>,
    Json(body): Json<AcquisitionRequestBody>,
) -> ApiResult<(StatusCode, Json<AcquisitionJob>)> {
    let job = state
        .acquisitions
        .request(&body.url, body.playlist_id)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

async fn list_jobs(State(state): State<AppState>) -> ApiResult<Json<Vec<AcquisitionJob>>> {
    Ok(Json(state.acquisitions.list().await?))
}

async fn clear_jobs(State(state): State<AppState>) -> ApiResult<Json<ClearResponse>> {
    let removed = state.acquisitions.clear().await?;
    Ok(Json(ClearResponse { removed }))
}
