//! Playlist routes
//!
//! - `GET /api/playlists`, `POST /api/playlists` - `{name}`
//! - `POST /api/playlists/:playlist_id/play` - seed the session from a playlist

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use erwin_protocol::StateUpdate;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::models::Playlist;
use crate::state::AppState;

pub fn playlists_router() -> Router<AppState> {
    Router::new()
        .route("/playlists", get(list_playlists).post(create_playlist))
        .route("/playlists/:playlist_id/play", post(play_playlist))
}

#[derive(Debug, Deserialize)]
pub struct CreatePlaylistRequest {
    pub name: String,
}

async fn list_playlists(State(state): State<AppState>) -> ApiResult<Json<Vec<Playlist>>> {
    Ok(Json(state.playlists.list().await?))
}

async fn create_playlist(
    State(state): State<AppState>,
    Json(request): Json<CreatePlaylistRequest>,
) -> ApiResult<(StatusCode, Json<Playlist>)> {
    let playlist = state.playlists.create(&request.name).await?;
    Ok((StatusCode::CREATED, Json(playlist)))
}

async fn play_playlist(
    State(state): State<AppState>,
    Path(playlist_id): Path<Uuid>,
) -> ApiResult<Json<StateUpdate>> {
    Ok(Json(state.playback.play_playlist(playlist_id).await?))
}
