//! Vote routes
//!
//! - `GET /api/votes/current` - the unresolved round, or `null`
//! - `POST /api/votes` - `{voterId, optionIndex}` (0-based)

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use erwin_protocol::VoteRoundPayload;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;

pub fn votes_router() -> Router<AppState> {
    Router::new()
        .route("/votes/current", get(current_round))
        .route("/votes", post(cast_vote))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVoteRequest {
    pub voter_id: String,
    pub option_index: usize,
}

async fn current_round(
    State(state): State<AppState>,
) -> ApiResult<Json<Option<VoteRoundPayload>>> {
    Ok(Json(state.votes.current().await?))
}

async fn cast_vote(
    State(state): State<AppState>,
    Json(request): Json<CastVoteRequest>,
) -> ApiResult<Json<VoteRoundPayload>> {
    Ok(Json(
        state
            .votes
            .cast(&request.voter_id, request.option_index)
            .await?,
    ))
}
