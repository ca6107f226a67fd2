//! `POST /api/commands` - `{author, text}` runs one chat command

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::services::CommandReply;
use crate::state::AppState;

pub fn commands_router() -> Router<AppState> {
    Router::new().route("/commands", post(run_command))
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub author: String,
    pub text: String,
}

async fn run_command(
    State(state): State<AppState>,
    Json(request): Json<CommandRequest>,
) -> ApiResult<Json<CommandReply>> {
    Ok(Json(
        state
            .commands
            .execute(&request.author, &request.text)
            .await?,
    ))
}
