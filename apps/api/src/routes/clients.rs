//! `GET /api/clients` - diagnostics for every connected listener

use axum::{extract::State, routing::get, Json, Router};

use crate::state::AppState;
use crate::websocket::ConnectionSummary;

pub fn clients_router() -> Router<AppState> {
    Router::new().route("/clients", get(list_clients))
}

async fn list_clients(State(state): State<AppState>) -> Json<Vec<ConnectionSummary>> {
    Json(state.connections.summaries())
}
