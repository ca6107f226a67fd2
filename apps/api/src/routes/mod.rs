//! HTTP route handlers for the erwin API
//!
//! - `/health` for load balancers and probes
//! - `/api/...` control API (session, queue, pool, votes, acquisitions,
//!   playlists, commands, client diagnostics)
//! - `/api/audio/:track_id` asset streaming with range support
//! - `/ws` real-time channel

pub mod acquisitions;
pub mod audio;
pub mod clients;
pub mod commands;
pub mod health;
pub mod playlists;
pub mod queue;
pub mod session;
pub mod votes;

use axum::{routing::get, Router};

use crate::state::AppState;
use crate::websocket::ws_handler;

/// Assemble every route. Layers (tracing, CORS) are added by the binary.
pub fn api_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(session::session_router())
        .merge(queue::queue_router())
        .merge(votes::votes_router())
        .merge(acquisitions::acquisitions_router())
        .merge(playlists::playlists_router())
        .merge(commands::commands_router())
        .merge(clients::clients_router())
        .merge(audio::audio_router());

    Router::new()
        .nest("/health", health::health_router())
        .nest("/api", api)
        .route("/ws", get(ws_handler))
        .with_state(state)
}
