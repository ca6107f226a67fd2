//! Health check HTTP route handlers
//!
//! - `GET /health` - Simple liveness check (returns 200 OK)
//! - `GET /health/live` - Liveness probe with version
//! - `GET /health/ready` - Readiness check (verifies the session store)

use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};

use crate::state::AppState;

pub fn health_router() -> Router<AppState> {
    Router::new()
        .route("/", get(simple_health))
        .route("/live", get(liveness_probe))
        .route("/ready", get(readiness_probe))
}

/// Always OK while the process is serving HTTP
async fn simple_health() -> &'static str {
    "OK"
}

async fn liveness_probe() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness probe
///
/// Runs a trivial query against the session store and reports the number
/// of connected listeners.
///
/// # Response
/// - 200 OK if the store answers
/// - 503 Service Unavailable otherwise
async fn readiness_probe(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();
    let database = sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&state.ctx.db)
        .await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    match database {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "healthy",
                "database": { "status": "healthy", "responseTimeMs": elapsed_ms },
                "listeners": state.connections.count(),
            })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "unhealthy",
                    "database": { "status": "unhealthy", "error": "Database query failed" },
                    "listeners": state.connections.count(),
                })),
            )
        }
    }
}
