use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, Method};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use erwin_api::clock::SystemClock;
use erwin_api::config::Config;
use erwin_api::services::YtDlpTool;
use erwin_api::websocket::BroadcastHub;
use erwin_api::{api_router, connect, jobs, AppContext, AppState, MIGRATOR};

/// Build the CORS layer based on configuration.
///
/// In production mode:
/// - If `CORS_ALLOWED_ORIGINS` is set, only those origins are allowed
/// - Otherwise CORS requests are rejected (no origins allowed)
///
/// In development mode:
/// - If `CORS_ALLOWED_ORIGINS` is set, those origins are used
/// - Otherwise permissive CORS is used for convenience
fn build_cors_layer(config: &Config) -> CorsLayer {
    match &config.cors_allowed_origins {
        Some(origins) if !origins.is_empty() => {
            let allowed_origins: Vec<_> = origins
                .iter()
                .filter_map(|origin| {
                    origin.parse().ok().or_else(|| {
                        tracing::warn!("Invalid CORS origin '{}', skipping", origin);
                        None
                    })
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::error!("No valid CORS origins configured, CORS requests will be rejected");
                CorsLayer::new()
            } else {
                tracing::info!(
                    "CORS configured with {} allowed origin(s): {:?}",
                    allowed_origins.len(),
                    origins
                );
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::RANGE])
                    .max_age(std::time::Duration::from_secs(3600))
            }
        }
        _ if config.is_production() => {
            tracing::warn!(
                "CORS_ALLOWED_ORIGINS not configured in production mode. \
                 CORS requests will be rejected."
            );
            CorsLayer::new()
        }
        _ => {
            tracing::warn!(
                "Using permissive CORS in development mode. \
                 Set CORS_ALLOWED_ORIGINS for production-like behavior."
            );
            CorsLayer::permissive()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "erwin_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!(
        environment = %config.common.environment,
        port = config.port,
        "Starting erwin session server"
    );

    tokio::fs::create_dir_all(&config.common.audio_dir).await?;

    tracing::info!("Connecting to database...");
    let pool = connect(config.database()).await?;
    tracing::info!("Running database migrations...");
    MIGRATOR.run(&pool).await?;
    tracing::info!("Migrations completed successfully");

    let ctx = AppContext::new(pool, BroadcastHub::new(), Arc::new(SystemClock));
    let shutdown = CancellationToken::new();

    let tool = Arc::new(YtDlpTool::new(
        config.acquisition.ytdlp.clone(),
        config.common.audio_dir.clone(),
    ));
    let job_handles = jobs::spawn_all(&ctx, &config, tool, &shutdown);
    tracing::info!(count = job_handles.len(), "Background jobs started");

    let cors_layer = build_cors_layer(&config);
    let port = config.port;
    let state = AppState::new(ctx, config);
    let app = api_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    let signal_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
            signal_token.cancel();
        })
        .await?;

    shutdown.cancel();
    for handle in job_handles {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Background job ended abnormally");
        }
    }
    tracing::info!("Server stopped");
    Ok(())
}
