use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use erwin_listener::{Clock, ListenerConfig, SessionClient, SystemClock, VirtualPlayhead};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "erwin_listener=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = ListenerConfig::from_env().context("Failed to load listener configuration")?;
    tracing::info!(
        server_url = %config.server_url,
        client_id = %config.client_id,
        "Starting erwin listener"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let media = VirtualPlayhead::new(clock.clone());
    let client = SessionClient::new(config, media, clock);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        tracing::info!("Shutdown signal received");
        signal.cancel();
    });

    client.run(shutdown).await;
    Ok(())
}
