//! erwin API library
//!
//! The session server: authoritative playback state, queue and pool,
//! real-time broadcast, acquisition pipeline and vote scheduler. Exposed as
//! a library for the binary and for integration tests.

pub mod clock;
pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;
pub mod websocket;

use std::str::FromStr;
use std::time::Duration;

use erwin_shared_config::DatabaseConfig;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

// Re-export commonly used types
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::api_router;
pub use state::{AppContext, AppState};

/// Embedded schema migrations
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Open the session store.
///
/// In-memory databases are private to their connection, so the pool keeps
/// its connections open for the lifetime of the process.
pub async fn connect(config: &DatabaseConfig) -> sqlx::Result<SqlitePool> {
    let mut options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .foreign_keys(true);
    if !config.is_in_memory() {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let mut pool_options = SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs));
    if config.is_in_memory() {
        pool_options = pool_options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }
    pool_options.connect_with(options).await
}
