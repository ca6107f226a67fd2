//! Database configuration types

use crate::{get_env_or_default, parse_env, ConfigResult};

/// SQLite database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Connection URL (e.g., sqlite://data/erwin.sqlite?mode=rwc)
    pub url: String,

    /// Maximum number of connections in the pool.
    ///
    /// Defaults to one so every writer serializes at transaction begin.
    pub max_connections: u32,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
}

impl DatabaseConfig {
    /// Load database configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            url: get_env_or_default("DATABASE_URL", "sqlite://data/erwin.sqlite?mode=rwc"),
            max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 1)?,
            connect_timeout_secs: parse_env("DATABASE_CONNECT_TIMEOUT", 30)?,
        })
    }

    /// Create a configuration with a custom URL (useful for testing)
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Whether the URL points at a private in-memory database
    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/erwin.sqlite?mode=rwc".to_string(),
            max_connections: 1,
            connect_timeout_secs: 30,
        }
    }
}
