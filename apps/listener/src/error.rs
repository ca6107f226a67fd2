//! Listener error types
//!
//! [`MediaError`] is what a media element reports back; the reconciler
//! records it as diagnostics and keeps going. [`ListenerError`] covers the
//! network side of the driver, which reconnects on any of them.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MediaError {
    /// Playback was refused by policy, e.g. autoplay blocked
    #[error("playback not allowed: {0}")]
    NotAllowed(String),

    /// Seek or play attempted before the asset's metadata is available
    #[error("media not ready")]
    NotReady,

    /// The asset failed to load or decode
    #[error("media source error: {0}")]
    Source(String),

    /// Nothing is loaded
    #[error("no media source")]
    NoSource,
}

impl MediaError {
    /// Short code reported in heartbeats and player events
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAllowed(_) => "play_blocked",
            Self::NotReady => "not_ready",
            Self::Source(_) => "media_error",
            Self::NoSource => "no_source",
        }
    }

    /// Failures that retrying on the next tick can fix by themselves
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NotReady)
    }
}

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("state request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid server url: {0}")]
    Url(#[from] url::ParseError),

    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported server url scheme: {0}")]
    UnsupportedScheme(String),

    #[error("connection closed by server")]
    Closed,
}

pub type ListenerResult<T> = Result<T, ListenerError>;
