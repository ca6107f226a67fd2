//! Shared wire protocol for erwin
//!
//! Everything that crosses the real-time channel or the control API lives
//! here so the server and listeners agree on one definition:
//!
//! - [`messages`]: client/server WebSocket messages
//! - [`state`]: the authoritative [`PlayState`] record and its transitions
//! - [`views`]: read models for tracks, queue, pool and vote rounds
//! - [`timeline`]: elapsed/expected-position arithmetic

pub mod messages;
pub mod state;
pub mod timeline;
pub mod views;

pub use messages::{
    ClientAdjust, ClientMessage, Connected, DownloadUpdate, ErrorPayload, Hello, PlayerEvent,
    PlayerHeartbeat, PoolUpdate, QueueUpdate, ServerMessage, StateUpdate,
};
pub use state::PlayState;
pub use views::{
    AcquisitionStatus, JobStatus, PoolItem, QueueItem, QueueSource, SessionSnapshot, TrackInfo,
    VoteOption, VoteRoundPayload,
};
