//! Real-time channel
//!
//! - [`hub`]: fan-out of server events to every connection
//! - [`connection`]: per-connection registry and diagnostics
//! - [`handler`]: WebSocket upgrade and per-connection tasks
//! - [`sync`]: clock probes, heartbeats and drift correction

pub mod connection;
pub mod handler;
pub mod hub;
pub mod sync;

pub use connection::{ClientDiagnostics, ConnectionManager, ConnectionSummary};
pub use handler::ws_handler;
pub use hub::BroadcastHub;
pub use sync::{check_heartbeat, HeartbeatCheck, SyncError, SyncHandler};
