//! Per-connection message handling
//!
//! Answers clock probes, records listener diagnostics and pushes a
//! `CLIENT_ADJUST` to a listener whose heartbeat shows it playing the wrong
//! track or drifting past the adjust threshold.

use erwin_protocol::timeline::expected_position_secs;
use erwin_protocol::{ClientAdjust, ClientMessage, PlayState, PlayerHeartbeat, ServerMessage};
use thiserror::Error;
use uuid::Uuid;

use super::connection::ConnectionManager;
use crate::repositories::{play_state, tracks};
use crate::state::AppContext;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("connection {0} is gone")]
    ConnectionGone(Uuid),
}

/// Handles messages for a single connection
pub struct SyncHandler {
    connection_id: Uuid,
    ctx: AppContext,
    connections: ConnectionManager,
    adjust_threshold_secs: f64,
}

impl SyncHandler {
    pub fn new(
        connection_id: Uuid,
        ctx: AppContext,
        connections: ConnectionManager,
        adjust_threshold_secs: f64,
    ) -> Self {
        Self {
            connection_id,
            ctx,
            connections,
            adjust_threshold_secs,
        }
    }

    pub async fn handle_message(&self, message: ClientMessage) -> Result<(), SyncError> {
        match message {
            ClientMessage::Hello(hello) => {
                tracing::info!(
                    connection_id = %self.connection_id,
                    client_id = ?hello.client_id,
                    page = ?hello.page,
                    "Listener said hello"
                );
                self.connections.record_hello(self.connection_id, &hello);
                Ok(())
            }
            ClientMessage::TimeSyncPing { t0 } => self.send(ServerMessage::TimeSyncPong {
                t0,
                t1: self.ctx.now_ms(),
            }),
            ClientMessage::PlayerHeartbeat(heartbeat) => self.handle_heartbeat(heartbeat).await,
            ClientMessage::PlayerEvent(event) => {
                tracing::debug!(
                    connection_id = %self.connection_id,
                    event = %event.event,
                    details = %event.details,
                    "Player event"
                );
                self.connections.record_event(self.connection_id, &event.event);
                Ok(())
            }
        }
    }

    async fn handle_heartbeat(&self, heartbeat: PlayerHeartbeat) -> Result<(), SyncError> {
        let mut conn = self.ctx.db.acquire().await?;
        let state = play_state::get(&mut conn).await?;
        let duration = match state.current_track_id {
            Some(id) => tracks::find(&mut conn, id).await?.and_then(|t| t.duration_sec),
            None => None,
        };
        drop(conn);

        let now_ms = self.ctx.now_ms();
        let check = check_heartbeat(&state, duration, &heartbeat, now_ms, self.adjust_threshold_secs);
        self.connections
            .record_heartbeat(self.connection_id, heartbeat, now_ms, check.drift_secs);

        if let Some(adjust) = check.adjust {
            tracing::debug!(
                connection_id = %self.connection_id,
                drift = ?check.drift_secs,
                target_time = adjust.target_time,
                "Pushing client adjustment"
            );
            self.connections.record_adjustment(self.connection_id);
            self.send(ServerMessage::ClientAdjust(adjust))?;
        }
        Ok(())
    }

    pub fn send(&self, message: ServerMessage) -> Result<(), SyncError> {
        if self.connections.send_to(self.connection_id, message) {
            Ok(())
        } else {
            Err(SyncError::ConnectionGone(self.connection_id))
        }
    }
}

/// Outcome of comparing a heartbeat with the authoritative timeline
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatCheck {
    /// Local minus expected position, when both sides play the same track
    pub drift_secs: Option<f64>,
    pub adjust: Option<ClientAdjust>,
}

pub fn check_heartbeat(
    state: &PlayState,
    duration_sec: Option<f64>,
    heartbeat: &PlayerHeartbeat,
    now_ms: i64,
    threshold_secs: f64,
) -> HeartbeatCheck {
    let expected = expected_position_secs(state, duration_sec, now_ms);
    let adjust = ClientAdjust {
        target_track_id: state.current_track_id,
        target_time: expected,
        should_be_paused: state.paused,
    };

    if heartbeat.track_id != state.current_track_id {
        return HeartbeatCheck {
            drift_secs: None,
            adjust: Some(adjust),
        };
    }
    if state.current_track_id.is_none() {
        return HeartbeatCheck {
            drift_secs: None,
            adjust: None,
        };
    }

    let drift = heartbeat.current_time - expected;
    HeartbeatCheck {
        drift_secs: Some(drift),
        adjust: (drift.abs() > threshold_secs).then_some(adjust),
    }
}
