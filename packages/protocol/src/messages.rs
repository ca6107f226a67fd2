//! Real-time channel messages
//!
//! Every frame is a JSON object tagged by `type`; payload fields sit next to
//! the tag, e.g. `{"type":"TIME_SYNC_PING","t0":1700000000000}`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::views::{JobStatus, PoolItem, QueueItem, TrackInfo, VoteRoundPayload};
use crate::PlayState;

/// Messages sent from listeners to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    Hello(Hello),
    /// Clock sync probe carrying the listener's local clock reading
    TimeSyncPing { t0: i64 },
    PlayerHeartbeat(PlayerHeartbeat),
    PlayerEvent(PlayerEvent),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Periodic playback diagnostics from a listener
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerHeartbeat {
    pub track_id: Option<Uuid>,
    pub current_time: f64,
    pub paused: bool,
    #[serde(default)]
    pub ready_state: u8,
    #[serde(default)]
    pub network_state: u8,
    #[serde(default)]
    pub buffered_end: Option<f64>,
    #[serde(default)]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerEvent {
    pub event: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// Messages pushed from the server to listeners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    Connected(Connected),
    /// Reply to a ping: echoed `t0` and the server clock reading `t1`
    TimeSyncPong { t0: i64, t1: i64 },
    StateUpdate(StateUpdate),
    ClientAdjust(ClientAdjust),
    DownloadUpdate(DownloadUpdate),
    VoteStart(VoteRoundPayload),
    VoteUpdate(VoteRoundPayload),
    VoteEnd(VoteRoundPayload),
    QueueUpdate(QueueUpdate),
    PoolUpdate(PoolUpdate),
    Error(ErrorPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connected {
    pub connection_id: Uuid,
    pub server_now: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    pub play_state: PlayState,
    pub current_track: Option<TrackInfo>,
    pub server_now: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<Vec<QueueItem>>,
}

/// Out-of-band correction for a single listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientAdjust {
    pub target_track_id: Option<Uuid>,
    pub target_time: f64,
    pub should_be_paused: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadUpdate {
    pub job_id: Uuid,
    pub track_id: Uuid,
    pub playlist_id: Option<Uuid>,
    pub status: JobStatus,
    pub attempts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueUpdate {
    pub queue: Vec<QueueItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolUpdate {
    pub pool: Vec<PoolItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl ErrorPayload {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn invalid_message(details: impl std::fmt::Display) -> Self {
        Self::new("INVALID_MESSAGE", format!("Invalid message format: {}", details))
    }

    pub fn internal() -> Self {
        Self::new("INTERNAL_ERROR", "An internal error occurred")
    }
}

impl ServerMessage {
    /// Wire name of the message, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected(_) => "CONNECTED",
            Self::TimeSyncPong { .. } => "TIME_SYNC_PONG",
            Self::StateUpdate(_) => "STATE_UPDATE",
            Self::ClientAdjust(_) => "CLIENT_ADJUST",
            Self::DownloadUpdate(_) => "DOWNLOAD_UPDATE",
            Self::VoteStart(_) => "VOTE_START",
            Self::VoteUpdate(_) => "VOTE_UPDATE",
            Self::VoteEnd(_) => "VOTE_END",
            Self::QueueUpdate(_) => "QUEUE_UPDATE",
            Self::PoolUpdate(_) => "POOL_UPDATE",
            Self::Error(_) => "ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn ping_uses_flat_shape() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"TIME_SYNC_PING","t0":1700000000123}"#).unwrap();
        assert_eq!(msg, ClientMessage::TimeSyncPing { t0: 1_700_000_000_123 });
    }

    #[test]
    fn heartbeat_accepts_camel_case_fields() {
        let json = r#"{
            "type": "PLAYER_HEARTBEAT",
            "trackId": null,
            "currentTime": 12.5,
            "paused": false,
            "readyState": 4,
            "networkState": 1,
            "bufferedEnd": 30.0
        }"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_matches!(msg, ClientMessage::PlayerHeartbeat(hb) => {
            assert_eq!(hb.current_time, 12.5);
            assert_eq!(hb.ready_state, 4);
            assert_eq!(hb.buffered_end, Some(30.0));
            assert!(hb.last_error.is_none());
        });
    }

    #[test]
    fn hello_fields_are_optional() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"HELLO"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Hello(Hello::default()));
    }

    #[test]
    fn player_event_without_details() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"PLAYER_EVENT","event":"stalled"}"#).unwrap();
        assert_matches!(msg, ClientMessage::PlayerEvent(ev) => {
            assert_eq!(ev.event, "stalled");
            assert!(ev.details.is_null());
        });
    }

    #[test]
    fn pong_serializes_with_type_tag() {
        let json = serde_json::to_value(ServerMessage::TimeSyncPong { t0: 1, t1: 2 }).unwrap();
        assert_eq!(json["type"], "TIME_SYNC_PONG");
        assert_eq!(json["t0"], 1);
        assert_eq!(json["t1"], 2);
    }

    #[test]
    fn state_update_omits_missing_queue() {
        let msg = ServerMessage::StateUpdate(StateUpdate {
            play_state: PlayState::stopped(5),
            current_track: None,
            server_now: 5,
            queue: None,
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "STATE_UPDATE");
        assert_eq!(json["playState"]["paused"], true);
        assert_eq!(json["serverNow"], 5);
        assert!(json.get("queue").is_none());
        assert_eq!(msg.kind(), "STATE_UPDATE");
    }

    #[test]
    fn client_adjust_round_trips() {
        let msg = ServerMessage::ClientAdjust(ClientAdjust {
            target_track_id: Some(Uuid::nil()),
            target_time: 40.0,
            should_be_paused: false,
        });
        let text = serde_json::to_string(&msg).unwrap();
        assert!(text.contains("\"shouldBePaused\":false"));
        let back: ServerMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"NOPE"}"#).is_err());
    }
}
