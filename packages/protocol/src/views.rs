//! Read models shared by the control API and the real-time channel

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::PlayState;

/// Track-level acquisition status, shared by every job for the track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionStatus {
    #[default]
    Pending,
    Downloading,
    Ready,
    Failed,
    Blocked,
}

/// Status of a single acquisition request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    /// Another job for the same track is fetching it
    Waiting,
    Downloading,
    Ready,
    Failed,
    Blocked,
}

impl JobStatus {
    /// Statuses that still await an outcome for their track.
    pub const OUTSTANDING: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Waiting,
        JobStatus::Downloading,
        JobStatus::Failed,
    ];

    pub fn is_outstanding(self) -> bool {
        Self::OUTSTANDING.contains(&self)
    }
}

/// Who put an entry into the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum QueueSource {
    #[default]
    Admin,
    Pool,
    Vote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub id: Uuid,
    pub source_ref: String,
    pub title: Option<String>,
    pub channel: Option<String>,
    pub thumbnail: Option<String>,
    pub duration_sec: Option<f64>,
    pub status: AcquisitionStatus,
    pub disabled: bool,
    /// Path of the playable asset on the control API, once acquired
    pub asset_url: Option<String>,
}

impl TrackInfo {
    /// Human-readable label, falling back to the source reference.
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.source_ref)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: Uuid,
    pub track_id: Uuid,
    pub source: QueueSource,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub title: Option<String>,
    pub duration_sec: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolItem {
    pub id: Uuid,
    pub track_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub title: Option<String>,
    pub status: AcquisitionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteOption {
    pub track_id: Uuid,
    pub label: String,
}

/// Payload of VOTE_START, VOTE_UPDATE and VOTE_END
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRoundPayload {
    pub round_id: Uuid,
    pub started_at: i64,
    pub ends_at: i64,
    pub options: Vec<VoteOption>,
    pub counts: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Uuid>,
}

/// Full state returned to clients that need to resynchronize
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub play_state: PlayState,
    pub current_track: Option<TrackInfo>,
    pub queue: Vec<QueueItem>,
    pub pool: Vec<PoolItem>,
    pub server_now: i64,
}
