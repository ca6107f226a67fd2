//! Queue and pool models
//!
//! The queue is an ordered list with dense positions `1..=N`. The pool is
//! an unordered set of tracks eligible for random draw or voting; a track
//! is never in both at once.

use chrono::{DateTime, Utc};
use erwin_protocol::{AcquisitionStatus, PoolItem, QueueItem, QueueSource};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: Uuid,
    pub track_id: Uuid,
    pub source: QueueSource,
    /// Dense 1-based position
    pub position: i64,
    pub created_at: DateTime<Utc>,
}

/// Queue entry joined with its track for listing
#[derive(Debug, Clone, FromRow)]
pub struct QueueItemRow {
    pub id: Uuid,
    pub track_id: Uuid,
    pub source: QueueSource,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub title: Option<String>,
    pub duration_sec: Option<f64>,
}

impl From<QueueItemRow> for QueueItem {
    fn from(row: QueueItemRow) -> Self {
        Self {
            id: row.id,
            track_id: row.track_id,
            source: row.source,
            position: row.position,
            created_at: row.created_at,
            title: row.title,
            duration_sec: row.duration_sec,
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct PoolEntry {
    pub id: Uuid,
    pub track_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Pool entry joined with its track
#[derive(Debug, Clone, FromRow)]
pub struct PoolItemRow {
    pub id: Uuid,
    pub track_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub title: Option<String>,
    pub source_ref: String,
    pub acquisition_status: AcquisitionStatus,
}

impl PoolItemRow {
    pub fn label(&self) -> String {
        self.title.clone().unwrap_or_else(|| self.source_ref.clone())
    }
}

impl From<PoolItemRow> for PoolItem {
    fn from(row: PoolItemRow) -> Self {
        Self {
            id: row.id,
            track_id: row.track_id,
            created_at: row.created_at,
            title: row.title,
            status: row.acquisition_status,
        }
    }
}

/// Reorder direction for a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    Up,
    Down,
}

impl MoveDirection {
    /// Position of the neighbour to swap with.
    pub fn neighbour(self, position: i64) -> i64 {
        match self {
            Self::Up => position - 1,
            Self::Down => position + 1,
        }
    }
}

/// Check that positions form the dense sequence `1..=N`.
pub fn is_dense(positions: &[i64]) -> bool {
    let mut sorted = positions.to_vec();
    sorted.sort_unstable();
    sorted
        .iter()
        .enumerate()
        .all(|(i, p)| *p == i as i64 + 1)
}
