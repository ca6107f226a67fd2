//! Acquisition job model and retry policy

use std::time::Duration;

use chrono::{DateTime, Utc};
use erwin_protocol::{DownloadUpdate, JobStatus};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Doubling stops after this many attempts; the ceiling takes over.
const MAX_BACKOFF_EXPONENT: u32 = 5;

/// One request to turn a source reference into a playable asset.
///
/// Several jobs may point at the same track; they share its outcome.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquisitionJob {
    pub id: Uuid,
    pub track_id: Uuid,
    /// Playlist that receives the track once it is ready
    pub playlist_id: Option<Uuid>,
    pub status: JobStatus,
    pub attempts: i64,
    pub retry_after_ms: Option<i64>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AcquisitionJob {
    pub fn to_update(&self) -> DownloadUpdate {
        DownloadUpdate {
            job_id: self.id,
            track_id: self.track_id,
            playlist_id: self.playlist_id,
            status: self.status,
            attempts: self.attempts,
            retry_after_ms: self.retry_after_ms,
            error: self.error.clone(),
        }
    }
}

/// Exponential backoff for the `attempts`-th failure (counted from 1).
///
/// `base * 2^min(5, attempts)`, capped at `max`. Non-decreasing in
/// `attempts`.
pub fn backoff_delay(attempts: i64, base: Duration, max: Duration) -> Duration {
    let exponent = attempts.clamp(0, MAX_BACKOFF_EXPONENT as i64) as u32;
    base.checked_mul(1u32 << exponent).unwrap_or(max).min(max)
}

/// Delay before the next attempt. A hint from the tool (e.g. a rate-limit
/// window) can lengthen the delay but never past `max`.
pub fn retry_delay(
    attempts: i64,
    hint: Option<Duration>,
    base: Duration,
    max: Duration,
) -> Duration {
    let computed = backoff_delay(attempts, base, max);
    hint.map_or(computed, |h| computed.max(h)).min(max)
}
