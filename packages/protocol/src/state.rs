//! The authoritative playback record
//!
//! [`PlayState`] is a plain value; every transition returns a new value so
//! the store can read, transform and write it inside one transaction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Singleton record describing what is playing and since when.
///
/// `current_track_id` and `started_at_ms` are set together or not at all,
/// and `paused_at_ms` is only ever set while `paused` is true.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayState {
    pub current_track_id: Option<Uuid>,
    /// Server time (epoch ms) at which position zero would have played
    pub started_at_ms: Option<i64>,
    pub paused_at_ms: Option<i64>,
    pub paused: bool,
    pub updated_at_ms: i64,
}

impl PlayState {
    /// Idle terminal display state.
    pub fn stopped(now_ms: i64) -> Self {
        Self {
            current_track_id: None,
            started_at_ms: None,
            paused_at_ms: None,
            paused: true,
            updated_at_ms: now_ms,
        }
    }

    /// Start `track_id` from position zero, or go idle and unpaused for `None`.
    pub fn started(track_id: Option<Uuid>, now_ms: i64) -> Self {
        Self {
            current_track_id: track_id,
            started_at_ms: track_id.map(|_| now_ms),
            paused_at_ms: None,
            paused: false,
            updated_at_ms: now_ms,
        }
    }

    /// Check the record invariants.
    pub fn is_consistent(&self) -> bool {
        self.current_track_id.is_some() == self.started_at_ms.is_some()
            && (self.paused_at_ms.is_none() || self.paused)
    }

    /// A track is loaded and the timeline is advancing.
    pub fn is_playing(&self) -> bool {
        self.current_track_id.is_some() && !self.paused
    }

    /// Freeze the timeline. Returns `self` unchanged when already paused or idle.
    pub fn paused_at(self, now_ms: i64) -> Self {
        if self.paused || self.current_track_id.is_none() {
            return self;
        }
        Self {
            paused: true,
            paused_at_ms: Some(now_ms),
            updated_at_ms: now_ms,
            ..self
        }
    }

    /// Unfreeze the timeline, shifting `started_at_ms` so the elapsed
    /// position at pause time is preserved. Unchanged when not paused.
    pub fn resumed(self, now_ms: i64) -> Self {
        if !self.paused {
            return self;
        }
        let started_at_ms = match (self.started_at_ms, self.paused_at_ms) {
            (Some(started), Some(paused_at)) => Some(now_ms - (paused_at - started).max(0)),
            (Some(_), None) => Some(now_ms),
            (None, _) => None,
        };
        Self {
            started_at_ms,
            paused_at_ms: None,
            paused: false,
            updated_at_ms: now_ms,
            ..self
        }
    }

    /// Move the playhead to `seconds`. Returns `None` when nothing is loaded.
    ///
    /// Negative targets clamp to zero. A paused state keeps its pause, with
    /// the pause reference moved to `now_ms` so the frozen position is the
    /// seek target.
    pub fn seeked(self, seconds: f64, now_ms: i64) -> Option<Self> {
        self.current_track_id?;
        let offset_ms = (seconds.max(0.0) * 1000.0).round() as i64;
        Some(Self {
            started_at_ms: Some(now_ms - offset_ms),
            paused_at_ms: self.paused.then_some(now_ms),
            updated_at_ms: now_ms,
            ..self
        })
    }

    /// Milliseconds of the current track that have played at `server_now_ms`.
    pub fn elapsed_ms(&self, server_now_ms: i64) -> Option<i64> {
        let started = self.started_at_ms?;
        let reference = if self.paused {
            self.paused_at_ms.unwrap_or(server_now_ms)
        } else {
            server_now_ms
        };
        Some((reference - started).max(0))
    }
}
