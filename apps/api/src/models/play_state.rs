//! Row mapping for the singleton `play_state` record

use erwin_protocol::PlayState;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct PlayStateRow {
    pub current_track_id: Option<Uuid>,
    pub started_at_ms: Option<i64>,
    pub paused_at_ms: Option<i64>,
    pub paused: bool,
    pub updated_at_ms: i64,
}

impl From<PlayStateRow> for PlayState {
    fn from(row: PlayStateRow) -> Self {
        Self {
            current_track_id: row.current_track_id,
            started_at_ms: row.started_at_ms,
            paused_at_ms: row.paused_at_ms,
            paused: row.paused,
            updated_at_ms: row.updated_at_ms,
        }
    }
}
