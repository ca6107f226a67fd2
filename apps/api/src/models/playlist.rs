//! Playlists act as acquisition destinations and pool seeds

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Maximum length for playlist names
pub const MAX_NAME_LENGTH: usize = 200;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// Number of member tracks, filled by listing queries
    #[sqlx(default)]
    pub track_count: i64,
}
