//! Playlist membership used for pool seeding and acquisition destinations

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::models::Playlist;

#[tracing::instrument(skip(conn))]
pub async fn create(
    conn: &mut SqliteConnection,
    name: &str,
    now: DateTime<Utc>,
) -> sqlx::Result<Playlist> {
    sqlx::query_as::<_, Playlist>(
        r#"
        INSERT INTO playlists (id, name, created_at)
        VALUES (?, ?, ?)
        RETURNING id, name, created_at, 0 AS track_count
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(now)
    .fetch_one(conn)
    .await
}

#[tracing::instrument(skip(conn))]
pub async fn list(conn: &mut SqliteConnection) -> sqlx::Result<Vec<Playlist>> {
    sqlx::query_as::<_, Playlist>(
        r#"
        SELECT p.id, p.name, p.created_at, COUNT(pt.track_id) AS track_count
        FROM playlists p
        LEFT JOIN playlist_tracks pt ON pt.playlist_id = p.id
        GROUP BY p.id
        ORDER BY p.created_at ASC
        "#,
    )
    .fetch_all(conn)
    .await
}

#[tracing::instrument(skip(conn))]
pub async fn exists(conn: &mut SqliteConnection, id: Uuid) -> sqlx::Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM playlists WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(found.is_some())
}

/// Add a track at the end of a playlist. A track already present is left
/// where it is; returns true only when a row was inserted.
#[tracing::instrument(skip(conn))]
pub async fn add_track(
    conn: &mut SqliteConnection,
    playlist_id: Uuid,
    track_id: Uuid,
    now: DateTime<Utc>,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO playlist_tracks (playlist_id, track_id, position, added_at)
        VALUES (
            ?, ?,
            (SELECT COALESCE(MAX(position), 0) + 1 FROM playlist_tracks WHERE playlist_id = ?),
            ?
        )
        "#,
    )
    .bind(playlist_id)
    .bind(track_id)
    .bind(playlist_id)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Members that can be played right now, in playlist order.
#[tracing::instrument(skip(conn))]
pub async fn playable_track_ids(
    conn: &mut SqliteConnection,
    playlist_id: Uuid,
) -> sqlx::Result<Vec<Uuid>> {
    sqlx::query_scalar(
        r#"
        SELECT t.id
        FROM playlist_tracks pt
        JOIN tracks t ON t.id = pt.track_id
        WHERE pt.playlist_id = ?
          AND t.disabled = 0
          AND t.acquisition_status = 'ready'
          AND t.asset_path IS NOT NULL
        ORDER BY pt.position ASC
        "#,
    )
    .bind(playlist_id)
    .fetch_all(conn)
    .await
}

/// Number of times a track appears in a playlist (0 or 1).
pub async fn membership_count(
    conn: &mut SqliteConnection,
    playlist_id: Uuid,
    track_id: Uuid,
) -> sqlx::Result<i64> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM playlist_tracks WHERE playlist_id = ? AND track_id = ?",
    )
    .bind(playlist_id)
    .bind(track_id)
    .fetch_one(conn)
    .await
}
