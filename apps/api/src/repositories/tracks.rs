//! Track persistence

use chrono::{DateTime, Utc};
use erwin_protocol::AcquisitionStatus;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::models::{Track, TrackMetadata};

const TRACK_COLUMNS: &str = r#"
    id, source_ref, source_url, title, channel, thumbnail, duration_sec, asset_path,
    acquisition_status, acquisition_error, acquired_at, disabled, created_at
"#;

#[tracing::instrument(skip(conn))]
pub async fn find(conn: &mut SqliteConnection, id: Uuid) -> sqlx::Result<Option<Track>> {
    sqlx::query_as::<_, Track>(&format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE id = ?"))
        .bind(id)
        .fetch_optional(conn)
        .await
}

#[tracing::instrument(skip(conn))]
pub async fn find_by_source_ref(
    conn: &mut SqliteConnection,
    source_ref: &str,
) -> sqlx::Result<Option<Track>> {
    sqlx::query_as::<_, Track>(&format!(
        "SELECT {TRACK_COLUMNS} FROM tracks WHERE source_ref = ?"
    ))
    .bind(source_ref)
    .fetch_optional(conn)
    .await
}

/// Insert a new, not yet acquired track.
#[tracing::instrument(skip(conn))]
pub async fn insert(
    conn: &mut SqliteConnection,
    source_ref: &str,
    source_url: &str,
    now: DateTime<Utc>,
) -> sqlx::Result<Track> {
    sqlx::query_as::<_, Track>(&format!(
        r#"
        INSERT INTO tracks (id, source_ref, source_url, acquisition_status, disabled, created_at)
        VALUES (?, ?, ?, 'pending', 0, ?)
        RETURNING {TRACK_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(source_ref)
    .bind(source_url)
    .bind(now)
    .fetch_one(conn)
    .await
}

#[tracing::instrument(skip(conn))]
pub async fn set_status(
    conn: &mut SqliteConnection,
    id: Uuid,
    status: AcquisitionStatus,
    error: Option<&str>,
) -> sqlx::Result<()> {
    sqlx::query("UPDATE tracks SET acquisition_status = ?, acquisition_error = ? WHERE id = ?")
        .bind(status)
        .bind(error)
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Record a successful acquisition.
///
/// Metadata columns are only filled when still NULL so the first
/// successful writer wins; the asset path is always replaced.
#[tracing::instrument(skip(conn, metadata))]
pub async fn mark_acquired(
    conn: &mut SqliteConnection,
    id: Uuid,
    metadata: &TrackMetadata,
    asset_path: &str,
    now: DateTime<Utc>,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        UPDATE tracks
        SET title = COALESCE(title, ?),
            channel = COALESCE(channel, ?),
            thumbnail = COALESCE(thumbnail, ?),
            duration_sec = COALESCE(duration_sec, ?),
            asset_path = ?,
            acquisition_status = 'ready',
            acquisition_error = NULL,
            acquired_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&metadata.title)
    .bind(&metadata.channel)
    .bind(&metadata.thumbnail)
    .bind(metadata.duration_sec)
    .bind(asset_path)
    .bind(now)
    .bind(id)
    .execute(conn)
    .await?;
    Ok(())
}
