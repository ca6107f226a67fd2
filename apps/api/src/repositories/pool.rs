//! Candidate pool persistence

use chrono::{DateTime, Utc};
use erwin_protocol::PoolItem;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::models::{PoolEntry, PoolItemRow};

const POOL_ITEM_QUERY: &str = r#"
    SELECT p.id, p.track_id, p.created_at, t.title, t.source_ref, t.acquisition_status
    FROM pool_entries p
    JOIN tracks t ON t.id = p.track_id
"#;

#[tracing::instrument(skip(conn))]
pub async fn list(conn: &mut SqliteConnection) -> sqlx::Result<Vec<PoolItem>> {
    let rows = sqlx::query_as::<_, PoolItemRow>(&format!(
        "{POOL_ITEM_QUERY} ORDER BY p.created_at ASC, p.rowid ASC"
    ))
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Add a track unless it is already pooled. Returns true when inserted.
#[tracing::instrument(skip(conn))]
pub async fn insert(
    conn: &mut SqliteConnection,
    track_id: Uuid,
    now: DateTime<Utc>,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO pool_entries (id, track_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(Uuid::new_v4())
    .bind(track_id)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Remove a track from the pool. Returns true when it was pooled.
#[tracing::instrument(skip(conn))]
pub async fn remove_track(conn: &mut SqliteConnection, track_id: Uuid) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM pool_entries WHERE track_id = ?")
        .bind(track_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[tracing::instrument(skip(conn))]
pub async fn clear(conn: &mut SqliteConnection) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM pool_entries").execute(conn).await?;
    Ok(())
}

/// Entries eligible for a random draw: enabled tracks, optionally only
/// those with an asset.
#[tracing::instrument(skip(conn))]
pub async fn drawable(conn: &mut SqliteConnection, ready_only: bool) -> sqlx::Result<Vec<PoolEntry>> {
    sqlx::query_as::<_, PoolEntry>(
        r#"
        SELECT p.id, p.track_id, p.created_at
        FROM pool_entries p
        JOIN tracks t ON t.id = p.track_id
        WHERE t.disabled = 0 AND (? = 0 OR t.acquisition_status = 'ready')
        ORDER BY p.created_at ASC, p.rowid ASC
        "#,
    )
    .bind(ready_only)
    .fetch_all(conn)
    .await
}

/// Vote candidates: enabled pool tracks that are neither playing nor queued.
#[tracing::instrument(skip(conn))]
pub async fn vote_candidates(
    conn: &mut SqliteConnection,
    current_track_id: Option<Uuid>,
) -> sqlx::Result<Vec<PoolItemRow>> {
    sqlx::query_as::<_, PoolItemRow>(&format!(
        r#"
        {POOL_ITEM_QUERY}
        WHERE t.disabled = 0
          AND (? IS NULL OR p.track_id != ?)
          AND p.track_id NOT IN (SELECT track_id FROM queue_entries)
        ORDER BY p.created_at ASC, p.rowid ASC
        "#
    ))
    .bind(current_track_id)
    .bind(current_track_id)
    .fetch_all(conn)
    .await
}
