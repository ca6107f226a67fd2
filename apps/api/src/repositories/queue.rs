//! Request queue persistence
//!
//! Positions are dense (`1..=N`) and unique. SQLite checks the UNIQUE
//! constraint row by row during an UPDATE, so renumbering first moves every
//! entry to a negative position and then assigns the final ones.

use chrono::{DateTime, Utc};
use erwin_protocol::{QueueItem, QueueSource};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::models::{QueueEntry, QueueItemRow};

/// Entries joined with track info, in play order.
#[tracing::instrument(skip(conn))]
pub async fn list(conn: &mut SqliteConnection) -> sqlx::Result<Vec<QueueItem>> {
    let rows = sqlx::query_as::<_, QueueItemRow>(
        r#"
        SELECT q.id, q.track_id, q.source, q.position, q.created_at, t.title, t.duration_sec
        FROM queue_entries q
        JOIN tracks t ON t.id = q.track_id
        ORDER BY q.position ASC
        "#,
    )
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

#[tracing::instrument(skip(conn))]
pub async fn find(conn: &mut SqliteConnection, id: Uuid) -> sqlx::Result<Option<QueueEntry>> {
    sqlx::query_as::<_, QueueEntry>(
        "SELECT id, track_id, source, position, created_at FROM queue_entries WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(conn)
    .await
}

#[tracing::instrument(skip(conn))]
pub async fn find_at(
    conn: &mut SqliteConnection,
    position: i64,
) -> sqlx::Result<Option<QueueEntry>> {
    sqlx::query_as::<_, QueueEntry>(
        "SELECT id, track_id, source, position, created_at FROM queue_entries WHERE position = ?",
    )
    .bind(position)
    .fetch_optional(conn)
    .await
}

/// The entry that plays next.
pub async fn head(conn: &mut SqliteConnection) -> sqlx::Result<Option<QueueEntry>> {
    find_at(conn, 1).await
}

/// Append at the tail with the next dense position.
#[tracing::instrument(skip(conn))]
pub async fn append(
    conn: &mut SqliteConnection,
    track_id: Uuid,
    source: QueueSource,
    now: DateTime<Utc>,
) -> sqlx::Result<QueueEntry> {
    sqlx::query_as::<_, QueueEntry>(
        r#"
        INSERT INTO queue_entries (id, track_id, source, position, created_at)
        VALUES (?, ?, ?, (SELECT COALESCE(MAX(position), 0) + 1 FROM queue_entries), ?)
        RETURNING id, track_id, source, position, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(track_id)
    .bind(source)
    .bind(now)
    .fetch_one(conn)
    .await
}

/// Remove an entry and close the gap. Returns false if it did not exist.
#[tracing::instrument(skip(conn))]
pub async fn delete(conn: &mut SqliteConnection, id: Uuid) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM queue_entries WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        return Ok(false);
    }
    renumber(conn).await?;
    Ok(true)
}

/// Exchange the positions of two entries.
#[tracing::instrument(skip(conn))]
pub async fn swap(conn: &mut SqliteConnection, a: &QueueEntry, b: &QueueEntry) -> sqlx::Result<()> {
    // Park `a` outside the valid range so the UNIQUE check never trips
    for (id, position) in [(a.id, -1), (b.id, a.position), (a.id, b.position)] {
        sqlx::query("UPDATE queue_entries SET position = ? WHERE id = ?")
            .bind(position)
            .bind(id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Rewrite positions to `1..=N` preserving order.
#[tracing::instrument(skip(conn))]
pub async fn renumber(conn: &mut SqliteConnection) -> sqlx::Result<()> {
    let ids: Vec<Uuid> =
        sqlx::query_scalar("SELECT id FROM queue_entries ORDER BY position ASC")
            .fetch_all(&mut *conn)
            .await?;

    sqlx::query("UPDATE queue_entries SET position = -position - 1")
        .execute(&mut *conn)
        .await?;

    for (index, id) in ids.iter().enumerate() {
        sqlx::query("UPDATE queue_entries SET position = ? WHERE id = ?")
            .bind(index as i64 + 1)
            .bind(id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

#[tracing::instrument(skip(conn))]
pub async fn clear(conn: &mut SqliteConnection) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM queue_entries").execute(conn).await?;
    Ok(())
}

#[tracing::instrument(skip(conn))]
pub async fn contains_track(conn: &mut SqliteConnection, track_id: Uuid) -> sqlx::Result<bool> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM queue_entries WHERE track_id = ? LIMIT 1")
            .bind(track_id)
            .fetch_optional(conn)
            .await?;
    Ok(found.is_some())
}

/// Raw positions, for invariant checks.
pub async fn positions(conn: &mut SqliteConnection) -> sqlx::Result<Vec<i64>> {
    sqlx::query_scalar("SELECT position FROM queue_entries ORDER BY position ASC")
        .fetch_all(conn)
        .await
}
