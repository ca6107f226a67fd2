//! Acquisition job persistence

use chrono::{DateTime, Utc};
use erwin_protocol::JobStatus;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::models::AcquisitionJob;

const JOB_COLUMNS: &str = r#"
    id, track_id, playlist_id, status, attempts, retry_after_ms, error, created_at, updated_at
"#;

/// Default page size for job listings
pub const DEFAULT_LIST_LIMIT: i64 = 200;

#[tracing::instrument(skip(conn))]
pub async fn insert(
    conn: &mut SqliteConnection,
    track_id: Uuid,
    playlist_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> sqlx::Result<AcquisitionJob> {
    sqlx::query_as::<_, AcquisitionJob>(&format!(
        r#"
        INSERT INTO acquisition_jobs (id, track_id, playlist_id, status, attempts, created_at, updated_at)
        VALUES (?, ?, ?, 'pending', 0, ?, ?)
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(track_id)
    .bind(playlist_id)
    .bind(now)
    .bind(now)
    .fetch_one(conn)
    .await
}

#[tracing::instrument(skip(conn))]
pub async fn find(conn: &mut SqliteConnection, id: Uuid) -> sqlx::Result<Option<AcquisitionJob>> {
    sqlx::query_as::<_, AcquisitionJob>(&format!(
        "SELECT {JOB_COLUMNS} FROM acquisition_jobs WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await
}

/// Oldest pending or failed job whose retry time has passed.
#[tracing::instrument(skip(conn))]
pub async fn next_due(
    conn: &mut SqliteConnection,
    now_ms: i64,
) -> sqlx::Result<Option<AcquisitionJob>> {
    sqlx::query_as::<_, AcquisitionJob>(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM acquisition_jobs
        WHERE status IN ('pending', 'failed')
          AND (retry_after_ms IS NULL OR retry_after_ms <= ?)
        ORDER BY created_at ASC, rowid ASC
        LIMIT 1
        "#
    ))
    .bind(now_ms)
    .fetch_optional(conn)
    .await
}

/// Claim a job for fetching and count the attempt. Other waiting-to-run
/// jobs for the same track are parked as `waiting` so they are not
/// fetched a second time.
#[tracing::instrument(skip(conn))]
pub async fn claim(
    conn: &mut SqliteConnection,
    job: &AcquisitionJob,
    now: DateTime<Utc>,
) -> sqlx::Result<AcquisitionJob> {
    let claimed = sqlx::query_as::<_, AcquisitionJob>(&format!(
        r#"
        UPDATE acquisition_jobs
        SET status = 'downloading', attempts = attempts + 1, error = NULL, updated_at = ?
        WHERE id = ?
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(now)
    .bind(job.id)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        UPDATE acquisition_jobs
        SET status = 'waiting', updated_at = ?
        WHERE track_id = ? AND id != ? AND status IN ('pending', 'failed')
        "#,
    )
    .bind(now)
    .bind(job.track_id)
    .bind(job.id)
    .execute(conn)
    .await?;

    Ok(claimed)
}

/// Apply one outcome to every outstanding job for a track and return the
/// updated jobs.
#[tracing::instrument(skip(conn))]
pub async fn resolve_track(
    conn: &mut SqliteConnection,
    track_id: Uuid,
    status: JobStatus,
    retry_after_ms: Option<i64>,
    error: Option<&str>,
    now: DateTime<Utc>,
) -> sqlx::Result<Vec<AcquisitionJob>> {
    sqlx::query_as::<_, AcquisitionJob>(&format!(
        r#"
        UPDATE acquisition_jobs
        SET status = ?, retry_after_ms = ?, error = ?, updated_at = ?
        WHERE track_id = ? AND status IN ('pending', 'waiting', 'downloading', 'failed')
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(status)
    .bind(retry_after_ms)
    .bind(error)
    .bind(now)
    .bind(track_id)
    .fetch_all(conn)
    .await
}

/// Most recent jobs first.
#[tracing::instrument(skip(conn))]
pub async fn list(conn: &mut SqliteConnection, limit: i64) -> sqlx::Result<Vec<AcquisitionJob>> {
    sqlx::query_as::<_, AcquisitionJob>(&format!(
        "SELECT {JOB_COLUMNS} FROM acquisition_jobs ORDER BY created_at DESC, rowid DESC LIMIT ?"
    ))
    .bind(limit)
    .fetch_all(conn)
    .await
}

/// Delete jobs that reached a final or failed state. Returns the count.
#[tracing::instrument(skip(conn))]
pub async fn clear_finished(conn: &mut SqliteConnection) -> sqlx::Result<u64> {
    let result =
        sqlx::query("DELETE FROM acquisition_jobs WHERE status IN ('ready', 'failed', 'blocked')")
            .execute(conn)
            .await?;
    Ok(result.rows_affected())
}

/// Jobs that were mid-fetch when the process stopped go back to pending.
#[tracing::instrument(skip(conn))]
pub async fn requeue_interrupted(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE acquisition_jobs
        SET status = 'pending', updated_at = ?
        WHERE status IN ('downloading', 'waiting')
        "#,
    )
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}
