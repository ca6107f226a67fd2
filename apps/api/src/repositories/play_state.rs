//! Singleton playback record

use erwin_protocol::PlayState;
use sqlx::SqliteConnection;

use crate::models::PlayStateRow;

/// Read the current record.
#[tracing::instrument(skip(conn))]
pub async fn get(conn: &mut SqliteConnection) -> sqlx::Result<PlayState> {
    let row = sqlx::query_as::<_, PlayStateRow>(
        r#"
        SELECT current_track_id, started_at_ms, paused_at_ms, paused, updated_at_ms
        FROM play_state
        WHERE id = 1
        "#,
    )
    .fetch_one(conn)
    .await?;

    Ok(row.into())
}

/// Overwrite the record. The table's CHECK constraints reject states that
/// break the track/start and pause invariants.
#[tracing::instrument(skip(conn))]
pub async fn save(conn: &mut SqliteConnection, state: &PlayState) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        UPDATE play_state
        SET current_track_id = ?, started_at_ms = ?, paused_at_ms = ?, paused = ?, updated_at_ms = ?
        WHERE id = 1
        "#,
    )
    .bind(state.current_track_id)
    .bind(state.started_at_ms)
    .bind(state.paused_at_ms)
    .bind(state.paused)
    .bind(state.updated_at_ms)
    .execute(conn)
    .await?;

    Ok(())
}

/// Save a state that begins a new play (or goes idle) and stamp when that
/// play began.
#[tracing::instrument(skip(conn))]
pub async fn begin_play(conn: &mut SqliteConnection, state: &PlayState) -> sqlx::Result<()> {
    save(&mut *conn, state).await?;
    sqlx::query("UPDATE play_state SET play_started_at_ms = ? WHERE id = 1")
        .bind(state.current_track_id.map(|_| state.updated_at_ms))
        .execute(conn)
        .await?;
    Ok(())
}

/// When the current play began, if anything is playing.
pub async fn play_started_at(conn: &mut SqliteConnection) -> sqlx::Result<Option<i64>> {
    sqlx::query_scalar("SELECT play_started_at_ms FROM play_state WHERE id = 1")
        .fetch_one(conn)
        .await
}
