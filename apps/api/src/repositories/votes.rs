//! Vote round and ballot persistence

use chrono::{DateTime, Utc};
use erwin_protocol::VoteOption;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::models::{tally, VoteRound};

const ROUND_COLUMNS: &str =
    "id, for_track_id, started_at_ms, ends_at_ms, options_json, winner_track_id, resolved_at_ms";

/// The unresolved round, if any. Expired rounds stay unresolved until the
/// scheduler tallies them.
#[tracing::instrument(skip(conn))]
pub async fn unresolved_round(conn: &mut SqliteConnection) -> sqlx::Result<Option<VoteRound>> {
    sqlx::query_as::<_, VoteRound>(&format!(
        r#"
        SELECT {ROUND_COLUMNS}
        FROM vote_rounds
        WHERE resolved_at_ms IS NULL
        ORDER BY started_at_ms DESC
        LIMIT 1
        "#
    ))
    .fetch_optional(conn)
    .await
}

/// Most recently opened round, resolved or not.
#[tracing::instrument(skip(conn))]
pub async fn latest_round(conn: &mut SqliteConnection) -> sqlx::Result<Option<VoteRound>> {
    sqlx::query_as::<_, VoteRound>(&format!(
        "SELECT {ROUND_COLUMNS} FROM vote_rounds ORDER BY started_at_ms DESC, rowid DESC LIMIT 1"
    ))
    .fetch_optional(conn)
    .await
}

#[tracing::instrument(skip(conn, options), fields(option_count = options.len()))]
pub async fn insert_round(
    conn: &mut SqliteConnection,
    for_track_id: Option<Uuid>,
    started_at_ms: i64,
    ends_at_ms: i64,
    options: &[VoteOption],
) -> sqlx::Result<VoteRound> {
    let options_json = serde_json::to_string(options)
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    sqlx::query_as::<_, VoteRound>(&format!(
        r#"
        INSERT INTO vote_rounds (id, for_track_id, started_at_ms, ends_at_ms, options_json)
        VALUES (?, ?, ?, ?, ?)
        RETURNING {ROUND_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(for_track_id)
    .bind(started_at_ms)
    .bind(ends_at_ms)
    .bind(options_json)
    .fetch_one(conn)
    .await
}

#[tracing::instrument(skip(conn))]
pub async fn resolve_round(
    conn: &mut SqliteConnection,
    round_id: Uuid,
    winner_track_id: Option<Uuid>,
    now_ms: i64,
) -> sqlx::Result<VoteRound> {
    sqlx::query_as::<_, VoteRound>(&format!(
        r#"
        UPDATE vote_rounds
        SET winner_track_id = ?, resolved_at_ms = ?
        WHERE id = ?
        RETURNING {ROUND_COLUMNS}
        "#
    ))
    .bind(winner_track_id)
    .bind(now_ms)
    .bind(round_id)
    .fetch_one(conn)
    .await
}

/// Record a ballot; a voter's later ballot replaces the earlier one.
#[tracing::instrument(skip(conn))]
pub async fn upsert_vote(
    conn: &mut SqliteConnection,
    round_id: Uuid,
    voter_id: &str,
    option_index: i64,
    now: DateTime<Utc>,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO votes (round_id, voter_id, option_index, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (round_id, voter_id)
        DO UPDATE SET option_index = excluded.option_index, updated_at = excluded.updated_at
        "#,
    )
    .bind(round_id)
    .bind(voter_id)
    .bind(option_index)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

/// Votes per option for a round.
#[tracing::instrument(skip(conn))]
pub async fn counts(
    conn: &mut SqliteConnection,
    round_id: Uuid,
    option_count: usize,
) -> sqlx::Result<Vec<u32>> {
    let indices: Vec<i64> = sqlx::query_scalar("SELECT option_index FROM votes WHERE round_id = ?")
        .bind(round_id)
        .fetch_all(conn)
        .await?;
    Ok(tally(option_count, &indices))
}
