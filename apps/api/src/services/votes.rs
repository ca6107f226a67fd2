//! Ballot casting and round inspection
//!
//! Rounds are opened and resolved by the vote scheduler job; this service
//! only reads them and records ballots.

use erwin_protocol::{ServerMessage, VoteRoundPayload};
use sqlx::SqliteConnection;

use crate::error::{ApiError, ApiResult};
use crate::models::VoteRound;
use crate::repositories::votes;
use crate::state::AppContext;

#[derive(Clone)]
pub struct VoteService {
    ctx: AppContext,
}

impl VoteService {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// The unresolved round with live counts, if any.
    pub async fn current(&self) -> ApiResult<Option<VoteRoundPayload>> {
        let mut conn = self.ctx.db.acquire().await?;
        match votes::unresolved_round(&mut conn).await? {
            Some(round) => Ok(Some(round_payload(&mut conn, &round).await?)),
            None => Ok(None),
        }
    }

    /// Record or replace a voter's ballot in the open round.
    #[tracing::instrument(skip(self))]
    pub async fn cast(&self, voter_id: &str, option_index: usize) -> ApiResult<VoteRoundPayload> {
        let voter_id = voter_id.trim();
        if voter_id.is_empty() {
            return Err(ApiError::ValidationError("voterId is required".to_string()));
        }

        let mut tx = self.ctx.db.begin().await?;
        let now_ms = self.ctx.now_ms();
        let round = votes::unresolved_round(&mut tx)
            .await?
            .filter(|round| round.is_open(now_ms))
            .ok_or(ApiError::NoActiveVoteRound)?;

        let options = round.options()?;
        if option_index >= options.len() {
            return Err(ApiError::ValidationError(format!(
                "optionIndex must be between 0 and {}",
                options.len().saturating_sub(1)
            )));
        }

        votes::upsert_vote(
            &mut tx,
            round.id,
            voter_id,
            option_index as i64,
            self.ctx.clock.now(),
        )
        .await?;
        let counts = votes::counts(&mut tx, round.id, options.len()).await?;
        let payload = round.payload(options, counts);
        tx.commit().await?;

        tracing::debug!(round_id = %round.id, voter_id, option_index, "Vote recorded");
        self.ctx.hub.publish(ServerMessage::VoteUpdate(payload.clone()));
        Ok(payload)
    }
}

pub async fn round_payload(
    conn: &mut SqliteConnection,
    round: &VoteRound,
) -> ApiResult<VoteRoundPayload> {
    let options = round.options()?;
    let counts = votes::counts(conn, round.id, options.len()).await?;
    Ok(round.payload(options, counts))
}
