//! Vote scheduler
//!
//! Each tick, inside one transaction:
//!
//! 1. An expired round is tallied and its winner appended to the queue.
//! 2. Otherwise a round may open when the playing track nears its end.
//! 3. A track that has played to its end is advanced, after step 1 so a
//!    freshly won vote plays next.

use erwin_protocol::timeline::remaining_secs;
use erwin_protocol::{AcquisitionStatus, PoolUpdate, QueueSource, QueueUpdate, ServerMessage, VoteOption};
use sqlx::SqliteConnection;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::error::JobResult;
use crate::config::{VoteConfig, MIN_VOTE_OPTIONS};
use crate::models::{pick_winner, sample_options, PoolItemRow, VoteRound};
use crate::repositories::{play_state, pool, queue, tracks, votes};
use crate::services::playback::advance;
use crate::state::AppContext;

const JOB_NAME: &str = "vote_scheduler";

/// What a tick did, for logging and tests
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub opened: Option<Uuid>,
    pub resolved: Option<Uuid>,
    pub winner: Option<Uuid>,
    pub advanced: bool,
}

pub struct VoteScheduler {
    ctx: AppContext,
    config: VoteConfig,
}

impl VoteScheduler {
    pub fn new(ctx: AppContext, config: VoteConfig) -> Self {
        Self { ctx, config }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(
            lead_secs = self.config.lead_time_secs,
            options = self.config.option_count,
            "Vote scheduler started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        e.log(JOB_NAME);
                    }
                }
            }
        }
        tracing::info!("Vote scheduler stopped");
    }

    pub async fn tick(&self) -> JobResult<TickReport> {
        let mut tx = self.ctx.db.begin().await?;
        let now_ms = self.ctx.now_ms();
        let mut report = TickReport::default();
        let mut events = Vec::new();

        match votes::unresolved_round(&mut tx).await? {
            Some(round) if round.has_expired(now_ms) => {
                let winner = self.resolve(&mut tx, &round, now_ms, &mut events).await?;
                report.resolved = Some(round.id);
                report.winner = winner;
            }
            Some(_) => {}
            None => {
                report.opened = self.maybe_open(&mut tx, now_ms, &mut events).await?;
            }
        }

        let state = play_state::get(&mut tx).await?;
        if let Some(track_id) = state.current_track_id.filter(|_| state.is_playing()) {
            let duration = tracks::find(&mut tx, track_id)
                .await?
                .and_then(|t| t.duration_sec);
            if remaining_secs(&state, duration, now_ms).is_some_and(|left| left <= 0.0) {
                let transition = advance(&mut tx, now_ms).await?;
                events.extend(transition.events);
                report.advanced = true;
            }
        }

        tx.commit().await?;
        for event in events {
            self.ctx.hub.publish(event);
        }
        Ok(report)
    }

    /// Tally an expired round, record the winner and queue it.
    async fn resolve(
        &self,
        conn: &mut SqliteConnection,
        round: &VoteRound,
        now_ms: i64,
        events: &mut Vec<ServerMessage>,
    ) -> JobResult<Option<Uuid>> {
        let options = round.options()?;
        let counts = votes::counts(conn, round.id, options.len()).await?;
        let winner = {
            let mut rng = rand::thread_rng();
            pick_winner(&counts, &mut rng)
        }
        .and_then(|index| options.get(index))
        .map(|option| option.track_id);

        let resolved = votes::resolve_round(conn, round.id, winner, now_ms).await?;
        events.push(ServerMessage::VoteEnd(resolved.payload(options, counts)));

        if let Some(track_id) = winner {
            let current = play_state::get(conn).await?.current_track_id;
            if current == Some(track_id) || queue::contains_track(conn, track_id).await? {
                tracing::info!(track_id = %track_id, "Vote winner already playing or queued");
            } else {
                queue::append(conn, track_id, QueueSource::Vote, self.ctx.clock.now()).await?;
                events.push(ServerMessage::QueueUpdate(QueueUpdate {
                    queue: queue::list(conn).await?,
                }));
            }
            if pool::remove_track(conn, track_id).await? {
                events.push(ServerMessage::PoolUpdate(PoolUpdate {
                    pool: pool::list(conn).await?,
                }));
            }
        }

        tracing::info!(round_id = %round.id, winner = ?winner, "Vote round resolved");
        Ok(winner)
    }

    async fn maybe_open(
        &self,
        conn: &mut SqliteConnection,
        now_ms: i64,
        events: &mut Vec<ServerMessage>,
    ) -> JobResult<Option<Uuid>> {
        let state = play_state::get(conn).await?;
        let Some(current) = state.current_track_id.filter(|_| state.is_playing()) else {
            return Ok(None);
        };
        let duration = tracks::find(conn, current).await?.and_then(|t| t.duration_sec);
        let Some(remaining) = remaining_secs(&state, duration, now_ms) else {
            return Ok(None);
        };
        if remaining <= 0.0 || remaining > self.config.lead_time_secs {
            return Ok(None);
        }

        // One round per play of a track
        if let Some(latest) = votes::latest_round(conn).await? {
            let play_began = play_state::play_started_at(conn).await?;
            let same_play = play_began.map_or(true, |began| latest.started_at_ms >= began);
            if latest.for_track_id == Some(current) && same_play {
                return Ok(None);
            }
        }

        let candidates = preferred_candidates(pool::vote_candidates(conn, Some(current)).await?);
        if candidates.len() < MIN_VOTE_OPTIONS {
            tracing::debug!(candidates = candidates.len(), "Not enough candidates for a vote");
            return Ok(None);
        }

        let options: Vec<VoteOption> = {
            let mut rng = rand::thread_rng();
            sample_options(&candidates, self.config.option_count, &mut rng)
        }
        .into_iter()
        .map(|row| VoteOption {
            track_id: row.track_id,
            label: row.label(),
        })
        .collect();

        let ends_at_ms = now_ms + self.config.round_duration.as_millis() as i64;
        let round = votes::insert_round(conn, Some(current), now_ms, ends_at_ms, &options).await?;
        let counts = vec![0; options.len()];
        events.push(ServerMessage::VoteStart(round.payload(options, counts)));

        tracing::info!(
            round_id = %round.id,
            for_track_id = %current,
            remaining_secs = remaining,
            "Vote round opened"
        );
        Ok(Some(round.id))
    }
}

/// Ready candidates when at least two are ready, otherwise all of them.
fn preferred_candidates(candidates: Vec<PoolItemRow>) -> Vec<PoolItemRow> {
    let ready: Vec<PoolItemRow> = candidates
        .iter()
        .filter(|c| c.acquisition_status == AcquisitionStatus::Ready)
        .cloned()
        .collect();
    if ready.len() >= MIN_VOTE_OPTIONS {
        ready
    } else {
        candidates
    }
}
