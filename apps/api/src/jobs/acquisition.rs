//! Acquisition pipeline
//!
//! Polls for the oldest due job, fetches its track with the configured
//! [`AcquisitionTool`] and applies the outcome to every outstanding job for
//! that track. One fetch runs at a time; the fetch itself happens outside
//! any transaction so the store stays available to other writers.

use std::sync::Arc;

use erwin_protocol::{AcquisitionStatus, JobStatus, ServerMessage};
use sqlx::SqliteConnection;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::error::{JobError, JobResult};
use crate::config::AcquisitionConfig;
use crate::models::{retry_delay, AcquisitionJob};
use crate::repositories::{acquisition, play_state, playlists, pool, queue, tracks};
use crate::services::playback::pool_update;
use crate::services::{AcquisitionOutcome, AcquisitionRequest, AcquisitionTool};
use crate::state::AppContext;

const JOB_NAME: &str = "acquisition";

/// What a single poll did
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Idle,
    /// Track was already acquired; jobs promoted without fetching
    AlreadyReady { track_id: Uuid },
    Fetched {
        track_id: Uuid,
        outcome: AcquisitionOutcome,
    },
}

pub struct AcquisitionPipeline<T> {
    ctx: AppContext,
    tool: Arc<T>,
    config: AcquisitionConfig,
}

impl<T: AcquisitionTool> AcquisitionPipeline<T> {
    pub fn new(ctx: AppContext, tool: Arc<T>, config: AcquisitionConfig) -> Self {
        Self { ctx, tool, config }
    }

    /// Poll until cancelled. Jobs interrupted by a previous shutdown are
    /// put back to pending first.
    pub async fn run(self, shutdown: CancellationToken) {
        match self.recover().await {
            Ok(0) => {}
            Ok(count) => tracing::info!(count, "Requeued interrupted acquisition jobs"),
            Err(e) => e.log(JOB_NAME),
        }

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            poll_secs = self.config.poll_interval.as_secs(),
            "Acquisition pipeline started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.poll().await {
                        e.log(JOB_NAME);
                    }
                }
            }
        }
        tracing::info!("Acquisition pipeline stopped");
    }

    pub async fn recover(&self) -> JobResult<u64> {
        let mut conn = self.ctx.db.acquire().await?;
        Ok(acquisition::requeue_interrupted(&mut conn, self.ctx.clock.now()).await?)
    }

    /// Process at most one due job.
    pub async fn poll(&self) -> JobResult<PollOutcome> {
        let mut tx = self.ctx.db.begin().await?;
        let Some(job) = acquisition::next_due(&mut tx, self.ctx.now_ms()).await? else {
            return Ok(PollOutcome::Idle);
        };
        let track = tracks::find(&mut tx, job.track_id)
            .await?
            .ok_or_else(|| JobError::NotFound(format!("track {}", job.track_id)))?;

        if track.is_ready() {
            let events = promote(&mut tx, track.id, &self.ctx).await?;
            tx.commit().await?;
            tracing::info!(job_id = %job.id, track_id = %track.id, "Track already acquired");
            self.publish(events);
            return Ok(PollOutcome::AlreadyReady { track_id: track.id });
        }

        let claimed = acquisition::claim(&mut tx, &job, self.ctx.clock.now()).await?;
        tracks::set_status(&mut tx, track.id, AcquisitionStatus::Downloading, None).await?;
        tx.commit().await?;
        self.ctx
            .hub
            .publish(ServerMessage::DownloadUpdate(claimed.to_update()));

        let request = AcquisitionRequest {
            track_id: track.id,
            source_ref: track.source_ref.clone(),
            source_url: track.source_url.clone(),
        };
        let outcome = self.tool.acquire(&request).await;

        let events = match self.store_outcome(&claimed, &outcome).await {
            Ok(events) => events,
            Err(e) => {
                self.release(&claimed, &e).await;
                return Err(e);
            }
        };
        self.publish(events);

        Ok(PollOutcome::Fetched {
            track_id: track.id,
            outcome,
        })
    }

    async fn store_outcome(
        &self,
        claimed: &AcquisitionJob,
        outcome: &AcquisitionOutcome,
    ) -> JobResult<Vec<ServerMessage>> {
        let mut tx = self.ctx.db.begin().await?;
        let events = self.apply(&mut tx, claimed, outcome).await?;
        tx.commit().await?;
        Ok(events)
    }

    /// Put a claimed job and its waiting siblings back on the retry path
    /// after its outcome could not be stored.
    async fn release(&self, claimed: &AcquisitionJob, error: &JobError) {
        let fallback = AcquisitionOutcome::TransientFailure {
            reason: format!("could not store outcome: {error}"),
            retry_hint: None,
        };
        match self.store_outcome(claimed, &fallback).await {
            Ok(events) => self.publish(events),
            Err(e) => {
                tracing::error!(
                    job_id = %claimed.id,
                    error = %e,
                    "Could not release claimed job, it stays downloading until restart"
                );
            }
        }
    }

    async fn apply(
        &self,
        conn: &mut SqliteConnection,
        claimed: &AcquisitionJob,
        outcome: &AcquisitionOutcome,
    ) -> JobResult<Vec<ServerMessage>> {
        let track_id = claimed.track_id;
        let now = self.ctx.clock.now();

        match outcome {
            AcquisitionOutcome::Ready(asset) => {
                tracks::mark_acquired(conn, track_id, &asset.metadata, &asset.asset_path, now)
                    .await?;
                tracing::info!(track_id = %track_id, asset = %asset.asset_path, "Acquisition ready");
                promote(conn, track_id, &self.ctx).await
            }
            AcquisitionOutcome::TransientFailure { reason, retry_hint } => {
                let delay = retry_delay(
                    claimed.attempts,
                    *retry_hint,
                    self.config.backoff_base,
                    self.config.backoff_max,
                );
                let retry_after_ms = self.ctx.now_ms() + delay.as_millis() as i64;
                tracks::set_status(conn, track_id, AcquisitionStatus::Failed, Some(reason.as_str())).await?;
                let jobs = acquisition::resolve_track(
                    conn,
                    track_id,
                    JobStatus::Failed,
                    Some(retry_after_ms),
                    Some(reason.as_str()),
                    now,
                )
                .await?;
                tracing::warn!(
                    track_id = %track_id,
                    attempts = claimed.attempts,
                    retry_in_secs = delay.as_secs(),
                    error = %reason,
                    "Acquisition failed, will retry"
                );
                Ok(download_updates(&jobs))
            }
            AcquisitionOutcome::TerminalFailure { reason } => {
                tracks::set_status(conn, track_id, AcquisitionStatus::Blocked, Some(reason.as_str())).await?;
                let jobs = acquisition::resolve_track(
                    conn,
                    track_id,
                    JobStatus::Blocked,
                    None,
                    Some(reason.as_str()),
                    now,
                )
                .await?;
                tracing::error!(
                    track_id = %track_id,
                    error = %reason,
                    "Acquisition blocked. Set ERWIN_YTDL_COOKIE_FILE or ERWIN_YTDL_COOKIE to enable authenticated downloads"
                );
                Ok(download_updates(&jobs))
            }
        }
    }

    fn publish(&self, events: Vec<ServerMessage>) {
        for event in events {
            self.ctx.hub.publish(event);
        }
    }
}

/// Mark every outstanding job for an acquired track ready, deliver the
/// track to each job's playlist once, and make it pool-eligible unless it
/// is already playing or queued.
async fn promote(
    conn: &mut SqliteConnection,
    track_id: Uuid,
    ctx: &AppContext,
) -> JobResult<Vec<ServerMessage>> {
    let now = ctx.clock.now();
    let jobs =
        acquisition::resolve_track(conn, track_id, JobStatus::Ready, None, None, now).await?;

    for playlist_id in jobs.iter().filter_map(|job| job.playlist_id) {
        if playlists::add_track(conn, playlist_id, track_id, now).await? {
            tracing::debug!(playlist_id = %playlist_id, track_id = %track_id, "Added to playlist");
        }
    }

    let mut events = download_updates(&jobs);
    let current = play_state::get(conn).await?.current_track_id;
    if current != Some(track_id)
        && !queue::contains_track(conn, track_id).await?
        && pool::insert(conn, track_id, now).await?
    {
        events.push(pool_update(conn).await?);
    }
    Ok(events)
}

fn download_updates(jobs: &[AcquisitionJob]) -> Vec<ServerMessage> {
    jobs.iter()
        .map(|job| ServerMessage::DownloadUpdate(job.to_update()))
        .collect()
}
