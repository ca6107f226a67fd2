//! Authoritative playback state machine
//!
//! All timeline mutations pass through [`PlaybackService`]. Each one reads
//! the current record inside its own transaction, computes the next value
//! with the pure [`PlayState`] transitions, writes it back, and broadcasts
//! a `STATE_UPDATE` after commit.

use erwin_protocol::{
    PlayState, PoolUpdate, QueueUpdate, ServerMessage, SessionSnapshot, StateUpdate,
};
use rand::seq::SliceRandom;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::repositories::{play_state, playlists, pool, queue, tracks};
use crate::state::AppContext;

/// Result of a committed transition: the new canonical state plus every
/// event to publish for it.
#[derive(Debug)]
pub struct Transition {
    pub update: StateUpdate,
    pub events: Vec<ServerMessage>,
}

impl Transition {
    pub fn publish(self, ctx: &AppContext) -> StateUpdate {
        for event in self.events {
            ctx.hub.publish(event);
        }
        self.update
    }
}

#[derive(Clone)]
pub struct PlaybackService {
    ctx: AppContext,
}

impl PlaybackService {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Start a track from zero, or go idle with `None`.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self, track_id: Option<Uuid>) -> ApiResult<StateUpdate> {
        let mut tx = self.ctx.db.begin().await?;
        let now_ms = self.ctx.now_ms();

        let mut events = Vec::new();
        if let Some(id) = track_id {
            tracks::find(&mut tx, id)
                .await?
                .ok_or_else(|| ApiError::not_found("track", id))?;
            if pool::remove_track(&mut tx, id).await? {
                events.push(pool_update(&mut tx).await?);
            }
        }

        let next = PlayState::started(track_id, now_ms);
        play_state::begin_play(&mut tx, &next).await?;
        let update = state_update(&mut tx, next, now_ms, false).await?;
        tx.commit().await?;

        tracing::info!(track_id = ?track_id, "Playback started");
        events.insert(0, ServerMessage::StateUpdate(update.clone()));
        Ok(Transition { update, events }.publish(&self.ctx))
    }

    #[tracing::instrument(skip(self))]
    pub async fn pause(&self) -> ApiResult<StateUpdate> {
        self.apply(|state, now| Ok(state.paused_at(now))).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn resume(&self) -> ApiResult<StateUpdate> {
        self.apply(|state, now| Ok(state.resumed(now))).await
    }

    /// Move the playhead. Non-finite targets and an idle session are
    /// rejected without touching the store.
    #[tracing::instrument(skip(self))]
    pub async fn seek(&self, position_seconds: f64) -> ApiResult<StateUpdate> {
        if !position_seconds.is_finite() {
            return Err(ApiError::ValidationError(
                "positionSeconds must be a finite number".to_string(),
            ));
        }
        self.apply(|state, now| {
            state
                .seeked(position_seconds, now)
                .ok_or(ApiError::NoActiveTrack)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn stop(&self) -> ApiResult<StateUpdate> {
        self.apply(|_, now| Ok(PlayState::stopped(now))).await
    }

    /// Play the queue head, else a random pool draw, else stop.
    #[tracing::instrument(skip(self))]
    pub async fn skip(&self) -> ApiResult<StateUpdate> {
        let mut tx = self.ctx.db.begin().await?;
        let transition = advance(&mut tx, self.ctx.now_ms()).await?;
        tx.commit().await?;
        Ok(transition.publish(&self.ctx))
    }

    /// Seed the session from a playlist: shuffle its playable members, play
    /// the first immediately and pool the rest. Queue and pool are replaced.
    #[tracing::instrument(skip(self))]
    pub async fn play_playlist(&self, playlist_id: Uuid) -> ApiResult<StateUpdate> {
        let mut tx = self.ctx.db.begin().await?;
        if !playlists::exists(&mut tx, playlist_id).await? {
            return Err(ApiError::not_found("playlist", playlist_id));
        }

        let mut track_ids = playlists::playable_track_ids(&mut tx, playlist_id).await?;
        if track_ids.is_empty() {
            return Err(ApiError::ValidationError(
                "playlist has no playable tracks".to_string(),
            ));
        }
        {
            let mut rng = rand::thread_rng();
            track_ids.shuffle(&mut rng);
        }

        let now_ms = self.ctx.now_ms();
        let now = self.ctx.clock.now();
        queue::clear(&mut tx).await?;
        pool::clear(&mut tx).await?;
        for id in &track_ids[1..] {
            pool::insert(&mut tx, *id, now).await?;
        }

        let next = PlayState::started(Some(track_ids[0]), now_ms);
        play_state::begin_play(&mut tx, &next).await?;
        let update = state_update(&mut tx, next, now_ms, true).await?;
        let events = vec![
            ServerMessage::StateUpdate(update.clone()),
            ServerMessage::QueueUpdate(QueueUpdate { queue: Vec::new() }),
            pool_update(&mut tx).await?,
        ];
        tx.commit().await?;

        tracing::info!(
            playlist_id = %playlist_id,
            pooled = track_ids.len() - 1,
            "Session seeded from playlist"
        );
        Ok(Transition { update, events }.publish(&self.ctx))
    }

    /// Everything a listener needs to resynchronize.
    #[tracing::instrument(skip(self))]
    pub async fn snapshot(&self) -> ApiResult<SessionSnapshot> {
        let mut conn = self.ctx.db.acquire().await?;
        let play_state = play_state::get(&mut conn).await?;
        let current_track = match play_state.current_track_id {
            Some(id) => tracks::find(&mut conn, id).await?.map(|t| t.info()),
            None => None,
        };
        Ok(SessionSnapshot {
            play_state,
            current_track,
            queue: queue::list(&mut conn).await?,
            pool: pool::list(&mut conn).await?,
            server_now: self.ctx.now_ms(),
        })
    }

    /// Read-transform-write for transitions that only touch the record.
    async fn apply<F>(&self, transition: F) -> ApiResult<StateUpdate>
    where
        F: FnOnce(PlayState, i64) -> ApiResult<PlayState>,
    {
        let mut tx = self.ctx.db.begin().await?;
        let now_ms = self.ctx.now_ms();
        let current = play_state::get(&mut tx).await?;
        let next = transition(current, now_ms)?;
        if next != current {
            play_state::save(&mut tx, &next).await?;
        }
        let update = state_update(&mut tx, next, now_ms, false).await?;
        tx.commit().await?;

        let events = vec![ServerMessage::StateUpdate(update.clone())];
        Ok(Transition { update, events }.publish(&self.ctx))
    }
}

/// Advance to the next track inside the caller's transaction.
///
/// Pops the queue head if there is one, otherwise draws one pool entry
/// uniformly at random and removes it, otherwise stops. Acquired entries
/// are drawn before ones still being acquired.
pub async fn advance(conn: &mut SqliteConnection, now_ms: i64) -> sqlx::Result<Transition> {
    let mut events = Vec::new();

    let next_track = match queue::head(conn).await? {
        Some(entry) => {
            queue::delete(conn, entry.id).await?;
            events.push(ServerMessage::QueueUpdate(QueueUpdate {
                queue: queue::list(conn).await?,
            }));
            Some(entry.track_id)
        }
        None => {
            let mut candidates = pool::drawable(conn, true).await?;
            if candidates.is_empty() {
                candidates = pool::drawable(conn, false).await?;
                if !candidates.is_empty() {
                    tracing::info!(
                        count = candidates.len(),
                        "No acquired pool entries, drawing one still being acquired"
                    );
                }
            }
            let drawn = {
                let mut rng = rand::thread_rng();
                candidates.choose(&mut rng).map(|entry| entry.track_id)
            };
            if let Some(track_id) = drawn {
                pool::remove_track(conn, track_id).await?;
                events.push(pool_update(conn).await?);
            }
            drawn
        }
    };

    let next = match next_track {
        Some(id) => PlayState::started(Some(id), now_ms),
        None => PlayState::stopped(now_ms),
    };
    play_state::begin_play(conn, &next).await?;

    let update = state_update(conn, next, now_ms, true).await?;
    events.insert(0, ServerMessage::StateUpdate(update.clone()));
    tracing::info!(track_id = ?next_track, "Advanced to next track");
    Ok(Transition { update, events })
}

/// Build a STATE_UPDATE for `state`, optionally carrying the queue.
pub async fn state_update(
    conn: &mut SqliteConnection,
    state: PlayState,
    now_ms: i64,
    include_queue: bool,
) -> sqlx::Result<StateUpdate> {
    let current_track = match state.current_track_id {
        Some(id) => tracks::find(conn, id).await?.map(|t| t.info()),
        None => None,
    };
    let queue = if include_queue {
        Some(queue::list(conn).await?)
    } else {
        None
    };
    Ok(StateUpdate {
        play_state: state,
        current_track,
        server_now: now_ms,
        queue,
    })
}

pub async fn pool_update(conn: &mut SqliteConnection) -> sqlx::Result<ServerMessage> {
    Ok(ServerMessage::PoolUpdate(PoolUpdate {
        pool: pool::list(conn).await?,
    }))
}
