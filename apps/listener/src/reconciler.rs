//! Local playback reconciliation
//!
//! [`Reconciler`] mirrors the last state the server sent and, on every
//! tick, pulls the local media element toward the position that state
//! implies. It is a plain state machine: the driver feeds it server
//! messages and ticks, and sends back whatever messages a tick returns.
//!
//! Each tick runs in order:
//!
//! 1. drain media events, discarding load completions for superseded loads
//! 2. load the target source when its identity changed
//! 3. while a load is in flight, only watch its ready deadline
//! 4. seek when drift exceeds the tolerance for the source kind
//! 5. apply the paused/playing intent
//! 6. watch forward progress and escalate recovery on a stall

use std::sync::Arc;
use std::time::Duration;

use erwin_protocol::{
    timeline, ClientAdjust, ClientMessage, PlayState, PlayerEvent, PlayerHeartbeat,
    SessionSnapshot, StateUpdate, TrackInfo,
};
use url::Url;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::MediaError;
use crate::media::{LoadRequest, MediaElement, MediaEvent, MediaKind, MediaSource};
use crate::sync::{estimate_server_now, ClockSync, SnapshotClock};

/// Drift tolerated for audio streamed from the session server
pub const AUDIO_DRIFT_TOLERANCE_SECS: f64 = 1.2;
/// Drift tolerated for externally hosted video, which seeks coarsely
pub const EXTERNAL_DRIFT_TOLERANCE_SECS: f64 = 2.5;
/// Smallest advance of the local position that counts as progress
pub const PROGRESS_EPSILON_SECS: f64 = 0.3;
/// Positions this close to the end are never treated as stalled
const END_MARGIN_SECS: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    /// Base for relative asset urls
    pub server_url: Url,
    pub audio_tolerance_secs: f64,
    pub external_tolerance_secs: f64,
    pub stall_threshold: Duration,
    pub ready_timeout: Duration,
    /// Pause before retrying a load that failed or timed out
    pub load_retry_delay: Duration,
}

impl ReconcilerSettings {
    pub fn new(server_url: Url) -> Self {
        Self {
            server_url,
            audio_tolerance_secs: AUDIO_DRIFT_TOLERANCE_SECS,
            external_tolerance_secs: EXTERNAL_DRIFT_TOLERANCE_SECS,
            stall_threshold: Duration::from_millis(7_000),
            ready_timeout: Duration::from_secs(10),
            load_retry_delay: Duration::from_secs(2),
        }
    }

    fn tolerance_for(&self, kind: MediaKind) -> f64 {
        match kind {
            MediaKind::Audio => self.audio_tolerance_secs,
            MediaKind::ExternalVideo => self.external_tolerance_secs,
        }
    }
}

/// Result of applying an out-of-band correction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustOutcome {
    Applied,
    /// The correction refers to a state we have not seen; pull the full state
    NeedsFullState,
}

/// Diagnostic counters exposed to the driver and tests
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostics {
    pub recover_attempts: u32,
    pub last_error: Option<MediaError>,
    pub loads_started: u64,
    pub loaded_track_id: Option<Uuid>,
    pub load_pending: bool,
    pub offset_ms: f64,
}

#[derive(Debug, Clone)]
struct Mirror {
    play_state: PlayState,
    current_track: Option<TrackInfo>,
    clock: SnapshotClock,
}

#[derive(Debug, Clone, Copy)]
struct PendingLoad {
    id: u64,
    deadline_ms: i64,
}

/// Last position that counted as progress. A seek rebases `position`
/// without touching `at_ms`, so jumps never count as progress.
#[derive(Debug, Clone, Copy)]
struct ProgressMark {
    position: f64,
    at_ms: i64,
}

pub struct Reconciler<M: MediaElement> {
    media: M,
    clock: Arc<dyn Clock>,
    settings: ReconcilerSettings,
    sync: ClockSync,
    mirror: Option<Mirror>,
    loaded: Option<MediaSource>,
    pending: Option<PendingLoad>,
    next_load_id: u64,
    loads_started: u64,
    retry_load_at_ms: Option<i64>,
    force_resync: bool,
    progress: Option<ProgressMark>,
    recover_attempts: u32,
    last_error: Option<MediaError>,
    outbox: Vec<ClientMessage>,
}

impl<M: MediaElement> Reconciler<M> {
    pub fn new(media: M, clock: Arc<dyn Clock>, settings: ReconcilerSettings) -> Self {
        Self {
            media,
            clock,
            settings,
            sync: ClockSync::new(),
            mirror: None,
            loaded: None,
            pending: None,
            next_load_id: 0,
            loads_started: 0,
            retry_load_at_ms: None,
            force_resync: false,
            progress: None,
            recover_attempts: 0,
            last_error: None,
            outbox: Vec::new(),
        }
    }

    pub fn media(&self) -> &M {
        &self.media
    }

    pub fn media_mut(&mut self) -> &mut M {
        &mut self.media
    }

    pub fn clock_sync(&self) -> &ClockSync {
        &self.sync
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            recover_attempts: self.recover_attempts,
            last_error: self.last_error.clone(),
            loads_started: self.loads_started,
            loaded_track_id: self.loaded.as_ref().map(|s| s.track_id),
            load_pending: self.pending.is_some(),
            offset_ms: self.sync.offset_ms(),
        }
    }

    /// Replace the mirror with a pushed state update.
    pub fn apply_state(&mut self, update: StateUpdate) {
        self.set_mirror(update.play_state, update.current_track, update.server_now);
    }

    /// Replace the mirror with a pulled full state.
    pub fn apply_snapshot(&mut self, snapshot: SessionSnapshot) {
        self.set_mirror(
            snapshot.play_state,
            snapshot.current_track,
            snapshot.server_now,
        );
    }

    fn set_mirror(&mut self, play_state: PlayState, current_track: Option<TrackInfo>, server_now: i64) {
        let received_at_ms = self.clock.now_ms();
        tracing::debug!(
            track_id = ?play_state.current_track_id,
            paused = play_state.paused,
            server_now,
            "Applied session state"
        );
        self.mirror = Some(Mirror {
            play_state,
            current_track,
            clock: SnapshotClock {
                server_now_ms: server_now,
                received_at_ms,
            },
        });
        self.force_resync = true;
    }

    /// Apply a correction pushed by the server.
    pub fn apply_adjust(&mut self, adjust: ClientAdjust) -> AdjustOutcome {
        let Some(mirror) = &self.mirror else {
            return AdjustOutcome::NeedsFullState;
        };
        if adjust.target_track_id != mirror.play_state.current_track_id
            || adjust.should_be_paused != mirror.play_state.paused
        {
            return AdjustOutcome::NeedsFullState;
        }
        if self.pending.is_some() || self.loaded.is_none() {
            // The post-load resync lands on the same target
            return AdjustOutcome::Applied;
        }

        let now = self.clock.now_ms();
        self.seek_to(adjust.target_time.max(0.0), now);
        self.apply_intent(adjust.should_be_paused, now);
        AdjustOutcome::Applied
    }

    /// Fold a pong into the clock offset.
    pub fn observe_pong(&mut self, t0: i64, t1: i64) -> f64 {
        let t2 = self.clock.now_ms();
        let offset = self.sync.observe(t0, t1, t2);
        tracing::trace!(offset_ms = offset, rtt_ms = t2 - t0, "Clock offset updated");
        offset
    }

    pub fn ping(&self) -> ClientMessage {
        ClientMessage::TimeSyncPing {
            t0: self.clock.now_ms(),
        }
    }

    pub fn heartbeat(&self) -> ClientMessage {
        ClientMessage::PlayerHeartbeat(PlayerHeartbeat {
            track_id: self.loaded.as_ref().map(|s| s.track_id),
            current_time: self.media.current_time(),
            paused: self.media.is_paused(),
            ready_state: self.media.ready_state(),
            network_state: self.media.network_state(),
            buffered_end: self.media.buffered_end(),
            last_error: self.last_error.as_ref().map(|e| e.to_string()),
        })
    }

    /// Position the timeline implies right now, if anything should play.
    pub fn expected_position(&self) -> Option<f64> {
        let mirror = self.mirror.as_ref()?;
        mirror.play_state.current_track_id?;
        let now = self.clock.now_ms();
        let server_now = estimate_server_now(Some(&mirror.clock), &self.sync, now);
        let duration = mirror.current_track.as_ref().and_then(|t| t.duration_sec);
        Some(timeline::expected_position_secs(
            &mirror.play_state,
            duration,
            server_now,
        ))
    }

    /// Run one reconciliation step and return the messages to send.
    pub fn tick(&mut self) -> Vec<ClientMessage> {
        let now = self.clock.now_ms();
        self.handle_media_events(now);

        let Some(target) = self.target_source() else {
            if self.loaded.is_some() || self.pending.is_some() {
                tracing::debug!("Nothing to play, detaching source");
                self.media.unload();
                self.loaded = None;
                self.pending = None;
                self.progress = None;
            }
            return self.take_outbox();
        };

        if !self.is_loaded(&target) {
            self.begin_load(target, now);
            return self.take_outbox();
        }

        if let Some(pending) = self.pending {
            if now >= pending.deadline_ms {
                tracing::warn!(load_id = pending.id, "Media never became ready");
                self.record_error(MediaError::Source("ready timeout".to_string()));
                self.abandon_load(now);
            }
            return self.take_outbox();
        }

        let paused = self
            .mirror
            .as_ref()
            .map(|m| m.play_state.paused)
            .unwrap_or(true);

        if let Some(expected) = self.expected_position() {
            let drift = (self.media.current_time() - expected).abs();
            let tolerance = self.settings.tolerance_for(target.kind);
            if self.force_resync || drift > tolerance {
                tracing::debug!(drift, expected, forced = self.force_resync, "Resyncing");
                if self.seek_to(expected, now) {
                    self.force_resync = false;
                }
            }
        }

        self.apply_intent(paused, now);

        if paused {
            // Stall time only accrues while playing
            self.progress = None;
        } else {
            self.watch_progress(&target, now);
        }

        self.take_outbox()
    }

    fn target_source(&self) -> Option<MediaSource> {
        let mirror = self.mirror.as_ref()?;
        let track_id = mirror.play_state.current_track_id?;
        let track = mirror.current_track.as_ref().filter(|t| t.id == track_id)?;
        MediaSource::for_track(track, &self.settings.server_url)
    }

    fn is_loaded(&self, target: &MediaSource) -> bool {
        self.loaded
            .as_ref()
            .is_some_and(|s| s.track_id == target.track_id && s.url == target.url)
    }

    fn begin_load(&mut self, source: MediaSource, now: i64) {
        if self.retry_load_at_ms.is_some_and(|at| now < at) {
            return;
        }
        self.retry_load_at_ms = None;
        self.next_load_id += 1;
        self.loads_started += 1;
        let id = self.next_load_id;
        tracing::info!(
            load_id = id,
            track_id = %source.track_id,
            url = %source.url,
            "Loading media"
        );
        self.pending = Some(PendingLoad {
            id,
            deadline_ms: now + self.settings.ready_timeout.as_millis() as i64,
        });
        self.loaded = Some(source.clone());
        self.progress = None;
        self.media.load(LoadRequest { id, source });
    }

    /// Forget the in-flight load so a later tick starts a fresh one.
    fn abandon_load(&mut self, now: i64) {
        self.pending = None;
        self.loaded = None;
        self.retry_load_at_ms = Some(now + self.settings.load_retry_delay.as_millis() as i64);
    }

    fn handle_media_events(&mut self, now: i64) {
        for event in self.media.poll_events() {
            match event {
                MediaEvent::Loaded { load_id } => {
                    if self.pending.is_some_and(|p| p.id == load_id) {
                        tracing::debug!(load_id, "Media ready");
                        self.pending = None;
                        self.force_resync = true;
                        self.progress = None;
                    } else {
                        tracing::debug!(load_id, "Ignoring completion of superseded load");
                    }
                }
                MediaEvent::LoadFailed { load_id, error } => {
                    if self.pending.is_some_and(|p| p.id == load_id) {
                        tracing::warn!(load_id, error = %error, "Media failed to load");
                        self.record_error(error);
                        self.abandon_load(now);
                    }
                }
                MediaEvent::Playing => {
                    self.recover_attempts = 0;
                }
                MediaEvent::Stalled => {
                    tracing::debug!("Media reported a stall");
                }
                MediaEvent::Error(error) => {
                    tracing::warn!(error = %error, "Media error");
                    self.record_error(error);
                    let should_play = self
                        .mirror
                        .as_ref()
                        .is_some_and(|m| m.play_state.is_playing());
                    if should_play && self.pending.is_none() && self.loaded.is_some() {
                        self.recover("media-error", now);
                    }
                }
            }
        }
    }

    /// Seek and rebase the progress mark. Returns whether the seek landed.
    fn seek_to(&mut self, seconds: f64, now: i64) -> bool {
        match self.media.seek(seconds) {
            Ok(()) => {
                let at_ms = self.progress.map(|p| p.at_ms).unwrap_or(now);
                self.progress = Some(ProgressMark {
                    position: self.media.current_time(),
                    at_ms,
                });
                true
            }
            Err(e) if e.is_transient() => false,
            Err(e) => {
                self.record_error(e);
                false
            }
        }
    }

    fn apply_intent(&mut self, paused: bool, now: i64) {
        if paused {
            if !self.media.is_paused() {
                self.media.pause();
            }
            return;
        }
        if !self.media.is_paused() {
            return;
        }
        match self.media.play() {
            Ok(()) => {}
            Err(e) if e.is_transient() => {}
            Err(e) => {
                tracing::info!(error = %e, "Play rejected");
                self.record_error(e);
                self.recover("autoplay", now);
            }
        }
    }

    fn watch_progress(&mut self, target: &MediaSource, now: i64) {
        let position = self.media.current_time();
        let Some(mark) = self.progress else {
            self.progress = Some(ProgressMark { position, at_ms: now });
            return;
        };

        if position > mark.position + PROGRESS_EPSILON_SECS {
            self.progress = Some(ProgressMark { position, at_ms: now });
            self.recover_attempts = 0;
            return;
        }

        let near_end = target
            .duration_sec
            .is_some_and(|d| d > 0.0 && position >= d - END_MARGIN_SECS);
        let stalled_for = now - mark.at_ms;
        if !near_end && stalled_for > self.settings.stall_threshold.as_millis() as i64 {
            tracing::warn!(position, stalled_for_ms = stalled_for, "Playback stopped advancing");
            self.progress = Some(ProgressMark { position, at_ms: now });
            self.recover("stalled-progress", now);
        }
    }

    /// One rung of the recovery ladder: resume in place first, then reload.
    fn recover(&mut self, reason: &str, now: i64) {
        self.recover_attempts += 1;
        let attempt = self.recover_attempts;
        self.outbox.push(ClientMessage::PlayerEvent(PlayerEvent {
            event: "waiting".to_string(),
            details: serde_json::json!({
                "reason": reason,
                "attempt": attempt,
                "lastError": self.last_error.as_ref().map(MediaError::code),
            }),
        }));

        if attempt == 1 {
            match self.media.play() {
                Ok(()) => {
                    tracing::debug!(reason, "Resumed in place");
                    return;
                }
                Err(e) => self.record_error(e),
            }
        }
        self.hard_reload(reason, now);
    }

    fn hard_reload(&mut self, reason: &str, now: i64) {
        let Some(target) = self.target_source() else {
            return;
        };
        tracing::info!(
            reason,
            attempt = self.recover_attempts,
            track_id = %target.track_id,
            "Reloading media"
        );
        self.media.pause();
        self.media.unload();
        self.loaded = None;
        self.pending = None;
        self.retry_load_at_ms = None;
        self.begin_load(target, now);
    }

    fn record_error(&mut self, error: MediaError) {
        self.last_error = Some(error);
    }

    fn take_outbox(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.outbox)
    }
}
