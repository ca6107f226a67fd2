//! Media elements the reconciler drives
//!
//! Loading is asynchronous: [`MediaElement::load`] only starts it, and the
//! outcome arrives later through [`MediaElement::poll_events`] tagged with
//! the load id it answers. Everything else is immediate.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use erwin_protocol::TrackInfo;
use url::Url;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::MediaError;

/// `HTMLMediaElement.readyState` values reported in heartbeats
pub const HAVE_NOTHING: u8 = 0;
pub const HAVE_ENOUGH_DATA: u8 = 4;

/// `HTMLMediaElement.networkState` values reported in heartbeats
pub const NETWORK_IDLE: u8 = 1;
pub const NETWORK_LOADING: u8 = 2;
pub const NETWORK_NO_SOURCE: u8 = 3;

/// How the asset is delivered, which decides how precisely it can seek
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Streamed from the session server's audio route
    Audio,
    /// Played from the original host before a local asset exists
    ExternalVideo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaSource {
    pub track_id: Uuid,
    pub url: Url,
    pub kind: MediaKind,
    pub duration_sec: Option<f64>,
}

impl MediaSource {
    /// Where to play `track` from. Disabled tracks have no source.
    pub fn for_track(track: &TrackInfo, server_url: &Url) -> Option<Self> {
        if track.disabled {
            return None;
        }
        let (url, kind) = match &track.asset_url {
            Some(path) => (server_url.join(path).ok()?, MediaKind::Audio),
            None => (
                Url::parse(&format!(
                    "https://www.youtube.com/watch?v={}",
                    track.source_ref
                ))
                .ok()?,
                MediaKind::ExternalVideo,
            ),
        };
        Some(Self {
            track_id: track.id,
            url,
            kind,
            duration_sec: track.duration_sec,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub id: u64,
    pub source: MediaSource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    Loaded { load_id: u64 },
    LoadFailed { load_id: u64, error: MediaError },
    Playing,
    Stalled,
    Error(MediaError),
}

pub trait MediaElement: Send {
    /// Drop the current source and start loading another.
    fn load(&mut self, request: LoadRequest);
    /// Detach the source entirely.
    fn unload(&mut self);
    fn current_time(&self) -> f64;
    fn is_paused(&self) -> bool;
    fn ready_state(&self) -> u8;
    fn network_state(&self) -> u8;
    fn buffered_end(&self) -> Option<f64>;
    fn seek(&mut self, seconds: f64) -> Result<(), MediaError>;
    fn play(&mut self) -> Result<(), MediaError>;
    fn pause(&mut self);
    /// Events since the last call, oldest first.
    fn poll_events(&mut self) -> Vec<MediaEvent>;
}

/// A media element with no audio output.
///
/// Position advances with the clock while playing, so a headless listener
/// exercises the same drift and stall handling as a real player. A few
/// knobs simulate the failures real players run into.
pub struct VirtualPlayhead {
    clock: Arc<dyn Clock>,
    source: Option<MediaSource>,
    pending: Option<(u64, i64)>,
    ready: bool,
    playing: bool,
    anchor_position: f64,
    anchor_at_ms: i64,
    load_latency: Duration,
    blocked_plays: u32,
    frozen: bool,
    failing_load: Option<String>,
    events: VecDeque<MediaEvent>,
}

impl VirtualPlayhead {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_ms();
        Self {
            clock,
            source: None,
            pending: None,
            ready: false,
            playing: false,
            anchor_position: 0.0,
            anchor_at_ms: now,
            load_latency: Duration::ZERO,
            blocked_plays: 0,
            frozen: false,
            failing_load: None,
            events: VecDeque::new(),
        }
    }

    /// Loads complete this long after they start.
    pub fn with_load_latency(mut self, latency: Duration) -> Self {
        self.load_latency = latency;
        self
    }

    /// Refuse the next `count` play calls as a playback-policy rejection.
    pub fn block_next_plays(&mut self, count: u32) {
        self.blocked_plays = count;
    }

    /// Stop or restart the position advancing while nominally playing.
    pub fn set_frozen(&mut self, frozen: bool) {
        self.anchor_position = self.current_time();
        self.anchor_at_ms = self.clock.now_ms();
        if frozen && !self.frozen && self.playing {
            self.events.push_back(MediaEvent::Stalled);
        }
        self.frozen = frozen;
    }

    /// Make the next load fail with `reason`.
    pub fn fail_next_load(&mut self, reason: impl Into<String>) {
        self.failing_load = Some(reason.into());
    }

    pub fn source(&self) -> Option<&MediaSource> {
        self.source.as_ref()
    }

    fn reanchor(&mut self, position: f64) {
        self.anchor_position = position;
        self.anchor_at_ms = self.clock.now_ms();
    }

    fn duration(&self) -> Option<f64> {
        self.source
            .as_ref()
            .and_then(|s| s.duration_sec)
            .filter(|d| *d > 0.0)
    }
}

impl MediaElement for VirtualPlayhead {
    fn load(&mut self, request: LoadRequest) {
        let ready_at = self.clock.now_ms() + self.load_latency.as_millis() as i64;
        self.source = Some(request.source);
        self.pending = Some((request.id, ready_at));
        self.ready = false;
        self.playing = false;
        self.frozen = false;
        self.reanchor(0.0);
    }

    fn unload(&mut self) {
        self.source = None;
        self.pending = None;
        self.ready = false;
        self.playing = false;
        self.reanchor(0.0);
    }

    fn current_time(&self) -> f64 {
        if !self.playing || self.frozen {
            return self.anchor_position;
        }
        let elapsed = (self.clock.now_ms() - self.anchor_at_ms).max(0) as f64 / 1000.0;
        let position = self.anchor_position + elapsed;
        match self.duration() {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    fn is_paused(&self) -> bool {
        !self.playing
    }

    fn ready_state(&self) -> u8 {
        if self.ready {
            HAVE_ENOUGH_DATA
        } else {
            HAVE_NOTHING
        }
    }

    fn network_state(&self) -> u8 {
        match (&self.source, self.pending) {
            (None, _) => NETWORK_NO_SOURCE,
            (Some(_), Some(_)) => NETWORK_LOADING,
            (Some(_), None) => NETWORK_IDLE,
        }
    }

    fn buffered_end(&self) -> Option<f64> {
        if self.ready {
            self.duration()
        } else {
            None
        }
    }

    fn seek(&mut self, seconds: f64) -> Result<(), MediaError> {
        if self.source.is_none() {
            return Err(MediaError::NoSource);
        }
        if !self.ready {
            return Err(MediaError::NotReady);
        }
        let target = match self.duration() {
            Some(duration) => seconds.clamp(0.0, duration),
            None => seconds.max(0.0),
        };
        self.reanchor(target);
        Ok(())
    }

    fn play(&mut self) -> Result<(), MediaError> {
        if self.source.is_none() {
            return Err(MediaError::NoSource);
        }
        if !self.ready {
            return Err(MediaError::NotReady);
        }
        if self.blocked_plays > 0 {
            self.blocked_plays -= 1;
            return Err(MediaError::NotAllowed("autoplay blocked".to_string()));
        }
        if !self.playing {
            let position = self.current_time();
            self.playing = true;
            self.reanchor(position);
            self.events.push_back(MediaEvent::Playing);
        }
        Ok(())
    }

    fn pause(&mut self) {
        if self.playing {
            let position = self.current_time();
            self.playing = false;
            self.reanchor(position);
        }
    }

    fn poll_events(&mut self) -> Vec<MediaEvent> {
        if let Some((load_id, ready_at)) = self.pending {
            if self.clock.now_ms() >= ready_at {
                self.pending = None;
                match self.failing_load.take() {
                    Some(reason) => {
                        self.source = None;
                        self.events.push_back(MediaEvent::LoadFailed {
                            load_id,
                            error: MediaError::Source(reason),
                        });
                    }
                    None => {
                        self.ready = true;
                        self.events.push_back(MediaEvent::Loaded { load_id });
                    }
                }
            }
        }
        self.events.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn source(duration: Option<f64>) -> MediaSource {
        MediaSource {
            track_id: Uuid::new_v4(),
            url: Url::parse("http://127.0.0.1:3000/api/audio/x").unwrap(),
            kind: MediaKind::Audio,
            duration_sec: duration,
        }
    }

    fn loaded(clock: &ManualClock, duration: Option<f64>) -> VirtualPlayhead {
        let mut media = VirtualPlayhead::new(Arc::new(clock.clone()));
        media.load(LoadRequest {
            id: 1,
            source: source(duration),
        });
        assert_eq!(media.poll_events(), vec![MediaEvent::Loaded { load_id: 1 }]);
        media
    }

    #[test]
    fn test_position_follows_clock_while_playing() {
        let clock = ManualClock::new(0);
        let mut media = loaded(&clock, Some(100.0));
        media.seek(10.0).unwrap();
        media.play().unwrap();
        clock.advance(Duration::from_millis(2_500));
        assert_eq!(media.current_time(), 12.5);

        media.pause();
        clock.advance(Duration::from_secs(30));
        assert_eq!(media.current_time(), 12.5);

        media.play().unwrap();
        clock.advance(Duration::from_secs(500));
        assert_eq!(media.current_time(), 100.0);
    }

    #[test]
    fn test_seek_and_play_need_a_ready_source() {
        let clock = ManualClock::new(0);
        let mut media =
            VirtualPlayhead::new(Arc::new(clock.clone())).with_load_latency(Duration::from_secs(1));
        assert_eq!(media.play(), Err(MediaError::NoSource));

        media.load(LoadRequest {
            id: 7,
            source: source(None),
        });
        assert_eq!(media.seek(5.0), Err(MediaError::NotReady));
        assert!(media.poll_events().is_empty());
        assert_eq!(media.network_state(), NETWORK_LOADING);

        clock.advance(Duration::from_secs(1));
        assert_eq!(media.poll_events(), vec![MediaEvent::Loaded { load_id: 7 }]);
        assert!(media.seek(5.0).is_ok());
        assert_eq!(media.ready_state(), HAVE_ENOUGH_DATA);
    }

    #[test]
    fn test_blocked_plays_and_frozen_position() {
        let clock = ManualClock::new(0);
        let mut media = loaded(&clock, None);
        media.block_next_plays(1);
        assert!(matches!(media.play(), Err(MediaError::NotAllowed(_))));
        media.play().unwrap();
        assert_eq!(media.poll_events(), vec![MediaEvent::Playing]);

        clock.advance(Duration::from_secs(1));
        media.set_frozen(true);
        clock.advance(Duration::from_secs(10));
        assert_eq!(media.current_time(), 1.0);
        assert_eq!(media.poll_events(), vec![MediaEvent::Stalled]);
    }

    #[test]
    fn test_failed_load_detaches_source() {
        let clock = ManualClock::new(0);
        let mut media = VirtualPlayhead::new(Arc::new(clock.clone()));
        media.fail_next_load("404");
        media.load(LoadRequest {
            id: 3,
            source: source(None),
        });
        assert_eq!(
            media.poll_events(),
            vec![MediaEvent::LoadFailed {
                load_id: 3,
                error: MediaError::Source("404".to_string())
            }]
        );
        assert_eq!(media.network_state(), NETWORK_NO_SOURCE);
    }

    #[test]
    fn test_source_for_track() {
        let server = Url::parse("http://radio.local:3000").unwrap();
        let mut track = TrackInfo {
            id: Uuid::new_v4(),
            source_ref: "dQw4w9WgXcQ".to_string(),
            title: None,
            channel: None,
            thumbnail: None,
            duration_sec: Some(212.0),
            status: erwin_protocol::AcquisitionStatus::Pending,
            disabled: false,
            asset_url: None,
        };

        let external = MediaSource::for_track(&track, &server).unwrap();
        assert_eq!(external.kind, MediaKind::ExternalVideo);
        assert_eq!(
            external.url.as_str(),
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        );

        track.asset_url = Some(format!("/api/audio/{}", track.id));
        let audio = MediaSource::for_track(&track, &server).unwrap();
        assert_eq!(audio.kind, MediaKind::Audio);
        assert_eq!(
            audio.url.as_str(),
            format!("http://radio.local:3000/api/audio/{}", track.id)
        );

        track.disabled = true;
        assert!(MediaSource::for_track(&track, &server).is_none());
    }
}
