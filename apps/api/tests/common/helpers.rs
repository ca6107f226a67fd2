//! Test harness: store, clock, hub and a fake acquisition tool

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use erwin_api::clock::ManualClock;
use erwin_api::config::{AcquisitionConfig, Config, RealtimeConfig, VoteConfig};
use erwin_api::models::TrackMetadata;
use erwin_api::services::{AcquiredAsset, AcquisitionOutcome, AcquisitionRequest, AcquisitionTool};
use erwin_api::websocket::BroadcastHub;
use erwin_api::{api_router, connect, AppContext, AppState, MIGRATOR};
use erwin_protocol::ServerMessage;
use erwin_shared_config::{CommonConfig, DatabaseConfig, Environment};
use tokio::sync::broadcast;
use tower::ServiceExt;

/// 2025-01-01T00:00:00Z
pub const START_MS: i64 = 1_735_689_600_000;

pub struct TestApp {
    pub ctx: AppContext,
    pub state: AppState,
    pub clock: ManualClock,
    pub events: broadcast::Receiver<ServerMessage>,
    pub audio_dir: tempfile::TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let pool = connect(&DatabaseConfig::with_url("sqlite::memory:"))
            .await
            .expect("in-memory database");
        MIGRATOR.run(&pool).await.expect("migrations");

        let clock = ManualClock::new(START_MS);
        let hub = BroadcastHub::new();
        let events = hub.subscribe();
        let ctx = AppContext::new(pool, hub, Arc::new(clock.clone()));
        let audio_dir = tempfile::tempdir().expect("audio dir");
        let state = AppState::new(ctx.clone(), test_config(audio_dir.path().to_path_buf()));

        Self {
            ctx,
            state,
            clock,
            events,
            audio_dir,
        }
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub fn router(&self) -> Router {
        api_router(self.state.clone())
    }

    /// Drain everything published so far.
    pub fn drain_events(&mut self) -> Vec<ServerMessage> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    pub async fn request(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self.router().oneshot(request).await.expect("router response");
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or_else(|_| {
                serde_json::Value::String(String::from_utf8_lossy(&body).into_owned())
            })
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        self.request(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post(&self, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        self.request(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        self.request(
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }
}

pub fn test_config(audio_dir: PathBuf) -> Config {
    Config {
        common: CommonConfig {
            database: DatabaseConfig::with_url("sqlite::memory:"),
            audio_dir,
            environment: Environment::Test,
            log_level: "debug".to_string(),
        },
        port: 0,
        cors_allowed_origins: None,
        vote: VoteConfig::default(),
        acquisition: AcquisitionConfig::default(),
        realtime: RealtimeConfig::default(),
    }
}

/// Acquisition tool that replays scripted outcomes and counts calls
#[derive(Debug, Default)]
pub struct FakeAcquisitionTool {
    calls: AtomicUsize,
    scripted: Mutex<VecDeque<AcquisitionOutcome>>,
}

impl FakeAcquisitionTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcomes returned in order; once exhausted every call succeeds.
    pub fn with_outcomes(outcomes: impl IntoIterator<Item = AcquisitionOutcome>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            scripted: Mutex::new(outcomes.into_iter().collect()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AcquisitionTool for FakeAcquisitionTool {
    async fn acquire(&self, request: &AcquisitionRequest) -> AcquisitionOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.scripted.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            AcquisitionOutcome::Ready(AcquiredAsset {
                metadata: TrackMetadata {
                    title: Some(format!("Fetched {}", request.source_ref)),
                    channel: Some("Test Channel".to_string()),
                    thumbnail: None,
                    duration_sec: Some(180.0),
                },
                asset_path: format!("fetched-{}.mp3", request.track_id),
            })
        })
    }
}
