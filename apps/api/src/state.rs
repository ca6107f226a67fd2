//! Shared application state

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::clock::Clock;
use crate::config::Config;
use crate::services::{
    AcquisitionService, CommandService, PlaybackService, PlaylistService, QueueService,
    VoteService,
};
use crate::websocket::{BroadcastHub, ConnectionManager};

/// The store, the hub and the clock: everything a mutation needs.
#[derive(Clone)]
pub struct AppContext {
    pub db: SqlitePool,
    pub hub: BroadcastHub,
    pub clock: Arc<dyn Clock>,
}

impl AppContext {
    pub fn new(db: SqlitePool, hub: BroadcastHub, clock: Arc<dyn Clock>) -> Self {
        Self { db, hub, clock }
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }
}

/// State shared by every route and the WebSocket handler
#[derive(Clone)]
pub struct AppState {
    pub ctx: AppContext,
    pub config: Arc<Config>,
    pub connections: ConnectionManager,
    pub playback: PlaybackService,
    pub queue: QueueService,
    pub playlists: PlaylistService,
    pub votes: VoteService,
    pub acquisitions: AcquisitionService,
    pub commands: CommandService,
}

impl AppState {
    pub fn new(ctx: AppContext, config: Config) -> Self {
        let playback = PlaybackService::new(ctx.clone());
        let votes = VoteService::new(ctx.clone());
        Self {
            commands: CommandService::new(playback.clone(), votes.clone()),
            queue: QueueService::new(ctx.clone()),
            playlists: PlaylistService::new(ctx.clone()),
            acquisitions: AcquisitionService::new(ctx.clone()),
            connections: ConnectionManager::new(),
            config: Arc::new(config),
            playback,
            votes,
            ctx,
        }
    }
}
