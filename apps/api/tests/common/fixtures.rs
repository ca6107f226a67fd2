//! Store fixtures for integration tests

#![allow(dead_code)]

use erwin_api::models::{Track, TrackMetadata};
use erwin_api::repositories::{playlists, pool, tracks};
use erwin_api::AppContext;
use uuid::Uuid;

/// A unique, syntactically valid 11-char source id
pub fn source_id() -> String {
    Uuid::new_v4().simple().to_string()[..11].to_string()
}

/// Insert a track that has been acquired and is playable.
pub async fn ready_track(ctx: &AppContext, title: &str, duration_sec: Option<f64>) -> Track {
    let mut conn = ctx.db.acquire().await.unwrap();
    let source_ref = source_id();
    let track = tracks::insert(
        &mut conn,
        &source_ref,
        &format!("https://www.youtube.com/watch?v={}", source_ref),
        ctx.clock.now(),
    )
    .await
    .unwrap();
    let metadata = TrackMetadata {
        title: Some(title.to_string()),
        channel: Some("Fixture".to_string()),
        thumbnail: None,
        duration_sec,
    };
    tracks::mark_acquired(
        &mut conn,
        track.id,
        &metadata,
        &format!("{}-{}.mp3", title, track.id),
        ctx.clock.now(),
    )
    .await
    .unwrap();
    tracks::find(&mut conn, track.id).await.unwrap().unwrap()
}

/// Insert a track that has only been requested.
pub async fn pending_track(ctx: &AppContext) -> Track {
    let mut conn = ctx.db.acquire().await.unwrap();
    let source_ref = source_id();
    tracks::insert(
        &mut conn,
        &source_ref,
        &format!("https://www.youtube.com/watch?v={}", source_ref),
        ctx.clock.now(),
    )
    .await
    .unwrap()
}

/// Insert `count` ready tracks of `duration_sec` and pool them.
pub async fn pooled_tracks(ctx: &AppContext, count: usize, duration_sec: f64) -> Vec<Track> {
    let mut created = Vec::with_capacity(count);
    for i in 0..count {
        let track = ready_track(ctx, &format!("Pooled {}", i), Some(duration_sec)).await;
        let mut conn = ctx.db.acquire().await.unwrap();
        pool::insert(&mut conn, track.id, ctx.clock.now()).await.unwrap();
        created.push(track);
    }
    created
}

pub async fn playlist_with(ctx: &AppContext, name: &str, members: &[&Track]) -> Uuid {
    let mut conn = ctx.db.acquire().await.unwrap();
    let playlist = playlists::create(&mut conn, name, ctx.clock.now()).await.unwrap();
    for track in members {
        playlists::add_track(&mut conn, playlist.id, track.id, ctx.clock.now())
            .await
            .unwrap();
    }
    playlist.id
}
