//! Integration tests for vote rounds and the scheduler tick

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use common::*;
use erwin_api::config::VoteConfig;
use erwin_api::jobs::VoteScheduler;
use erwin_api::models::Track;
use erwin_api::ApiError;
use erwin_protocol::{QueueSource, ServerMessage};

/// A 180 second track playing with three ready tracks in the pool.
async fn playing_session(app: &TestApp) -> (Track, Vec<Track>) {
    let current = ready_track(&app.ctx, "Now playing", Some(180.0)).await;
    let pooled = pooled_tracks(&app.ctx, 3, 200.0).await;
    app.state.playback.start(Some(current.id)).await.unwrap();
    (current, pooled)
}

fn scheduler(app: &TestApp) -> VoteScheduler {
    VoteScheduler::new(app.ctx.clone(), VoteConfig::default())
}

/// Rounds shorter than the lead window, so a round resolves while the
/// same track is still playing.
fn short_round_scheduler(app: &TestApp) -> VoteScheduler {
    VoteScheduler::new(
        app.ctx.clone(),
        VoteConfig {
            round_duration: Duration::from_secs(5),
            ..VoteConfig::default()
        },
    )
}

#[tokio::test]
async fn test_round_opens_inside_lead_window() {
    let mut app = TestApp::new().await;
    let (current, pooled) = playing_session(&app).await;
    let scheduler = scheduler(&app);
    app.drain_events();

    app.advance(Duration::from_secs(159));
    assert_eq!(scheduler.tick().await.unwrap().opened, None);

    app.advance(Duration::from_secs(6));
    let report = scheduler.tick().await.unwrap();
    assert!(report.opened.is_some());
    assert!(!report.advanced);

    let events = app.drain_events();
    let round = match &events[..] {
        [ServerMessage::VoteStart(round)] => round.clone(),
        other => panic!("expected a single VOTE_START, got {:?}", other),
    };
    assert_eq!(round.ends_at - round.started_at, 15_000);
    assert_eq!(round.options.len(), 3);
    assert_eq!(round.counts, vec![0, 0, 0]);
    assert!(round.options.iter().all(|o| o.track_id != current.id));
    assert!(round
        .options
        .iter()
        .all(|o| pooled.iter().any(|t| t.id == o.track_id)));

    // An open round blocks a second one
    app.advance(Duration::from_secs(1));
    assert_eq!(scheduler.tick().await.unwrap(), Default::default());
}

#[tokio::test]
async fn test_no_round_without_enough_candidates_or_while_paused() {
    let app = TestApp::new().await;
    let current = ready_track(&app.ctx, "Lonely", Some(180.0)).await;
    pooled_tracks(&app.ctx, 1, 200.0).await;
    app.state.playback.start(Some(current.id)).await.unwrap();
    let scheduler = scheduler(&app);

    app.advance(Duration::from_secs(170));
    assert_eq!(scheduler.tick().await.unwrap().opened, None);

    pooled_tracks(&app.ctx, 2, 200.0).await;
    app.state.playback.pause().await.unwrap();
    assert_eq!(scheduler.tick().await.unwrap().opened, None);

    app.state.playback.resume().await.unwrap();
    assert!(scheduler.tick().await.unwrap().opened.is_some());
}

#[tokio::test]
async fn test_revote_replaces_earlier_ballot() {
    let app = TestApp::new().await;
    playing_session(&app).await;
    let scheduler = scheduler(&app);
    app.advance(Duration::from_secs(165));
    scheduler.tick().await.unwrap();

    let votes = &app.state.votes;
    votes.cast("alice", 0).await.unwrap();
    votes.cast("bob", 0).await.unwrap();
    let payload = votes.cast("alice", 1).await.unwrap();
    assert_eq!(payload.counts, vec![1, 1, 0]);

    let current = votes.current().await.unwrap().unwrap();
    assert_eq!(current.round_id, payload.round_id);
    assert_eq!(current.counts, vec![1, 1, 0]);
}

#[tokio::test]
async fn test_cast_rejections() {
    let app = TestApp::new().await;
    assert_matches!(
        app.state.votes.cast("alice", 0).await,
        Err(ApiError::NoActiveVoteRound)
    );
    assert!(app.state.votes.current().await.unwrap().is_none());

    playing_session(&app).await;
    let scheduler = scheduler(&app);
    app.advance(Duration::from_secs(165));
    scheduler.tick().await.unwrap();

    assert_matches!(
        app.state.votes.cast("alice", 3).await,
        Err(ApiError::ValidationError(_))
    );
    assert_matches!(
        app.state.votes.cast("   ", 0).await,
        Err(ApiError::ValidationError(_))
    );

    // Past its end but not yet resolved: closed for ballots
    app.advance(Duration::from_secs(15));
    assert_matches!(
        app.state.votes.cast("alice", 0).await,
        Err(ApiError::NoActiveVoteRound)
    );
}

#[tokio::test]
async fn test_majority_winner_is_queued_as_vote() {
    let mut app = TestApp::new().await;
    playing_session(&app).await;
    let scheduler = short_round_scheduler(&app);
    app.advance(Duration::from_secs(165));
    scheduler.tick().await.unwrap();

    let round = app.state.votes.current().await.unwrap().unwrap();
    app.state.votes.cast("alice", 2).await.unwrap();
    app.state.votes.cast("bob", 2).await.unwrap();
    app.state.votes.cast("carol", 0).await.unwrap();
    app.drain_events();

    app.advance(Duration::from_secs(5));
    let report = scheduler.tick().await.unwrap();
    let expected = round.options[2].track_id;
    assert_eq!(report.resolved, Some(round.round_id));
    assert_eq!(report.winner, Some(expected));
    assert!(!report.advanced);

    let queued = app.state.queue.list().await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].track_id, expected);
    assert_eq!(queued[0].source, QueueSource::Vote);
    assert!(app
        .state
        .queue
        .pool()
        .await
        .unwrap()
        .iter()
        .all(|p| p.track_id != expected));

    let events = app.drain_events();
    assert_matches!(&events[0], ServerMessage::VoteEnd(end) if end.winner == Some(expected) && end.counts == vec![1, 0, 2]);
    assert!(events
        .iter()
        .any(|e| matches!(e, ServerMessage::QueueUpdate(_))));
    assert!(app.state.votes.current().await.unwrap().is_none());
}

#[tokio::test]
async fn test_resolved_round_does_not_retrigger_for_same_track() {
    let app = TestApp::new().await;
    playing_session(&app).await;
    let scheduler = short_round_scheduler(&app);

    app.advance(Duration::from_secs(165));
    assert!(scheduler.tick().await.unwrap().opened.is_some());
    app.advance(Duration::from_secs(5));
    assert!(scheduler.tick().await.unwrap().resolved.is_some());

    for _ in 0..5 {
        app.advance(Duration::from_secs(1));
        assert_eq!(scheduler.tick().await.unwrap().opened, None);
    }
}

#[tokio::test]
async fn test_replayed_track_gets_a_new_round() {
    let app = TestApp::new().await;
    let (current, _) = playing_session(&app).await;
    let scheduler = short_round_scheduler(&app);

    app.advance(Duration::from_secs(165));
    let first = scheduler.tick().await.unwrap().opened;
    assert!(first.is_some());
    app.advance(Duration::from_secs(5));
    assert!(scheduler.tick().await.unwrap().resolved.is_some());

    app.state.playback.start(Some(current.id)).await.unwrap();
    app.advance(Duration::from_secs(165));
    let second = scheduler.tick().await.unwrap().opened;
    assert!(second.is_some());
    assert_ne!(second, first);
}

#[tokio::test]
async fn test_winner_already_queued_is_not_queued_twice() {
    let app = TestApp::new().await;
    playing_session(&app).await;
    let scheduler = short_round_scheduler(&app);
    app.advance(Duration::from_secs(165));
    scheduler.tick().await.unwrap();

    let round = app.state.votes.current().await.unwrap().unwrap();
    let favourite = round.options[0].track_id;
    app.state.votes.cast("alice", 0).await.unwrap();
    app.state
        .queue
        .enqueue(favourite, QueueSource::Admin)
        .await
        .unwrap();

    app.advance(Duration::from_secs(5));
    assert_eq!(scheduler.tick().await.unwrap().winner, Some(favourite));

    let queued = app.state.queue.list().await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].track_id, favourite);
    assert_eq!(queued[0].source, QueueSource::Admin);
}

#[tokio::test]
async fn test_track_end_plays_vote_winner_next() {
    let app = TestApp::new().await;
    let (current, _) = playing_session(&app).await;
    let scheduler = scheduler(&app);

    app.advance(Duration::from_secs(165));
    scheduler.tick().await.unwrap();
    let round = app.state.votes.current().await.unwrap().unwrap();
    app.state.votes.cast("alice", 1).await.unwrap();

    // Round end and track end coincide
    app.advance(Duration::from_secs(15));
    let report = scheduler.tick().await.unwrap();
    assert_eq!(report.winner, Some(round.options[1].track_id));
    assert!(report.advanced);

    let snapshot = app.state.playback.snapshot().await.unwrap();
    let playing = snapshot.play_state.current_track_id.unwrap();
    assert_ne!(playing, current.id);
    assert_eq!(playing, round.options[1].track_id);
    assert!(!snapshot.play_state.paused);
    assert!(snapshot.queue.is_empty());
}

#[tokio::test]
async fn test_track_end_without_vote_draws_from_pool() {
    let app = TestApp::new().await;
    let current = ready_track(&app.ctx, "Short", Some(30.0)).await;
    let pooled = pooled_tracks(&app.ctx, 1, 200.0).await;
    app.state.playback.start(Some(current.id)).await.unwrap();
    let scheduler = scheduler(&app);

    app.advance(Duration::from_secs(29));
    assert!(!scheduler.tick().await.unwrap().advanced);

    app.advance(Duration::from_secs(2));
    assert!(scheduler.tick().await.unwrap().advanced);
    let snapshot = app.state.playback.snapshot().await.unwrap();
    assert_eq!(snapshot.play_state.current_track_id, Some(pooled[0].id));
}

#[tokio::test]
async fn test_paused_track_is_never_advanced() {
    let app = TestApp::new().await;
    let current = ready_track(&app.ctx, "Held", Some(30.0)).await;
    pooled_tracks(&app.ctx, 2, 200.0).await;
    app.state.playback.start(Some(current.id)).await.unwrap();
    app.advance(Duration::from_secs(10));
    app.state.playback.pause().await.unwrap();

    app.advance(Duration::from_secs(600));
    let report = scheduler(&app).tick().await.unwrap();
    assert!(!report.advanced);
    let snapshot = app.state.playback.snapshot().await.unwrap();
    assert_eq!(snapshot.play_state.current_track_id, Some(current.id));
}
