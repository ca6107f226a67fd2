//! HTTP surface tests driven through the router with `oneshot`

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use serde_json::json;

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("OK"));

    let (status, body) = app.get("/health/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["listeners"], 0);
}

#[tokio::test]
async fn test_state_starts_idle() {
    let app = TestApp::new().await;
    let (status, body) = app.get("/api/state").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["playState"]["currentTrackId"].is_null());
    assert_eq!(body["queue"], json!([]));
    assert_eq!(body["pool"], json!([]));
    assert_eq!(body["serverNow"], START_MS);
}

#[tokio::test]
async fn test_session_control_round_trip() {
    let app = TestApp::new().await;
    let track = ready_track(&app.ctx, "Routed", Some(120.0)).await;

    let (status, body) = app
        .post("/api/session/start", json!({ "trackId": track.id }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["playState"]["currentTrackId"], json!(track.id));
    assert_eq!(body["currentTrack"]["id"], json!(track.id));

    let (status, body) = app.post("/api/session/pause", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["playState"]["paused"], true);

    let (status, _) = app
        .post("/api/session/seek", json!({ "positionSeconds": 30.0 }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.post("/api/session/stop", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["playState"]["currentTrackId"].is_null());
}

#[tokio::test]
async fn test_seek_without_track_is_bad_request() {
    let app = TestApp::new().await;
    let (status, body) = app
        .post("/api/session/seek", json!({ "positionSeconds": 5 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "NO_ACTIVE_TRACK");
}

#[tokio::test]
async fn test_start_unknown_track_is_not_found() {
    let app = TestApp::new().await;
    let (status, body) = app
        .post(
            "/api/session/start",
            json!({ "trackId": uuid::Uuid::new_v4() }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_queue_routes() {
    let app = TestApp::new().await;
    let first = ready_track(&app.ctx, "One", None).await;
    let second = ready_track(&app.ctx, "Two", None).await;

    app.post("/api/queue", json!({ "trackId": first.id })).await;
    let (status, body) = app
        .post("/api/queue", json!({ "trackId": second.id, "source": "vote" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert_eq!(body[1]["source"], "vote");

    let second_entry = body[1]["id"].as_str().unwrap().to_string();
    let (status, body) = app
        .post(
            &format!("/api/queue/{}/move", second_entry),
            json!({ "direction": "up" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["trackId"], json!(second.id));
    assert_eq!(body[0]["position"], 1);

    let (status, body) = app.delete(&format!("/api/queue/{}", second_entry)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["position"], 1);

    let (status, _) = app
        .delete(&format!("/api/queue/{}", uuid::Uuid::new_v4()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.get("/api/pool").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_vote_without_round_conflicts() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/api/votes/current").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_null());

    let (status, body) = app
        .post("/api/votes", json!({ "voterId": "alice", "optionIndex": 0 }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "NO_ACTIVE_VOTE_ROUND");
}

#[tokio::test]
async fn test_acquisition_routes() {
    let app = TestApp::new().await;

    let (status, body) = app
        .post("/api/acquisitions", json!({ "url": "not a link at all" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = app
        .post(
            "/api/acquisitions",
            json!({ "url": "https://youtu.be/dQw4w9WgXcQ" }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "pending");
    assert!(body["trackId"].is_string());

    let (status, body) = app.get("/api/acquisitions").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = app.post("/api/acquisitions/clear", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 0);
}

#[tokio::test]
async fn test_playlist_routes() {
    let app = TestApp::new().await;
    let track = ready_track(&app.ctx, "Listed", Some(90.0)).await;

    let (status, body) = app.post("/api/playlists", json!({ "name": "  " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = app
        .post("/api/playlists", json!({ "name": "Late night" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "Late night");
    let playlist_id: uuid::Uuid = serde_json::from_value(body["id"].clone()).unwrap();

    {
        let mut conn = app.ctx.db.acquire().await.unwrap();
        erwin_api::repositories::playlists::add_track(
            &mut conn,
            playlist_id,
            track.id,
            app.ctx.clock.now(),
        )
        .await
        .unwrap();
    }

    let (status, body) = app.get("/api/playlists").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["trackCount"], 1);

    let (status, body) = app
        .post(&format!("/api/playlists/{}/play", playlist_id), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["playState"]["currentTrackId"], json!(track.id));
}

#[tokio::test]
async fn test_command_route() {
    let app = TestApp::new().await;

    let (status, body) = app
        .post("/api/commands", json!({ "author": "mod", "text": "!np" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["command"]["command"], "nowPlaying");
    assert_eq!(body["reply"], "Nothing is playing");

    let (status, _) = app
        .post("/api/commands", json!({ "author": "mod", "text": "!dance" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_clients_route_lists_no_listeners() {
    let app = TestApp::new().await;
    let (status, body) = app.get("/api/clients").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

async fn track_with_file(app: &TestApp, contents: &[u8]) -> erwin_api::models::Track {
    let track = ready_track(&app.ctx, "Clip", Some(10.0)).await;
    let asset = track.asset_path.clone().unwrap();
    std::fs::write(app.audio_dir.path().join(asset), contents).unwrap();
    track
}

fn ranged(uri: &str, range: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("range", range)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_audio_full_and_ranged() {
    let app = TestApp::new().await;
    let track = track_with_file(&app, b"abcdefghij").await;
    let uri = format!("/api/audio/{}", track.id);

    let (status, body) = app.get(&uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("abcdefghij"));

    let (status, body) = app.request(ranged(&uri, "bytes=2-5")).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(body, json!("cdef"));

    let (status, body) = app.request(ranged(&uri, "bytes=-3")).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(body, json!("hij"));

    let (status, body) = app.request(ranged(&uri, "bytes=50-")).await;
    assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(body["code"], "RANGE_NOT_SATISFIABLE");
}

#[tokio::test]
async fn test_audio_not_found_cases() {
    let app = TestApp::new().await;

    let (status, _) = app
        .get(&format!("/api/audio/{}", uuid::Uuid::new_v4()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let pending = pending_track(&app.ctx).await;
    let (status, body) = app.get(&format!("/api/audio/{}", pending.id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "AUDIO_NOT_FOUND");

    // Acquired but the file is gone
    let missing = ready_track(&app.ctx, "Gone", Some(10.0)).await;
    let (status, _) = app.get(&format!("/api/audio/{}", missing.id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
