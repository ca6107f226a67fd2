//! Mock erwin control API for listener tests
//!
//! Provides a [`MockSessionServer`] answering the full-state pull a listener
//! makes after every (re)connect, without running the real server.

use erwin_protocol::SessionSnapshot;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock session server
///
/// Wraps a [`wiremock::MockServer`] with helpers for the state endpoint.
///
/// # Example
///
/// ```rust,ignore
/// use erwin_test_utils::MockSessionServer;
///
/// #[tokio::test]
/// async fn test_pull() {
///     let server = MockSessionServer::start().await;
///     server.mock_state(&snapshot).await;
///
///     let url = url::Url::parse(&server.url()).unwrap();
///     let pulled = pull_state(&reqwest::Client::new(), &url).await.unwrap();
/// }
/// ```
pub struct MockSessionServer {
    server: MockServer,
}

impl MockSessionServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base url, e.g. `http://127.0.0.1:41234`
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Serve `snapshot` from `GET /api/state`
    pub async fn mock_state(&self, snapshot: &SessionSnapshot) {
        Mock::given(method("GET"))
            .and(path("/api/state"))
            .respond_with(ResponseTemplate::new(200).set_body_json(snapshot))
            .mount(&self.server)
            .await;
    }

    /// Fail `GET /api/state` the way the server does when its store is down
    pub async fn mock_state_unavailable(&self) {
        Mock::given(method("GET"))
            .and(path("/api/state"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "code": "INTERNAL_ERROR",
                "message": "An internal error occurred"
            })))
            .mount(&self.server)
            .await;
    }

    /// Number of state pulls received so far
    pub async fn state_requests(&self) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == "/api/state")
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use erwin_protocol::PlayState;

    fn idle_snapshot() -> SessionSnapshot {
        SessionSnapshot {
            play_state: PlayState::stopped(1_000),
            current_track: None,
            queue: vec![],
            pool: vec![],
            server_now: 1_000,
        }
    }

    #[tokio::test]
    async fn test_mock_session_server_starts() {
        let server = MockSessionServer::start().await;
        assert!(server.url().starts_with("http://"));
    }

    #[tokio::test]
    async fn test_mock_state_serves_snapshot() {
        let server = MockSessionServer::start().await;
        server.mock_state(&idle_snapshot()).await;

        let response = reqwest::get(format!("{}/api/state", server.url()))
            .await
            .unwrap();
        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["serverNow"], 1_000);
        assert_eq!(body["playState"]["paused"], true);
        assert_eq!(server.state_requests().await, 1);
    }

    #[tokio::test]
    async fn test_mock_state_unavailable() {
        let server = MockSessionServer::start().await;
        server.mock_state_unavailable().await;

        let response = reqwest::get(format!("{}/api/state", server.url()))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 500);
    }
}
