//! Shared test utilities for the erwin workspace
//!
//! Stand-ins for the collaborators erwin talks to, so the API and listener
//! test suites run without a network or external binaries.
//!
//! - [`MockSessionServer`] - control API double serving `GET /api/state`
//! - [`FakeYtDlp`] - scripted `yt-dlp` executable (unix only)
//!
//! # Example
//!
//! ```rust,ignore
//! use erwin_test_utils::MockSessionServer;
//!
//! #[tokio::test]
//! async fn test_with_mock_server() {
//!     let server = MockSessionServer::start().await;
//!     server.mock_state(&snapshot).await;
//!
//!     // Point the listener at server.url()
//! }
//! ```

mod session;
#[cfg(unix)]
mod ytdlp;

pub use session::MockSessionServer;
#[cfg(unix)]
pub use ytdlp::FakeYtDlp;
