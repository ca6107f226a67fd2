//! Connection driver
//!
//! Owns the WebSocket session with the server and feeds the reconciler:
//! inbound messages, the reconciliation tick, heartbeats and clock sync
//! pings all run from one `select!` loop. A dropped connection is retried
//! with exponential backoff, and every fresh connection starts with a full
//! state pull since missed broadcasts are never replayed.

use std::sync::Arc;
use std::time::Duration;

use erwin_protocol::{ClientMessage, Hello, ServerMessage, SessionSnapshot};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::clock::Clock;
use crate::config::ListenerConfig;
use crate::error::{ListenerError, ListenerResult};
use crate::media::MediaElement;
use crate::reconciler::{AdjustOutcome, Reconciler};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

pub const RECONNECT_MIN_DELAY: Duration = Duration::from_secs(1);
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Doubling reconnect delay, reset once a connection succeeds
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    min: Duration,
    max: Duration,
    next: Duration,
}

impl ReconnectBackoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max, next: min }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.min;
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(RECONNECT_MIN_DELAY, RECONNECT_MAX_DELAY)
    }
}

/// Real-time channel url for a server base url.
pub fn ws_url(server_url: &Url) -> ListenerResult<Url> {
    let scheme = match server_url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => return Err(ListenerError::UnsupportedScheme(other.to_string())),
    };
    let mut url = server_url.join("/ws")?;
    url.set_scheme(scheme)
        .map_err(|()| ListenerError::UnsupportedScheme(scheme.to_string()))?;
    Ok(url)
}

/// Fetch the full session state from the control API.
pub async fn pull_state(http: &reqwest::Client, server_url: &Url) -> ListenerResult<SessionSnapshot> {
    let snapshot = http
        .get(server_url.join("/api/state")?)
        .send()
        .await?
        .error_for_status()?
        .json::<SessionSnapshot>()
        .await?;
    Ok(snapshot)
}

pub struct SessionClient<M: MediaElement> {
    config: ListenerConfig,
    reconciler: Reconciler<M>,
    http: reqwest::Client,
    backoff: ReconnectBackoff,
}

impl<M: MediaElement> SessionClient<M> {
    pub fn new(config: ListenerConfig, media: M, clock: Arc<dyn Clock>) -> Self {
        let reconciler = Reconciler::new(media, clock, config.reconciler_settings());
        Self {
            config,
            reconciler,
            http: reqwest::Client::new(),
            backoff: ReconnectBackoff::default(),
        }
    }

    pub fn reconciler(&self) -> &Reconciler<M> {
        &self.reconciler
    }

    /// Stay connected until `shutdown` fires.
    pub async fn run(mut self, shutdown: CancellationToken) {
        loop {
            match self.connect_and_follow(&shutdown).await {
                Ok(()) => {
                    tracing::info!("Listener stopped");
                    return;
                }
                Err(e) => tracing::warn!(error = %e, "Session connection lost"),
            }

            let delay = self.backoff.next_delay();
            tracing::info!(delay_ms = delay.as_millis() as u64, "Reconnecting");
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn connect_and_follow(&mut self, shutdown: &CancellationToken) -> ListenerResult<()> {
        let url = ws_url(&self.config.server_url)?;
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        self.backoff.reset();
        tracing::info!(url = %url, client_id = %self.config.client_id, "Connected to session");

        let (mut tx, mut rx) = stream.split();
        let hello = ClientMessage::Hello(Hello {
            client_id: Some(self.config.client_id.clone()),
            page: Some("listener".to_string()),
            user_agent: Some(format!("erwin-listener/{}", env!("CARGO_PKG_VERSION"))),
        });
        send(&mut tx, &hello).await?;
        send(&mut tx, &self.reconciler.ping()).await?;
        self.resync().await;

        let mut tick = interval_at(Instant::now(), self.config.tick_interval);
        let mut heartbeat = interval_at(
            Instant::now() + self.config.heartbeat_interval,
            self.config.heartbeat_interval,
        );
        let mut time_sync = interval_at(
            Instant::now() + self.config.time_sync_interval,
            self.config.time_sync_interval,
        );
        for timer in [&mut tick, &mut heartbeat, &mut time_sync] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = tx.send(Message::Close(None)).await;
                    return Ok(());
                }
                message = rx.next() => match message {
                    Some(Ok(Message::Text(text))) => self.handle_text(&text).await,
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(?frame, "Server closed the connection");
                        return Err(ListenerError::Closed);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(ListenerError::Closed),
                },
                _ = tick.tick() => {
                    for message in self.reconciler.tick() {
                        send(&mut tx, &message).await?;
                    }
                }
                _ = heartbeat.tick() => {
                    send(&mut tx, &self.reconciler.heartbeat()).await?;
                }
                _ = time_sync.tick() => {
                    send(&mut tx, &self.reconciler.ping()).await?;
                }
            }
        }
    }

    async fn handle_text(&mut self, text: &str) {
        let message = match serde_json::from_str::<ServerMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unparseable server message");
                return;
            }
        };

        match message {
            ServerMessage::Connected(connected) => {
                tracing::debug!(connection_id = %connected.connection_id, "Session acknowledged");
            }
            ServerMessage::TimeSyncPong { t0, t1 } => {
                self.reconciler.observe_pong(t0, t1);
            }
            ServerMessage::StateUpdate(update) => self.reconciler.apply_state(update),
            ServerMessage::ClientAdjust(adjust) => {
                if self.reconciler.apply_adjust(adjust) == AdjustOutcome::NeedsFullState {
                    self.resync().await;
                }
            }
            ServerMessage::Error(error) => {
                tracing::warn!(code = %error.code, message = %error.message, "Server reported an error");
            }
            other => tracing::trace!(?other, "Ignoring message"),
        }
    }

    /// Pull and apply the full state. Failures leave the mirror untouched.
    async fn resync(&mut self) {
        match pull_state(&self.http, &self.config.server_url).await {
            Ok(snapshot) => self.reconciler.apply_snapshot(snapshot),
            Err(e) => tracing::warn!(error = %e, "Full state pull failed"),
        }
    }
}

async fn send(tx: &mut WsSink, message: &ClientMessage) -> ListenerResult<()> {
    let text = serde_json::to_string(message)?;
    tx.send(Message::Text(text)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url_follows_http_scheme() {
        let plain = ws_url(&Url::parse("http://127.0.0.1:3000").unwrap()).unwrap();
        assert_eq!(plain.as_str(), "ws://127.0.0.1:3000/ws");

        let secure = ws_url(&Url::parse("https://radio.example.org/ignored").unwrap()).unwrap();
        assert_eq!(secure.as_str(), "wss://radio.example.org/ws");

        assert!(matches!(
            ws_url(&Url::parse("ftp://example.org").unwrap()),
            Err(ListenerError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_backoff_doubles_to_ceiling_and_resets() {
        let mut backoff = ReconnectBackoff::default();
        let delays: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }
}
