//! WebSocket connection management
//!
//! Tracks every connected listener, the channel used to reach it directly,
//! and the diagnostics it reports (hello info, last heartbeat, events).

use dashmap::DashMap;
use erwin_protocol::{Hello, PlayerHeartbeat, ServerMessage};
use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Handle for sending messages to a specific WebSocket connection
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Channel for sending messages to this connection
    pub sender: mpsc::UnboundedSender<ServerMessage>,

    /// When this connection was established (Unix timestamp ms)
    pub connected_at: i64,

    /// Last inbound activity (atomic for thread-safe updates)
    pub last_activity: Arc<AtomicI64>,

    diagnostics: Mutex<ClientDiagnostics>,
}

/// What a listener has told us about itself
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDiagnostics {
    pub client_id: Option<String>,
    pub page: Option<String>,
    pub user_agent: Option<String>,
    pub heartbeat: Option<PlayerHeartbeat>,
    pub heartbeat_at: Option<i64>,
    /// Local position minus expected position at the last heartbeat
    pub drift_secs: Option<f64>,
    pub last_event: Option<String>,
    pub adjustments_sent: u32,
}

/// Snapshot returned by the diagnostics endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub connection_id: Uuid,
    pub connected_at: i64,
    pub last_seen: i64,
    /// False once the send task has dropped its receiver
    pub alive: bool,
    #[serde(flatten)]
    pub diagnostics: ClientDiagnostics,
}

impl ConnectionHandle {
    pub fn new(sender: mpsc::UnboundedSender<ServerMessage>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            sender,
            connected_at: now,
            last_activity: Arc::new(AtomicI64::new(now)),
            diagnostics: Mutex::new(ClientDiagnostics::default()),
        }
    }

    /// Update last activity timestamp
    pub fn touch(&self) {
        self.last_activity
            .store(chrono::Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Get last activity timestamp
    pub fn last_seen(&self) -> i64 {
        self.last_activity.load(Ordering::Relaxed)
    }

    /// Send a message to this connection
    #[allow(clippy::result_large_err)]
    pub fn send(&self, msg: ServerMessage) -> Result<(), mpsc::error::SendError<ServerMessage>> {
        self.sender.send(msg)
    }

    /// Check if the connection is still alive
    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }

    fn with_diagnostics<R>(&self, f: impl FnOnce(&mut ClientDiagnostics) -> R) -> R {
        // A poisoned lock only means a panic mid-update of plain data
        let mut guard = self
            .diagnostics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    pub fn diagnostics(&self) -> ClientDiagnostics {
        self.with_diagnostics(|d| d.clone())
    }
}

/// Manages WebSocket connections for all listeners
///
/// Uses DashMap for concurrent access without explicit locking.
/// Wrapped in Arc for cheap cloning.
#[derive(Debug, Clone, Default)]
pub struct ConnectionManager {
    connections: Arc<DashMap<Uuid, ConnectionHandle>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and return its id.
    pub fn add(&self, sender: mpsc::UnboundedSender<ServerMessage>) -> Uuid {
        let id = Uuid::new_v4();
        self.connections.insert(id, ConnectionHandle::new(sender));
        tracing::debug!(connection_id = %id, total = self.connections.len(), "Connection added");
        id
    }

    pub fn remove(&self, id: Uuid) {
        if self.connections.remove(&id).is_some() {
            tracing::debug!(connection_id = %id, total = self.connections.len(), "Connection removed");
        }
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    pub fn touch(&self, id: Uuid) {
        if let Some(handle) = self.connections.get(&id) {
            handle.touch();
        }
    }

    pub fn last_seen(&self, id: Uuid) -> Option<i64> {
        self.connections.get(&id).map(|h| h.last_seen())
    }

    /// Send to one connection. Returns false if it is gone.
    pub fn send_to(&self, id: Uuid, msg: ServerMessage) -> bool {
        match self.connections.get(&id) {
            Some(handle) => handle.send(msg).is_ok(),
            None => false,
        }
    }

    pub fn record_hello(&self, id: Uuid, hello: &Hello) {
        if let Some(handle) = self.connections.get(&id) {
            handle.with_diagnostics(|d| {
                d.client_id = hello.client_id.clone();
                d.page = hello.page.clone();
                d.user_agent = hello.user_agent.clone();
            });
        }
    }

    pub fn record_heartbeat(&self, id: Uuid, heartbeat: PlayerHeartbeat, at_ms: i64, drift_secs: Option<f64>) {
        if let Some(handle) = self.connections.get(&id) {
            handle.with_diagnostics(|d| {
                d.heartbeat = Some(heartbeat);
                d.heartbeat_at = Some(at_ms);
                d.drift_secs = drift_secs;
            });
        }
    }

    pub fn record_event(&self, id: Uuid, event: &str) {
        if let Some(handle) = self.connections.get(&id) {
            handle.with_diagnostics(|d| d.last_event = Some(event.to_string()));
        }
    }

    pub fn record_adjustment(&self, id: Uuid) {
        if let Some(handle) = self.connections.get(&id) {
            handle.with_diagnostics(|d| d.adjustments_sent += 1);
        }
    }

    pub fn summaries(&self) -> Vec<ConnectionSummary> {
        let mut summaries: Vec<_> = self
            .connections
            .iter()
            .map(|entry| ConnectionSummary {
                connection_id: *entry.key(),
                connected_at: entry.value().connected_at,
                last_seen: entry.value().last_seen(),
                alive: entry.value().is_alive(),
                diagnostics: entry.value().diagnostics(),
            })
            .collect();
        summaries.sort_by_key(|s| s.connected_at);
        summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_remove() {
        let manager = ConnectionManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = manager.add(tx);
        assert_eq!(manager.count(), 1);
        manager.remove(id);
        assert_eq!(manager.count(), 0);
    }

    #[tokio::test]
    async fn test_send_to_reaches_only_target() {
        let manager = ConnectionManager::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = manager.add(tx_a);
        let _b = manager.add(tx_b);

        assert!(manager.send_to(a, ServerMessage::TimeSyncPong { t0: 1, t1: 2 }));
        assert_eq!(
            rx_a.recv().await,
            Some(ServerMessage::TimeSyncPong { t0: 1, t1: 2 })
        );
        assert!(rx_b.try_recv().is_err());
        assert!(!manager.send_to(Uuid::new_v4(), ServerMessage::TimeSyncPong { t0: 0, t1: 0 }));
    }

    #[test]
    fn test_diagnostics_are_recorded() {
        let manager = ConnectionManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = manager.add(tx);

        manager.record_hello(
            id,
            &Hello {
                client_id: Some("kiosk-1".into()),
                page: Some("/listen".into()),
                user_agent: None,
            },
        );
        manager.record_event(id, "stalled");
        manager.record_adjustment(id);

        let summary = &manager.summaries()[0];
        assert_eq!(summary.diagnostics.client_id.as_deref(), Some("kiosk-1"));
        assert_eq!(summary.diagnostics.last_event.as_deref(), Some("stalled"));
        assert_eq!(summary.diagnostics.adjustments_sent, 1);
    }
}
