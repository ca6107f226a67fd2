//! Fan-out of server events to every connected listener
//!
//! Delivery is fire-and-forget and at-most-once: there is no acknowledgment
//! and no replay. A subscriber that falls more than [`BROADCAST_CAPACITY`]
//! events behind skips the missed ones, and a listener that reconnects must
//! pull full state.

use erwin_protocol::ServerMessage;
use tokio::sync::broadcast;

/// Channel capacity for the broadcast channel
pub const BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct BroadcastHub {
    sender: broadcast::Sender<ServerMessage>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::with_capacity(BROADCAST_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to everyone currently subscribed. Returns how many
    /// subscribers the event was queued for.
    pub fn publish(&self, message: ServerMessage) -> usize {
        let kind = message.kind();
        match self.sender.send(message) {
            Ok(receivers) => {
                tracing::trace!(kind, receivers, "Broadcast event");
                receivers
            }
            // No subscribers
            Err(_) => 0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use erwin_protocol::{PlayState, PoolUpdate, StateUpdate};

    fn state_update(now: i64) -> ServerMessage {
        ServerMessage::StateUpdate(StateUpdate {
            play_state: PlayState::stopped(now),
            current_track: None,
            server_now: now,
            queue: None,
        })
    }

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let hub = BroadcastHub::new();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        assert_eq!(hub.publish(state_update(1)), 2);

        assert_eq!(a.recv().await.unwrap(), state_update(1));
        assert_eq!(b.recv().await.unwrap(), state_update(1));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let hub = BroadcastHub::new();
        assert_eq!(hub.publish(state_update(1)), 0);

        // A late subscriber has no replay
        let mut late = hub.subscribe();
        assert!(late.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_events() {
        let hub = BroadcastHub::with_capacity(2);
        let mut rx = hub.subscribe();
        for now in 0..5 {
            hub.publish(state_update(now));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
        assert_eq!(rx.recv().await.unwrap(), state_update(3));
    }

    #[test]
    fn test_subscriber_count_tracks_drops() {
        let hub = BroadcastHub::new();
        let rx = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
        drop(rx);
        assert_eq!(hub.subscriber_count(), 0);
        hub.publish(ServerMessage::PoolUpdate(PoolUpdate { pool: vec![] }));
    }
}
