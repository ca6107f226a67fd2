//! WebSocket upgrade handler
//!
//! Each connection gets a direct channel (for pongs and adjustments) and a
//! hub subscription (for broadcasts). A send task drains both and pings on
//! an interval; a receive task dispatches inbound frames. Whichever task
//! ends first tears the connection down.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::HeaderMap,
    response::Response,
};
use erwin_protocol::{ClientMessage, Connected, ErrorPayload, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};

use super::sync::{SyncError, SyncHandler};
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    tracing::debug!(user_agent = ?user_agent, "WebSocket upgrade requested");

    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(json) => Some(Message::Text(json)),
        Err(e) => {
            tracing::error!(error = %e, kind = message.kind(), "Failed to serialize message");
            None
        }
    }
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let connection_id = state.connections.add(tx);
    // Subscribe before CONNECTED so nothing published after it is missed
    let mut hub_receiver = state.ctx.hub.subscribe();

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let connected = ServerMessage::Connected(Connected {
        connection_id,
        server_now: state.ctx.now_ms(),
    });
    if let Some(frame) = encode(&connected) {
        if ws_sender.send(frame).await.is_err() {
            tracing::warn!(connection_id = %connection_id, "Failed to send connected message");
            state.connections.remove(connection_id);
            return;
        }
    }
    tracing::info!(
        connection_id = %connection_id,
        total = state.connections.count(),
        "WebSocket connection established"
    );

    let realtime = state.config.realtime.clone();
    let connections = state.connections.clone();
    let mut send_task = tokio::spawn(async move {
        let mut ping = tokio::time::interval(realtime.ping_interval);
        ping.tick().await;
        let idle_timeout_ms = realtime.idle_timeout.as_millis() as i64;

        loop {
            let outbound = tokio::select! {
                Some(msg) = rx.recv() => encode(&msg),
                result = hub_receiver.recv() => match result {
                    Ok(msg) => encode(&msg),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(connection_id = %connection_id, lagged = n, "Broadcast receiver lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!(connection_id = %connection_id, "Broadcast channel closed");
                        break;
                    }
                },
                _ = ping.tick() => {
                    let last_seen = connections.last_seen(connection_id).unwrap_or(0);
                    let now = chrono::Utc::now().timestamp_millis();
                    if now - last_seen > idle_timeout_ms {
                        tracing::info!(connection_id = %connection_id, idle_ms = now - last_seen, "Evicting idle connection");
                        let _ = ws_sender.send(Message::Close(None)).await;
                        break;
                    }
                    Some(Message::Ping(Vec::new()))
                }
                else => break,
            };

            if let Some(frame) = outbound {
                if ws_sender.send(frame).await.is_err() {
                    tracing::debug!(connection_id = %connection_id, "WebSocket send failed");
                    break;
                }
            }
        }
    });

    let sync_handler = SyncHandler::new(
        connection_id,
        state.ctx.clone(),
        state.connections.clone(),
        state.config.realtime.adjust_threshold_secs,
    );
    let connections = state.connections.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            // Any inbound frame counts as liveness
            connections.touch(connection_id);
            match result {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => {
                        if let Err(e) = sync_handler.handle_message(msg).await {
                            tracing::warn!(
                                error = %e,
                                connection_id = %connection_id,
                                "Error handling client message"
                            );
                            if matches!(e, SyncError::Database(_)) {
                                let _ = sync_handler.send(ServerMessage::Error(ErrorPayload::internal()));
                            }
                        }
                    }
                    Err(e) => {
                        tracing::debug!(
                            error = %e,
                            connection_id = %connection_id,
                            "Failed to parse client message"
                        );
                        let _ = sync_handler
                            .send(ServerMessage::Error(ErrorPayload::invalid_message(e.to_string())));
                    }
                },
                Ok(Message::Binary(_)) => {
                    tracing::debug!(connection_id = %connection_id, "Received unsupported binary message");
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    tracing::trace!(connection_id = %connection_id, "Received ping/pong");
                }
                Ok(Message::Close(_)) => {
                    tracing::debug!(connection_id = %connection_id, "WebSocket close received");
                    break;
                }
                Err(e) => {
                    tracing::debug!(error = %e, connection_id = %connection_id, "WebSocket error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
            recv_task.abort();
        }
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
            send_task.abort();
        }
    }

    state.connections.remove(connection_id);
    tracing::info!(
        connection_id = %connection_id,
        total = state.connections.count(),
        "WebSocket connection closed"
    );
}
