//! Bus-to-socket event forwarder.
//!
//! Subscribes to the event bus and pushes every envelope to all connected
//! WebSocket clients. Each envelope is serialized exactly once and the
//! same text frame is fanned out to every open connection.

use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::broadcast;

use siphon_events::EventBus;

use crate::ws::manager::WsManager;

/// Spawn the forwarder task. Exits when the bus is dropped.
pub fn start_event_forwarder(
    bus: Arc<EventBus>,
    ws_manager: Arc<WsManager>,
) -> tokio::task::JoinHandle<()> {
    let mut receiver = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(envelope) => {
                    let text = match serde_json::to_string(&envelope) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to serialize event envelope");
                            continue;
                        }
                    };
                    let count = ws_manager.broadcast(Message::Text(text.into())).await;
                    tracing::trace!(
                        event_type = envelope.event.event_type(),
                        count,
                        "Event fanned out to WebSocket clients",
                    );
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event forwarder lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, forwarder shutting down");
                    break;
                }
            }
        }
    })
}
