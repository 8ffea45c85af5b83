//! WebSocket connection registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::Message;
use siphon_core::types::Timestamp;
use tokio::sync::{mpsc, RwLock};

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Metadata for a single WebSocket connection.
pub struct WsConnection {
    /// Channel sender for outbound messages to this connection.
    pub sender: WsSender,
    /// Cleared when a ping is sent, set again by the client's pong. A
    /// connection still cleared at the next sweep is reaped.
    pub alive: AtomicBool,
    /// When this connection was established.
    pub connected_at: Timestamp,
}

/// Manages all active WebSocket connections.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application.
pub struct WsManager {
    connections: RwLock<HashMap<String, WsConnection>>,
}

impl WsManager {
    /// Create a new, empty connection manager.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection.
    ///
    /// Returns the receiver half of the message channel so the caller can
    /// forward messages to the WebSocket sink.
    pub async fn add(&self, conn_id: String) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            sender: tx,
            alive: AtomicBool::new(true),
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    /// Remove a connection by its ID.
    pub async fn remove(&self, conn_id: &str) {
        self.connections.write().await.remove(conn_id);
    }

    /// Record a heartbeat acknowledgment from the client.
    pub async fn mark_alive(&self, conn_id: &str) {
        if let Some(conn) = self.connections.read().await.get(conn_id) {
            conn.alive.store(true, Ordering::SeqCst);
        }
    }

    /// Send a message to a single connection.
    ///
    /// Returns `false` when the connection is unknown or its channel is
    /// closed.
    pub async fn send_to(&self, conn_id: &str, message: Message) -> bool {
        match self.connections.read().await.get(conn_id) {
            Some(conn) => conn.sender.send(message).is_ok(),
            None => false,
        }
    }

    /// Broadcast a message to all connected clients.
    ///
    /// The message is serialized once by the caller; connections whose
    /// send channels are closed are silently skipped. Returns the number
    /// of connections the message was delivered to.
    pub async fn broadcast(&self, message: Message) -> usize {
        let conns = self.connections.read().await;
        let mut count = 0;
        for conn in conns.values() {
            if conn.sender.send(message.clone()).is_ok() {
                count += 1;
            }
        }
        count
    }

    /// One heartbeat sweep: reap stale connections, then ping the rest.
    ///
    /// A connection that has not acknowledged since the previous sweep is
    /// sent a Close frame and dropped from the registry. Every surviving
    /// connection has its liveness flag cleared and receives `ping_text`.
    /// Returns `(pinged, reaped)` counts.
    pub async fn sweep(&self, ping_text: &str) -> (usize, usize) {
        let mut conns = self.connections.write().await;

        let stale: Vec<String> = conns
            .iter()
            .filter(|(_, conn)| !conn.alive.load(Ordering::SeqCst))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            if let Some(conn) = conns.remove(id) {
                let _ = conn.sender.send(Message::Close(None));
            }
            tracing::info!(conn_id = %id, "Reaped unresponsive WebSocket connection");
        }

        let mut pinged = 0;
        for conn in conns.values() {
            conn.alive.store(false, Ordering::SeqCst);
            if conn
                .sender
                .send(Message::Text(ping_text.to_string().into()))
                .is_ok()
            {
                pinged += 1;
            }
        }
        (pinged, stale.len())
    }

    /// Return the current number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a Close frame to every connection, then clear the map.
    ///
    /// Used during graceful shutdown to notify all clients before the
    /// server stops accepting new connections.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}
