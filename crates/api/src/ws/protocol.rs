//! Control frames of the transport wire protocol.
//!
//! All control traffic is JSON text frames. On connect the server sends a
//! `connected` handshake; afterwards `ping`/`pong` frames keep the
//! connection alive. Every other frame on the wire is one serialized
//! execution event envelope.

use serde::{Deserialize, Serialize};
use siphon_core::types::Timestamp;

/// Server -> client handshake sent immediately after the upgrade.
#[derive(Debug, Serialize)]
pub struct ConnectedFrame {
    /// Always `"connected"`.
    pub r#type: &'static str,
    pub client_id: String,
    pub timestamp: Timestamp,
}

impl ConnectedFrame {
    pub fn new(client_id: String) -> Self {
        Self {
            r#type: "connected",
            client_id,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// The heartbeat ping frame, serialized once per sweep.
pub fn ping_frame() -> String {
    r#"{"type":"ping"}"#.to_string()
}

/// The heartbeat pong frame.
pub fn pong_frame() -> String {
    r#"{"type":"pong"}"#.to_string()
}

/// Client -> server control frames.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Ping,
    Pong,
}

/// Parse an inbound text frame as a control frame, if it is one.
pub fn parse_client_frame(text: &str) -> Option<ClientFrame> {
    serde_json::from_str(text).ok()
}
