use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use crate::state::AppState;
use crate::ws::manager::WsManager;
use crate::ws::protocol::{parse_client_frame, pong_frame, ClientFrame, ConnectedFrame};

/// HTTP handler that upgrades the connection to WebSocket.
///
/// After the upgrade the connection is registered with `WsManager` and
/// managed by two spawned tasks (sender + receiver).
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.ws_manager))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the connection with `WsManager`.
///   2. Sends the `connected` handshake.
///   3. Spawns a sender task that forwards messages from the manager channel.
///   4. Processes inbound control frames on the current task.
///   5. Cleans up on disconnect.
async fn handle_socket(socket: WebSocket, ws_manager: Arc<WsManager>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "WebSocket connected");

    // Register and get the receiver for outbound messages.
    let mut rx = ws_manager.add(conn_id.clone()).await;

    // Handshake: tell the client its assigned id.
    let handshake = ConnectedFrame::new(conn_id.clone());
    match serde_json::to_string(&handshake) {
        Ok(text) => {
            ws_manager.send_to(&conn_id, Message::Text(text.into())).await;
        }
        Err(e) => {
            tracing::error!(conn_id = %conn_id, error = %e, "Failed to serialize handshake");
        }
    }

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel messages to the WebSocket sink.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    // Receiver loop: process inbound control frames.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => match parse_client_frame(&text) {
                Some(ClientFrame::Pong) => {
                    ws_manager.mark_alive(&conn_id).await;
                }
                Some(ClientFrame::Ping) => {
                    ws_manager
                        .send_to(&conn_id, Message::Text(pong_frame().into()))
                        .await;
                }
                None => {
                    tracing::trace!(conn_id = %conn_id, "Ignoring non-control client frame");
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    // Clean up: remove connection and abort sender task.
    ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}
