use std::sync::Arc;
use std::time::Duration;

use crate::ws::manager::WsManager;
use crate::ws::protocol::ping_frame;

/// Interval between heartbeat sweeps (in seconds).
const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Spawn a background task that keeps WebSocket connections fresh.
///
/// Each sweep reaps connections that failed to answer the previous ping,
/// then sends a new `{"type":"ping"}` frame to the survivors. The task
/// runs until aborted via the returned `JoinHandle`.
pub fn start_heartbeat(ws_manager: Arc<WsManager>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
        let ping = ping_frame();

        loop {
            interval.tick().await;
            let (pinged, reaped) = ws_manager.sweep(&ping).await;
            if pinged > 0 || reaped > 0 {
                tracing::debug!(pinged, reaped, "WebSocket heartbeat sweep");
            }
        }
    })
}
