//! Cross-process event relay over Postgres NOTIFY/LISTEN.
//!
//! Processes sharing a database fan events out to each other through a
//! single notification channel. The publisher side drains the bus's relay
//! sink and `pg_notify`s each envelope wrapped in a [`RelayFrame`]; the
//! consumer side listens on the same channel and re-broadcasts foreign
//! frames to local subscribers only.
//!
//! Delivery is best-effort and at-most-once: a failed NOTIFY drops the
//! event, there is no replay on reconnect, and no dedup key. When no relay
//! channel is configured the system degrades to single-process mode with
//! no error.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use siphon_db::DbPool;

use crate::bus::EventBus;
use crate::event::EventEnvelope;

/// Wait before retrying after a listener error.
const LISTEN_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Wire wrapper for relayed envelopes.
///
/// `origin` identifies the publishing process so consumers can skip their
/// own frames — NOTIFY delivers to every listener on the channel,
/// including the sender's connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayFrame {
    pub origin: Uuid,
    #[serde(flatten)]
    pub envelope: EventEnvelope,
}

/// Cross-process relay endpoint (both publisher and consumer halves).
pub struct EventRelay {
    channel: String,
    origin: Uuid,
}

impl EventRelay {
    /// Create a relay bound to a notification channel name.
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            origin: Uuid::new_v4(),
        }
    }

    /// Whether a frame came from a different process.
    fn is_foreign(&self, frame: &RelayFrame) -> bool {
        frame.origin != self.origin
    }

    /// Drain the relay sink and NOTIFY each envelope.
    ///
    /// Exits when the sink channel closes. Failures are logged and the
    /// event dropped; the relay never pushes back on the publisher.
    pub async fn run_publisher(
        &self,
        pool: DbPool,
        mut receiver: mpsc::UnboundedReceiver<EventEnvelope>,
    ) {
        while let Some(envelope) = receiver.recv().await {
            let frame = RelayFrame {
                origin: self.origin,
                envelope,
            };
            let payload = match serde_json::to_string(&frame) {
                Ok(p) => p,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize relay frame");
                    continue;
                }
            };

            if let Err(e) = sqlx::query("SELECT pg_notify($1, $2)")
                .bind(&self.channel)
                .bind(&payload)
                .execute(&pool)
                .await
            {
                tracing::warn!(
                    error = %e,
                    event_type = frame.envelope.event.event_type(),
                    "Relay publish failed, event dropped"
                );
            }
        }
        tracing::info!("Relay sink closed, relay publisher shutting down");
    }

    /// Listen for foreign frames and re-broadcast them locally.
    ///
    /// Relayed events go through [`EventBus::accept_relayed`], never back
    /// into the sinks, so they cannot loop. Runs until cancelled.
    pub async fn run_consumer(&self, pool: DbPool, bus: Arc<EventBus>, cancel: CancellationToken) {
        let mut listener = match PgListener::connect_with(&pool).await {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(error = %e, "Relay listener failed to connect; cross-process fan-out disabled");
                return;
            }
        };
        if let Err(e) = listener.listen(&self.channel).await {
            tracing::error!(error = %e, channel = %self.channel, "Relay LISTEN failed; cross-process fan-out disabled");
            return;
        }

        tracing::info!(channel = %self.channel, "Relay consumer listening");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Relay consumer cancelled");
                    break;
                }
                notification = listener.recv() => {
                    match notification {
                        Ok(n) => self.handle_notification(n.payload(), &bus),
                        Err(e) => {
                            // PgListener re-establishes its connection on the
                            // next recv; just avoid a hot error loop.
                            tracing::warn!(error = %e, "Relay listener error");
                            tokio::time::sleep(LISTEN_RETRY_DELAY).await;
                        }
                    }
                }
            }
        }
    }

    fn handle_notification(&self, payload: &str, bus: &EventBus) {
        let frame: RelayFrame = match serde_json::from_str(payload) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed relay frame");
                return;
            }
        };

        if !self.is_foreign(&frame) {
            return;
        }

        let count = bus.accept_relayed(frame.envelope);
        tracing::trace!(count, "Re-broadcast relayed event");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
