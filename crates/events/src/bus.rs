//! In-process event bus with best-effort external sinks.
//!
//! [`EventBus`] is the single place the orchestrator publishes to. A
//! publish does three independent things:
//!
//! 1. Broadcasts the envelope to every local subscriber (the WebSocket
//!    forwarder and anything else attached via [`EventBus::subscribe`]),
//!    returning the recipient count.
//! 2. Hands the envelope to the durable-history sink, if one is attached.
//! 3. Hands the envelope to the cross-process relay sink, if one is attached.
//!
//! Sink hand-offs are non-blocking channel sends into background tasks;
//! a full or closed sink is logged and the event dropped there. Local
//! broadcast is never blocked or failed by a sink.
//!
//! The bus is explicitly constructed and injected; there is no process-wide
//! global registry.

use tokio::sync::{broadcast, mpsc};

use crate::event::{EventEnvelope, ExecutionEvent};

/// Default buffer capacity for the local broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// Central publish/subscribe hub for execution events.
///
/// Designed to be shared via `Arc<EventBus>` across the application.
pub struct EventBus {
    local: broadcast::Sender<EventEnvelope>,
    history_tx: Option<mpsc::UnboundedSender<EventEnvelope>>,
    relay_tx: Option<mpsc::UnboundedSender<EventEnvelope>>,
}

impl EventBus {
    /// Create a bus with a specific local broadcast capacity and no sinks.
    pub fn new(capacity: usize) -> Self {
        let (local, _) = broadcast::channel(capacity);
        Self {
            local,
            history_tx: None,
            relay_tx: None,
        }
    }

    /// Attach the durable-history sink (see `EventPersistence`).
    pub fn with_history_sink(mut self, tx: mpsc::UnboundedSender<EventEnvelope>) -> Self {
        self.history_tx = Some(tx);
        self
    }

    /// Attach the cross-process relay sink (see `EventRelay`).
    pub fn with_relay_sink(mut self, tx: mpsc::UnboundedSender<EventEnvelope>) -> Self {
        self.relay_tx = Some(tx);
        self
    }

    /// Publish an event to all local subscribers and both sinks.
    ///
    /// Returns the number of local subscribers that received the event.
    /// Sink failures are logged and swallowed; they never affect the
    /// local broadcast or the return value.
    pub fn publish(&self, event: ExecutionEvent) -> usize {
        let envelope = EventEnvelope::now(event);

        if let Some(tx) = &self.history_tx {
            if tx.send(envelope.clone()).is_err() {
                tracing::warn!(
                    event_type = envelope.event.event_type(),
                    "History sink closed, event not persisted"
                );
            }
        }

        if let Some(tx) = &self.relay_tx {
            if tx.send(envelope.clone()).is_err() {
                tracing::warn!(
                    event_type = envelope.event.event_type(),
                    "Relay sink closed, event not relayed"
                );
            }
        }

        self.broadcast_local(envelope)
    }

    /// Deliver an envelope that arrived from another process's relay.
    ///
    /// Goes to local subscribers only — never back into the sinks, so a
    /// relayed event cannot be re-persisted or re-relayed.
    pub fn accept_relayed(&self, envelope: EventEnvelope) -> usize {
        self.broadcast_local(envelope)
    }

    /// Subscribe to every envelope that reaches this process.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.local.subscribe()
    }

    fn broadcast_local(&self, envelope: EventEnvelope) -> usize {
        // SendError only means there are zero local subscribers.
        self.local.send(envelope).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn paused_event() -> ExecutionEvent {
        ExecutionEvent::ExecutionPaused { execution_id: 1 }
    }

    #[tokio::test]
    async fn publish_reaches_every_subscriber_once() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let count = bus.publish(paused_event());
        assert_eq!(count, 2);

        assert_eq!(
            rx1.recv().await.unwrap().event.event_type(),
            "execution_paused"
        );
        assert_eq!(
            rx2.recv().await.unwrap().event.event_type(),
            "execution_paused"
        );
        // Exactly once: nothing further buffered.
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn publish_with_no_subscribers_returns_zero() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(paused_event()), 0);
    }

    #[tokio::test]
    async fn sinks_receive_published_events() {
        let (history_tx, mut history_rx) = mpsc::unbounded_channel();
        let (relay_tx, mut relay_rx) = mpsc::unbounded_channel();
        let bus = EventBus::default()
            .with_history_sink(history_tx)
            .with_relay_sink(relay_tx);

        bus.publish(paused_event());

        assert_eq!(
            history_rx.recv().await.unwrap().event.event_type(),
            "execution_paused"
        );
        assert_eq!(
            relay_rx.recv().await.unwrap().event.event_type(),
            "execution_paused"
        );
    }

    #[tokio::test]
    async fn closed_sinks_do_not_affect_local_broadcast() {
        let (history_tx, history_rx) = mpsc::unbounded_channel();
        let (relay_tx, relay_rx) = mpsc::unbounded_channel();
        // Both sink tasks are "dead".
        drop(history_rx);
        drop(relay_rx);

        let bus = EventBus::default()
            .with_history_sink(history_tx)
            .with_relay_sink(relay_tx);
        let mut rx = bus.subscribe();

        let count = bus.publish(paused_event());
        assert_eq!(count, 1);
        assert_eq!(
            rx.recv().await.unwrap().event.event_type(),
            "execution_paused"
        );
    }

    #[tokio::test]
    async fn relayed_envelopes_skip_the_sinks() {
        let (history_tx, mut history_rx) = mpsc::unbounded_channel();
        let (relay_tx, mut relay_rx) = mpsc::unbounded_channel();
        let bus = EventBus::default()
            .with_history_sink(history_tx)
            .with_relay_sink(relay_tx);
        let mut rx = bus.subscribe();

        let count = bus.accept_relayed(EventEnvelope::now(paused_event()));
        assert_eq!(count, 1);
        assert!(rx.try_recv().is_ok());
        assert!(history_rx.try_recv().is_err());
        assert!(relay_rx.try_recv().is_err());
    }
}
