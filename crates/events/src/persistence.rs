//! Durable event persistence and retention pruning.
//!
//! [`EventPersistence`] drains the bus's history sink channel and writes
//! every envelope to the `events` table with a computed expiry and the
//! correlation ids extracted from the payload. It runs as a long-lived
//! background task and exits when the sink channel closes.
//!
//! History is for filtered queries after the fact; it is not replayed into
//! live transports on reconnect.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use siphon_core::types::DbId;
use siphon_db::repositories::EventRepo;
use siphon_db::DbPool;

use crate::event::EventEnvelope;

/// How often the purge loop removes expired events.
const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Background service that persists execution events to the database.
pub struct EventPersistence;

impl EventPersistence {
    /// Run the persistence loop.
    ///
    /// Each received envelope is written with
    /// `expires_at = timestamp + retention_days`. Write failures are
    /// logged and the event dropped; persistence must never push back on
    /// the publisher.
    pub async fn run(
        pool: DbPool,
        retention_days: i64,
        mut receiver: mpsc::UnboundedReceiver<EventEnvelope>,
    ) {
        while let Some(envelope) = receiver.recv().await {
            if let Err(e) = Self::persist(&pool, retention_days, &envelope).await {
                tracing::error!(
                    error = %e,
                    event_type = envelope.event.event_type(),
                    "Failed to persist event"
                );
            }
        }
        tracing::info!("History sink closed, event persistence shutting down");
    }

    /// Run the retention purge loop until cancelled.
    pub async fn run_purge(pool: DbPool, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Event purge loop cancelled");
                    break;
                }
                _ = interval.tick() => {
                    match EventRepo::purge_expired(&pool).await {
                        Ok(0) => {}
                        Ok(count) => tracing::info!(count, "Purged expired events"),
                        Err(e) => tracing::error!(error = %e, "Failed to purge expired events"),
                    }
                }
            }
        }
    }

    /// Write a single envelope to the `events` table.
    async fn persist(
        pool: &DbPool,
        retention_days: i64,
        envelope: &EventEnvelope,
    ) -> Result<DbId, PersistError> {
        let payload = serde_json::to_value(envelope)?;
        let expires_at = envelope.timestamp + chrono::Duration::days(retention_days);

        let id = EventRepo::insert(
            pool,
            envelope.event.event_type(),
            Some(envelope.event.execution_id()),
            envelope.event.job_id(),
            envelope.event.batch_id(),
            &payload,
            expires_at,
        )
        .await?;
        Ok(id)
    }
}

/// Internal error type for a single persist attempt.
#[derive(Debug, thiserror::Error)]
enum PersistError {
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("database write failed: {0}")]
    Database(#[from] sqlx::Error),
}
