//! Repository for the `events` history table.

use sqlx::PgPool;
use siphon_core::types::{DbId, Timestamp};

use crate::models::event::StoredEvent;

/// Column list for `events` queries.
const COLUMNS: &str =
    "id, event_type, execution_id, job_id, batch_id, payload, created_at, expires_at";

/// Provides read/write operations for the durable event history.
pub struct EventRepo;

impl EventRepo {
    /// Insert a new event row, returning the generated ID.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert(
        pool: &PgPool,
        event_type: &str,
        execution_id: Option<DbId>,
        job_id: Option<DbId>,
        batch_id: Option<DbId>,
        payload: &serde_json::Value,
        expires_at: Timestamp,
    ) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO events \
                 (event_type, execution_id, job_id, batch_id, payload, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id",
        )
        .bind(event_type)
        .bind(execution_id)
        .bind(job_id)
        .bind(batch_id)
        .bind(payload)
        .bind(expires_at)
        .fetch_one(pool)
        .await
    }

    /// List events for an execution ordered newest-first.
    pub async fn list_for_execution(
        pool: &PgPool,
        execution_id: DbId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<StoredEvent>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM events \
             WHERE execution_id = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, StoredEvent>(&query)
            .bind(execution_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Delete every event whose expiry has passed.
    ///
    /// Returns the number of rows removed.
    pub async fn purge_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM events WHERE expires_at < NOW()")
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
