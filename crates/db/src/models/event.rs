//! Stored execution event entity.

use serde::Serialize;
use siphon_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `events` table.
///
/// Immutable once written; rows past `expires_at` are removed by the
/// retention purge loop.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StoredEvent {
    pub id: DbId,
    pub event_type: String,
    pub execution_id: Option<DbId>,
    pub job_id: Option<DbId>,
    pub batch_id: Option<DbId>,
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}
