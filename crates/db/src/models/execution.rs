//! Execution entity: one run of a batch under one concurrency/retry policy.

use serde::Serialize;
use siphon_core::types::{DbId, Timestamp};
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `executions` table.
///
/// The `*_jobs` counters are targeted-update fields owned by the
/// orchestrator while the execution is active; readers should treat them
/// as eventually consistent with the job rows. `completed_jobs` counts
/// settled jobs (successful or errored); `error_jobs` is the errored
/// subset.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Execution {
    pub id: DbId,
    pub batch_id: DbId,
    pub status_id: StatusId,
    pub concurrency: i32,
    pub total_jobs: i32,
    pub completed_jobs: i32,
    pub running_jobs: i32,
    pub queued_jobs: i32,
    pub error_jobs: i32,
    pub started_at: Option<Timestamp>,
    pub paused_at: Option<Timestamp>,
    pub resumed_at: Option<Timestamp>,
    pub stopped_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub last_activity_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Aggregate counter snapshot written back by the orchestrator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionStats {
    pub completed_jobs: i32,
    pub running_jobs: i32,
    pub queued_jobs: i32,
    pub error_jobs: i32,
}
