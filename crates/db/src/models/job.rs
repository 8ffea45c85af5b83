//! Job entity: one extraction target within a batch.

use serde::{Deserialize, Serialize};
use siphon_core::types::{DbId, Timestamp};
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub batch_id: DbId,
    /// The execution currently (or most recently) driving this job.
    pub execution_id: Option<DbId>,
    pub status_id: StatusId,
    pub target_url: String,
    pub instructions: String,
    pub extraction_schema: serde_json::Value,
    /// Reference output for accuracy scoring, when the batch carries one.
    pub ground_truth: Option<serde_json::Value>,
    pub progress_percent: i16,
    pub current_step: Option<String>,
    pub retry_count: i32,
    /// Accuracy report produced when ground truth is present.
    pub evaluation: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for seeding a batch with jobs.
#[derive(Debug, Deserialize)]
pub struct CreateJob {
    pub target_url: String,
    pub instructions: String,
    pub extraction_schema: serde_json::Value,
    pub ground_truth: Option<serde_json::Value>,
}
