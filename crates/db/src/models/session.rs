//! Extraction session entity: one execution attempt of a job.
//!
//! Sessions are append-only. Every admission of a job creates a new row
//! with the next attempt number; rows are never deleted, so the complete
//! attempt history is retained for audit after the job settles.

use serde::Serialize;
use siphon_core::types::{DbId, Timestamp};
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `extraction_sessions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ExtractionSession {
    pub id: DbId,
    pub job_id: DbId,
    pub execution_id: DbId,
    /// 1-based attempt number, unique per job.
    pub attempt: i32,
    pub status_id: StatusId,
    pub extracted_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    /// JSON array of retry breadcrumbs appended by the backoff hook.
    pub retry_breadcrumbs: serde_json::Value,
    /// Raw log lines reported by the extraction agent.
    pub logs: Option<serde_json::Value>,
    /// Live browser-stream URL while the agent is working.
    pub streaming_url: Option<String>,
    pub accuracy: Option<f64>,
    pub started_at: Timestamp,
    pub ended_at: Option<Timestamp>,
    pub created_at: Timestamp,
}
