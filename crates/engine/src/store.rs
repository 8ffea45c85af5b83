//! Persistence boundary consumed by the orchestrator.
//!
//! The orchestrator never talks to the database directly; it goes through
//! [`ExecutionStore`], whose methods are the targeted per-row field updates
//! the engine needs. [`crate::PgStore`] is the production implementation;
//! tests drive the orchestrator against an in-memory double.

use async_trait::async_trait;
use siphon_core::types::DbId;
use siphon_db::models::execution::{Execution, ExecutionStats};
use siphon_db::models::job::Job;
use siphon_db::models::session::ExtractionSession;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from the persistence boundary.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying storage engine failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A referenced row does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: DbId },
}

/// Targeted read/update operations over executions, jobs, and sessions.
///
/// Lifecycle transition methods return `Ok(false)` when the row was not in
/// the required source state, so callers can distinguish an illegal
/// transition from a storage failure.
#[async_trait]
pub trait ExecutionStore: Send + Sync + 'static {
    async fn get_execution(&self, id: DbId) -> StoreResult<Execution>;
    async fn mark_execution_started(&self, id: DbId) -> StoreResult<bool>;
    async fn mark_execution_paused(&self, id: DbId) -> StoreResult<bool>;
    async fn mark_execution_resumed(&self, id: DbId) -> StoreResult<bool>;
    async fn mark_execution_stopped(&self, id: DbId) -> StoreResult<bool>;
    async fn mark_execution_completed(&self, id: DbId) -> StoreResult<bool>;
    async fn mark_execution_error(&self, id: DbId) -> StoreResult<()>;
    async fn update_execution_stats(&self, id: DbId, stats: ExecutionStats) -> StoreResult<()>;
    async fn update_execution_concurrency(&self, id: DbId, concurrency: i32) -> StoreResult<()>;

    async fn list_jobs_for_batch(&self, batch_id: DbId) -> StoreResult<Vec<Job>>;
    /// Jobs still queued or running, in submission order.
    async fn list_unsettled_jobs(&self, batch_id: DbId) -> StoreResult<Vec<Job>>;
    /// Reset queued/running jobs back to queued; returns how many changed.
    async fn reset_unsettled_jobs(&self, batch_id: DbId) -> StoreResult<u64>;
    async fn mark_job_running(&self, id: DbId, execution_id: DbId) -> StoreResult<()>;
    async fn update_job_progress(
        &self,
        id: DbId,
        percent: i16,
        step: Option<&str>,
    ) -> StoreResult<()>;
    async fn complete_job(
        &self,
        id: DbId,
        evaluation: Option<&serde_json::Value>,
    ) -> StoreResult<()>;
    async fn fail_job(&self, id: DbId, error: &str) -> StoreResult<()>;
    async fn increment_job_retry(&self, id: DbId) -> StoreResult<()>;

    /// Open a new append-only session (next attempt number) for a job.
    async fn create_session(&self, job_id: DbId, execution_id: DbId)
        -> StoreResult<ExtractionSession>;
    async fn set_session_streaming_url(&self, id: DbId, url: &str) -> StoreResult<()>;
    async fn append_session_breadcrumb(
        &self,
        id: DbId,
        breadcrumb: &serde_json::Value,
    ) -> StoreResult<()>;
    async fn complete_session(
        &self,
        id: DbId,
        extracted_data: Option<&serde_json::Value>,
        logs: Option<&serde_json::Value>,
        accuracy: Option<f64>,
    ) -> StoreResult<()>;
    async fn fail_session(
        &self,
        id: DbId,
        error: &str,
        logs: Option<&serde_json::Value>,
    ) -> StoreResult<()>;

    /// Trigger the external metrics snapshot for a finished execution.
    async fn record_metrics_snapshot(&self, execution_id: DbId) -> StoreResult<()>;
}
