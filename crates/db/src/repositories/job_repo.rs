//! Repository for the `jobs` table.

use sqlx::PgPool;
use siphon_core::types::DbId;

use crate::models::job::{CreateJob, Job};
use crate::models::status::JobStatus;

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, batch_id, execution_id, status_id, target_url, instructions, \
    extraction_schema, ground_truth, progress_percent, current_step, \
    retry_count, evaluation, error_message, \
    started_at, completed_at, created_at, updated_at";

/// Provides CRUD operations for extraction jobs.
pub struct JobRepo;

impl JobRepo {
    /// Seed a batch with a new queued job.
    pub async fn create(
        pool: &PgPool,
        batch_id: DbId,
        input: &CreateJob,
    ) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs \
                 (batch_id, status_id, target_url, instructions, extraction_schema, ground_truth) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(batch_id)
            .bind(JobStatus::Queued.id())
            .bind(&input.target_url)
            .bind(&input.instructions)
            .bind(&input.extraction_schema)
            .bind(&input.ground_truth)
            .fetch_one(pool)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List all jobs in a batch in submission order.
    pub async fn list_for_batch(pool: &PgPool, batch_id: DbId) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE batch_id = $1 ORDER BY id");
        sqlx::query_as::<_, Job>(&query)
            .bind(batch_id)
            .fetch_all(pool)
            .await
    }

    /// List jobs in a batch that have not settled (still queued or running).
    ///
    /// Used by resume to find the exact subset left behind by a pause.
    pub async fn list_unsettled_for_batch(
        pool: &PgPool,
        batch_id: DbId,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE batch_id = $1 AND status_id IN ($2, $3) \
             ORDER BY id"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(batch_id)
            .bind(JobStatus::Queued.id())
            .bind(JobStatus::Running.id())
            .fetch_all(pool)
            .await
    }

    /// Reset every unsettled job in a batch back to queued.
    ///
    /// Returns the number of jobs reset.
    pub async fn reset_unsettled_to_queued(
        pool: &PgPool,
        batch_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, updated_at = NOW() \
             WHERE batch_id = $1 AND status_id IN ($2, $3)",
        )
        .bind(batch_id)
        .bind(JobStatus::Queued.id())
        .bind(JobStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Mark a job running under an execution, stamping `started_at`.
    pub async fn mark_running(
        pool: &PgPool,
        id: DbId,
        execution_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, execution_id = $3, started_at = NOW(), \
                 progress_percent = 0, current_step = NULL, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(JobStatus::Running.id())
        .bind(execution_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Update progress percentage and the current step description.
    pub async fn update_progress(
        pool: &PgPool,
        id: DbId,
        percent: i16,
        step: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs \
             SET progress_percent = $2, current_step = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(percent)
        .bind(step)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark a job completed, with an optional accuracy evaluation.
    pub async fn complete(
        pool: &PgPool,
        id: DbId,
        evaluation: Option<&serde_json::Value>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, evaluation = $3, progress_percent = 100, \
                 completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(JobStatus::Completed.id())
        .bind(evaluation)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark a job failed with an error message.
    pub async fn fail(pool: &PgPool, id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, error_message = $3, completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(JobStatus::Error.id())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Bump the retry counter after a failed attempt.
    pub async fn increment_retry(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE jobs SET retry_count = retry_count + 1, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
