//! Repository for the `executions` table.
//!
//! Lifecycle transitions are expressed as conditional `UPDATE`s guarded by
//! the current status, so an illegal transition (e.g. resuming a stopped
//! execution) affects zero rows and the caller sees `false`. No magic
//! numbers — every status literal is a named enum constant.

use sqlx::PgPool;
use siphon_core::types::DbId;

use crate::models::execution::{Execution, ExecutionStats};
use crate::models::status::ExecutionStatus;

/// Column list for `executions` queries.
const COLUMNS: &str = "\
    id, batch_id, status_id, concurrency, \
    total_jobs, completed_jobs, running_jobs, queued_jobs, error_jobs, \
    started_at, paused_at, resumed_at, stopped_at, completed_at, \
    last_activity_at, created_at, updated_at";

/// Provides CRUD operations for executions.
pub struct ExecutionRepo;

impl ExecutionRepo {
    /// Create a pending execution for a batch.
    pub async fn create(
        pool: &PgPool,
        batch_id: DbId,
        concurrency: i32,
        total_jobs: i32,
    ) -> Result<Execution, sqlx::Error> {
        let query = format!(
            "INSERT INTO executions (batch_id, status_id, concurrency, total_jobs, queued_jobs) \
             VALUES ($1, $2, $3, $4, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Execution>(&query)
            .bind(batch_id)
            .bind(ExecutionStatus::Pending.id())
            .bind(concurrency)
            .bind(total_jobs)
            .fetch_one(pool)
            .await
    }

    /// Find an execution by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Execution>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM executions WHERE id = $1");
        sqlx::query_as::<_, Execution>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Transition pending -> running, stamping `started_at`.
    ///
    /// Returns `false` if the execution was not pending.
    pub async fn mark_started(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE executions \
             SET status_id = $2, started_at = NOW(), last_activity_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(ExecutionStatus::Running.id())
        .bind(ExecutionStatus::Pending.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Transition running -> paused, stamping `paused_at`.
    pub async fn mark_paused(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE executions \
             SET status_id = $2, paused_at = NOW(), last_activity_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(ExecutionStatus::Paused.id())
        .bind(ExecutionStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Transition paused -> running, stamping `resumed_at`.
    pub async fn mark_resumed(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE executions \
             SET status_id = $2, resumed_at = NOW(), last_activity_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(ExecutionStatus::Running.id())
        .bind(ExecutionStatus::Paused.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Transition running|paused -> stopped (terminal), stamping `stopped_at`.
    pub async fn mark_stopped(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE executions \
             SET status_id = $2, stopped_at = NOW(), last_activity_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id IN ($3, $4)",
        )
        .bind(id)
        .bind(ExecutionStatus::Stopped.id())
        .bind(ExecutionStatus::Running.id())
        .bind(ExecutionStatus::Paused.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Transition running -> completed, stamping `completed_at`.
    ///
    /// Only fires while the execution is still running, so a pause or stop
    /// issued during the final job wins over natural completion.
    pub async fn mark_completed(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE executions \
             SET status_id = $2, completed_at = NOW(), last_activity_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(ExecutionStatus::Completed.id())
        .bind(ExecutionStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Force the execution into the terminal error state.
    ///
    /// Unconditional: an orchestration-level defect overrides whatever
    /// status the row currently has.
    pub async fn mark_error(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE executions \
             SET status_id = $2, last_activity_at = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(ExecutionStatus::Error.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Write back the orchestrator's in-memory aggregate counters.
    pub async fn update_stats(
        pool: &PgPool,
        id: DbId,
        stats: ExecutionStats,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE executions \
             SET completed_jobs = $2, running_jobs = $3, queued_jobs = $4, error_jobs = $5, \
                 last_activity_at = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(stats.completed_jobs)
        .bind(stats.running_jobs)
        .bind(stats.queued_jobs)
        .bind(stats.error_jobs)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Persist a new concurrency limit.
    pub async fn update_concurrency(
        pool: &PgPool,
        id: DbId,
        concurrency: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE executions SET concurrency = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(concurrency)
        .execute(pool)
        .await?;
        Ok(())
    }
}
