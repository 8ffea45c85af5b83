//! Repository for the `extraction_sessions` table.
//!
//! Sessions are append-only: one row per execution attempt of a job,
//! created here with the next attempt number and never deleted.

use sqlx::PgPool;
use siphon_core::types::DbId;

use crate::models::session::ExtractionSession;
use crate::models::status::SessionStatus;

/// Column list for `extraction_sessions` queries.
const COLUMNS: &str = "\
    id, job_id, execution_id, attempt, status_id, extracted_data, \
    error_message, retry_breadcrumbs, logs, streaming_url, accuracy, \
    started_at, ended_at, created_at";

/// Provides operations for extraction sessions.
pub struct SessionRepo;

impl SessionRepo {
    /// Open a new session for a job under an execution.
    ///
    /// The attempt number is derived from the number of existing sessions
    /// for the job, so the sequence stays dense across resumes.
    pub async fn create(
        pool: &PgPool,
        job_id: DbId,
        execution_id: DbId,
    ) -> Result<ExtractionSession, sqlx::Error> {
        let query = format!(
            "INSERT INTO extraction_sessions (job_id, execution_id, attempt, status_id) \
             VALUES ($1, $2, \
                 (SELECT COUNT(*) + 1 FROM extraction_sessions WHERE job_id = $1), $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ExtractionSession>(&query)
            .bind(job_id)
            .bind(execution_id)
            .bind(SessionStatus::Running.id())
            .fetch_one(pool)
            .await
    }

    /// List all sessions for a job, oldest attempt first.
    pub async fn list_for_job(
        pool: &PgPool,
        job_id: DbId,
    ) -> Result<Vec<ExtractionSession>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM extraction_sessions WHERE job_id = $1 ORDER BY attempt");
        sqlx::query_as::<_, ExtractionSession>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }

    /// Record the live browser-stream URL reported by the agent.
    pub async fn set_streaming_url(
        pool: &PgPool,
        id: DbId,
        streaming_url: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE extraction_sessions SET streaming_url = $2 WHERE id = $1")
            .bind(id)
            .bind(streaming_url)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Append a retry breadcrumb to the session's breadcrumb array.
    pub async fn append_breadcrumb(
        pool: &PgPool,
        id: DbId,
        breadcrumb: &serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE extraction_sessions \
             SET retry_breadcrumbs = retry_breadcrumbs || $2::jsonb \
             WHERE id = $1",
        )
        .bind(id)
        .bind(serde_json::json!([breadcrumb]))
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Close the session as completed, with extracted data and agent logs.
    pub async fn complete(
        pool: &PgPool,
        id: DbId,
        extracted_data: Option<&serde_json::Value>,
        logs: Option<&serde_json::Value>,
        accuracy: Option<f64>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE extraction_sessions \
             SET status_id = $2, extracted_data = $3, logs = $4, accuracy = $5, ended_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(SessionStatus::Completed.id())
        .bind(extracted_data)
        .bind(logs)
        .bind(accuracy)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Close the session as failed.
    pub async fn fail(
        pool: &PgPool,
        id: DbId,
        error: &str,
        logs: Option<&serde_json::Value>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE extraction_sessions \
             SET status_id = $2, error_message = $3, logs = $4, ended_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(SessionStatus::Error.id())
        .bind(error)
        .bind(logs)
        .execute(pool)
        .await?;
        Ok(())
    }
}
