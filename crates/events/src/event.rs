//! Typed execution events and their wire envelope.
//!
//! One variant per event kind; serde's tag/content encoding produces the
//! wire shape consumed by WebSocket clients and the relay:
//!
//! ```json
//! {"type": "job_started", "data": {"execution_id": 7, ...}, "timestamp": "..."}
//! ```

use serde::{Deserialize, Serialize};
use siphon_core::types::{DbId, Timestamp};

/// A state change emitted by the orchestrator or transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ExecutionEvent {
    ExecutionStarted {
        execution_id: DbId,
        batch_id: DbId,
        total_jobs: i32,
        concurrency: i32,
    },
    ExecutionPaused {
        execution_id: DbId,
    },
    ExecutionResumed {
        execution_id: DbId,
        /// Number of jobs re-queued by this resume.
        resumed_jobs: i32,
    },
    ExecutionStopped {
        execution_id: DbId,
    },
    ExecutionCompleted {
        execution_id: DbId,
        completed_jobs: i32,
        error_jobs: i32,
    },
    ExecutionStatsUpdated {
        execution_id: DbId,
        completed_jobs: i32,
        running_jobs: i32,
        queued_jobs: i32,
        error_jobs: i32,
    },
    JobStarted {
        execution_id: DbId,
        job_id: DbId,
        batch_id: DbId,
        /// 1-based session attempt number.
        attempt: i32,
    },
    JobProgress {
        execution_id: DbId,
        job_id: DbId,
        percent: i16,
        step: Option<String>,
    },
    JobCompleted {
        execution_id: DbId,
        job_id: DbId,
        accuracy: Option<f64>,
    },
    JobFailed {
        execution_id: DbId,
        job_id: DbId,
        error: String,
    },
    JobRetry {
        execution_id: DbId,
        job_id: DbId,
        /// The attempt that just failed.
        attempt: i32,
        error_class: String,
    },
    ConcurrencyChanged {
        execution_id: DbId,
        concurrency: i32,
    },
}

impl ExecutionEvent {
    /// The wire-level type tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            ExecutionEvent::ExecutionStarted { .. } => "execution_started",
            ExecutionEvent::ExecutionPaused { .. } => "execution_paused",
            ExecutionEvent::ExecutionResumed { .. } => "execution_resumed",
            ExecutionEvent::ExecutionStopped { .. } => "execution_stopped",
            ExecutionEvent::ExecutionCompleted { .. } => "execution_completed",
            ExecutionEvent::ExecutionStatsUpdated { .. } => "execution_stats_updated",
            ExecutionEvent::JobStarted { .. } => "job_started",
            ExecutionEvent::JobProgress { .. } => "job_progress",
            ExecutionEvent::JobCompleted { .. } => "job_completed",
            ExecutionEvent::JobFailed { .. } => "job_failed",
            ExecutionEvent::JobRetry { .. } => "job_retry",
            ExecutionEvent::ConcurrencyChanged { .. } => "concurrency_changed",
        }
    }

    /// Every event correlates to exactly one execution.
    pub fn execution_id(&self) -> DbId {
        match self {
            ExecutionEvent::ExecutionStarted { execution_id, .. }
            | ExecutionEvent::ExecutionPaused { execution_id }
            | ExecutionEvent::ExecutionResumed { execution_id, .. }
            | ExecutionEvent::ExecutionStopped { execution_id }
            | ExecutionEvent::ExecutionCompleted { execution_id, .. }
            | ExecutionEvent::ExecutionStatsUpdated { execution_id, .. }
            | ExecutionEvent::JobStarted { execution_id, .. }
            | ExecutionEvent::JobProgress { execution_id, .. }
            | ExecutionEvent::JobCompleted { execution_id, .. }
            | ExecutionEvent::JobFailed { execution_id, .. }
            | ExecutionEvent::JobRetry { execution_id, .. }
            | ExecutionEvent::ConcurrencyChanged { execution_id, .. } => *execution_id,
        }
    }

    /// The job this event concerns, for job-level events.
    pub fn job_id(&self) -> Option<DbId> {
        match self {
            ExecutionEvent::JobStarted { job_id, .. }
            | ExecutionEvent::JobProgress { job_id, .. }
            | ExecutionEvent::JobCompleted { job_id, .. }
            | ExecutionEvent::JobFailed { job_id, .. }
            | ExecutionEvent::JobRetry { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }

    /// The batch this event concerns, where the payload carries one.
    pub fn batch_id(&self) -> Option<DbId> {
        match self {
            ExecutionEvent::ExecutionStarted { batch_id, .. }
            | ExecutionEvent::JobStarted { batch_id, .. } => Some(*batch_id),
            _ => None,
        }
    }
}

/// An [`ExecutionEvent`] stamped at publish time.
///
/// Immutable once published; this is exactly what goes over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(flatten)]
    pub event: ExecutionEvent,
    pub timestamp: Timestamp,
}

impl EventEnvelope {
    pub fn now(event: ExecutionEvent) -> Self {
        Self {
            event,
            timestamp: chrono::Utc::now(),
        }
    }
}
