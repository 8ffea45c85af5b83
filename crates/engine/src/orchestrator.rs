//! Execution lifecycle orchestrator.
//!
//! Drives a batch of extraction jobs through the admission gate and the
//! retry wrapper, mutating execution/job/session rows through the
//! [`ExecutionStore`] boundary and publishing every state change on the
//! [`EventBus`].
//!
//! Lifecycle: pending -> running -> (paused <-> running) ->
//! stopped | completed | error. Stopped, completed, and error are
//! terminal. Pause and stop are cooperative: they are honored at the
//! admission point immediately before a job starts; jobs already admitted
//! always run to natural completion.
//!
//! Failure semantics: a failing job settles as a job error and never
//! aborts the batch; only an orchestration-level defect (a persistence
//! failure inside the control loop) marks the whole execution `error`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use siphon_agent::{ExtractionRequest, Extractor, ProgressUpdate};
use siphon_core::retry::{with_retry, RetryConfig, TaskError};
use siphon_core::scoring::score_accuracy;
use siphon_core::types::DbId;
use siphon_db::models::execution::{Execution, ExecutionStats};
use siphon_db::models::job::Job;
use siphon_db::models::status::ExecutionStatus;
use siphon_events::{EventBus, ExecutionEvent};

use crate::limiter::ConcurrencyLimiter;
use crate::store::{ExecutionStore, StoreError};

/// Per-run task configuration.
#[derive(Debug, Clone, Default)]
pub struct TaskConfig {
    pub retry: RetryConfig,
}

impl TaskConfig {
    pub fn new(retry: RetryConfig) -> Self {
        Self { retry }
    }
}

/// Errors fatal to an execution run.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The requested lifecycle action is not valid from the current state.
    #[error("Execution {execution_id}: cannot {action} from its current status")]
    InvalidTransition {
        execution_id: DbId,
        action: &'static str,
    },

    /// The execution row carries a status id outside the known set.
    #[error("Execution {execution_id} has unknown status id {status_id}")]
    UnknownStatus { execution_id: DbId, status_id: i16 },

    /// Concurrency limits below 1 are rejected.
    #[error("Concurrency must be at least 1, got {0}")]
    InvalidConcurrency(i32),

    /// A job task aborted without settling (a defect, not a task failure).
    #[error("Job task panicked: {0}")]
    JobPanic(String),
}

/// Orchestrates executions over a store, an extractor, and an event bus.
///
/// Cheap to clone; all state is shared behind `Arc`.
pub struct Orchestrator<S, X> {
    store: Arc<S>,
    extractor: Arc<X>,
    bus: Arc<EventBus>,
    /// Live admission gates keyed by execution id, for runtime resizes.
    limiters: Arc<Mutex<HashMap<DbId, Arc<ConcurrencyLimiter>>>>,
}

impl<S, X> Clone for Orchestrator<S, X> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            extractor: Arc::clone(&self.extractor),
            bus: Arc::clone(&self.bus),
            limiters: Arc::clone(&self.limiters),
        }
    }
}

impl<S, X> Orchestrator<S, X>
where
    S: ExecutionStore,
    X: Extractor + 'static,
{
    pub fn new(store: Arc<S>, extractor: Arc<X>, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            extractor,
            bus,
            limiters: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Transition pending -> running and announce the start.
    pub async fn start(&self, execution_id: DbId) -> Result<Execution, OrchestratorError> {
        if !self.store.mark_execution_started(execution_id).await? {
            return Err(OrchestratorError::InvalidTransition {
                execution_id,
                action: "start",
            });
        }
        let execution = self.store.get_execution(execution_id).await?;
        self.bus.publish(ExecutionEvent::ExecutionStarted {
            execution_id,
            batch_id: execution.batch_id,
            total_jobs: execution.total_jobs,
            concurrency: execution.concurrency,
        });
        tracing::info!(
            execution_id,
            batch_id = execution.batch_id,
            total_jobs = execution.total_jobs,
            concurrency = execution.concurrency,
            "Execution started",
        );
        Ok(execution)
    }

    /// Transition running -> paused.
    ///
    /// In-flight jobs run to completion; queued jobs stay queued until a
    /// resume.
    pub async fn pause(&self, execution_id: DbId) -> Result<(), OrchestratorError> {
        if !self.store.mark_execution_paused(execution_id).await? {
            return Err(OrchestratorError::InvalidTransition {
                execution_id,
                action: "pause",
            });
        }
        self.bus
            .publish(ExecutionEvent::ExecutionPaused { execution_id });
        tracing::info!(execution_id, "Execution paused");
        Ok(())
    }

    /// Transition running|paused -> stopped (terminal).
    pub async fn stop(&self, execution_id: DbId) -> Result<(), OrchestratorError> {
        if !self.store.mark_execution_stopped(execution_id).await? {
            return Err(OrchestratorError::InvalidTransition {
                execution_id,
                action: "stop",
            });
        }
        self.bus
            .publish(ExecutionEvent::ExecutionStopped { execution_id });
        tracing::info!(execution_id, "Execution stopped");
        Ok(())
    }

    /// Resume a paused execution.
    ///
    /// Re-queues the jobs left queued or running, flips the execution back
    /// to running, and drives exactly that subset on a background task.
    /// Returns the number of jobs resumed, not their eventual outcome.
    pub async fn resume(
        &self,
        execution_id: DbId,
        config: TaskConfig,
    ) -> Result<usize, OrchestratorError> {
        let execution = self.store.get_execution(execution_id).await?;
        if execution_status(&execution)? != ExecutionStatus::Paused {
            return Err(OrchestratorError::InvalidTransition {
                execution_id,
                action: "resume",
            });
        }

        let jobs = self.store.list_unsettled_jobs(execution.batch_id).await?;
        self.store.reset_unsettled_jobs(execution.batch_id).await?;

        if !self.store.mark_execution_resumed(execution_id).await? {
            // Lost a race against a concurrent stop.
            return Err(OrchestratorError::InvalidTransition {
                execution_id,
                action: "resume",
            });
        }

        let count = jobs.len();
        self.bus.publish(ExecutionEvent::ExecutionResumed {
            execution_id,
            resumed_jobs: count as i32,
        });
        tracing::info!(execution_id, resumed_jobs = count, "Execution resumed");

        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.run(execution_id, jobs, config).await {
                tracing::error!(execution_id, error = %e, "Resumed execution failed");
            }
        });

        Ok(count)
    }

    /// Resize the concurrency limit of an execution.
    ///
    /// Applies immediately to the live admission gate when the execution
    /// is mid-run, and persists for future runs either way.
    pub async fn update_concurrency(
        &self,
        execution_id: DbId,
        concurrency: i32,
    ) -> Result<(), OrchestratorError> {
        if concurrency < 1 {
            return Err(OrchestratorError::InvalidConcurrency(concurrency));
        }

        self.store
            .update_execution_concurrency(execution_id, concurrency)
            .await?;

        let limiter = {
            let limiters = self.limiters.lock().expect("limiter registry poisoned");
            limiters.get(&execution_id).cloned()
        };
        if let Some(limiter) = limiter {
            limiter.update_limit(concurrency as usize);
        }

        self.bus.publish(ExecutionEvent::ConcurrencyChanged {
            execution_id,
            concurrency,
        });
        tracing::info!(execution_id, concurrency, "Concurrency limit changed");
        Ok(())
    }

    /// Drive a set of jobs through the execution to settlement.
    ///
    /// No-ops when the execution is already paused or terminal. Any
    /// orchestration-level failure marks the execution `error` and is
    /// returned to the caller; per-job failures settle as job errors.
    pub async fn run(
        &self,
        execution_id: DbId,
        jobs: Vec<Job>,
        config: TaskConfig,
    ) -> Result<(), OrchestratorError> {
        let result = self.run_inner(execution_id, jobs, config).await;
        self.limiters
            .lock()
            .expect("limiter registry poisoned")
            .remove(&execution_id);

        if let Err(e) = &result {
            tracing::error!(execution_id, error = %e, "Execution failed with orchestration error");
            if let Err(mark_err) = self.store.mark_execution_error(execution_id).await {
                tracing::error!(
                    execution_id,
                    error = %mark_err,
                    "Failed to mark execution as errored",
                );
            }
        }
        result
    }

    async fn run_inner(
        &self,
        execution_id: DbId,
        jobs: Vec<Job>,
        config: TaskConfig,
    ) -> Result<(), OrchestratorError> {
        let execution = self.store.get_execution(execution_id).await?;
        let status = execution_status(&execution)?;
        if status == ExecutionStatus::Paused || status.is_terminal() {
            tracing::info!(
                execution_id,
                status_id = execution.status_id,
                "Execution not runnable, leaving jobs queued",
            );
            return Ok(());
        }

        let limiter = Arc::new(ConcurrencyLimiter::new(execution.concurrency.max(1) as usize));
        self.limiters
            .lock()
            .expect("limiter registry poisoned")
            .insert(execution_id, Arc::clone(&limiter));

        let counters = Arc::new(Counters::new(
            execution.completed_jobs,
            execution.error_jobs,
            jobs.len() as i32,
        ));

        let mut handles = Vec::with_capacity(jobs.len());
        for job in jobs {
            let this = self.clone();
            let limiter = Arc::clone(&limiter);
            let counters = Arc::clone(&counters);
            let config = config.clone();
            let job_id = job.id;
            let handle = tokio::spawn(async move {
                limiter
                    .run(|| async move { this.run_job(execution_id, job, config, counters).await })
                    .await
            });
            handles.push((job_id, handle));
        }

        // Every scheduled job settles; no single job failure aborts the
        // batch. Store failures inside a job task are orchestration-level
        // and surface after the remaining jobs have drained.
        let mut fatal: Option<OrchestratorError> = None;
        for (job_id, handle) in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(execution_id, job_id, error = %e, "Job task hit an orchestration error");
                    fatal.get_or_insert(e);
                }
                Err(join_err) => {
                    // A panic settles the job as an error and keeps the
                    // batch going.
                    tracing::error!(execution_id, job_id, error = %join_err, "Job task panicked");
                    counters.panicked();
                    if let Err(e) = self.store.fail_job(job_id, "Job task panicked").await {
                        fatal.get_or_insert(e.into());
                        continue;
                    }
                    self.bus.publish(ExecutionEvent::JobFailed {
                        execution_id,
                        job_id,
                        error: "Job task panicked".to_string(),
                    });
                }
            }
        }
        if let Some(e) = fatal {
            return Err(e);
        }

        // Natural completion: only if nothing paused or stopped us while
        // the final jobs were settling.
        let execution = self.store.get_execution(execution_id).await?;
        if execution_status(&execution)? == ExecutionStatus::Running
            && self.store.mark_execution_completed(execution_id).await?
        {
            let stats = counters.snapshot();

            let store = Arc::clone(&self.store);
            tokio::spawn(async move {
                if let Err(e) = store.record_metrics_snapshot(execution_id).await {
                    tracing::warn!(execution_id, error = %e, "Metrics snapshot failed");
                }
            });

            self.bus.publish(ExecutionEvent::ExecutionCompleted {
                execution_id,
                completed_jobs: stats.completed_jobs,
                error_jobs: stats.error_jobs,
            });
            tracing::info!(
                execution_id,
                completed_jobs = stats.completed_jobs,
                error_jobs = stats.error_jobs,
                "Execution completed",
            );
        }

        Ok(())
    }

    /// Execute one admitted job to settlement.
    async fn run_job(
        &self,
        execution_id: DbId,
        job: Job,
        config: TaskConfig,
        counters: Arc<Counters>,
    ) -> Result<(), OrchestratorError> {
        // Admission-point status re-check: a pause or stop issued after
        // scheduling but before this slot opened leaves the job queued
        // for a future resume.
        let execution = self.store.get_execution(execution_id).await?;
        if execution_status(&execution)? != ExecutionStatus::Running {
            tracing::debug!(
                execution_id,
                job_id = job.id,
                "Execution no longer running, leaving job queued",
            );
            return Ok(());
        }

        self.store.mark_job_running(job.id, execution_id).await?;
        counters.admitted();
        let session = self.store.create_session(job.id, execution_id).await?;

        self.bus.publish(ExecutionEvent::JobStarted {
            execution_id,
            job_id: job.id,
            batch_id: job.batch_id,
            attempt: session.attempt,
        });

        // Progress forwarder: persists incremental updates and fans them
        // out. Best-effort; a progress write failure never fails the job.
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let forwarder = {
            let store = Arc::clone(&self.store);
            let bus = Arc::clone(&self.bus);
            let session_id = session.id;
            let job_id = job.id;
            tokio::spawn(async move {
                while let Some(update) = progress_rx.recv().await {
                    match update {
                        ProgressUpdate::Progress { percent, step } => {
                            if let Err(e) = store
                                .update_job_progress(job_id, percent, step.as_deref())
                                .await
                            {
                                tracing::warn!(job_id, error = %e, "Failed to persist job progress");
                            }
                            bus.publish(ExecutionEvent::JobProgress {
                                execution_id,
                                job_id,
                                percent,
                                step,
                            });
                        }
                        ProgressUpdate::StreamingUrl(url) => {
                            if let Err(e) =
                                store.set_session_streaming_url(session_id, &url).await
                            {
                                tracing::warn!(job_id, error = %e, "Failed to record streaming URL");
                            }
                        }
                    }
                }
            })
        };

        let request = ExtractionRequest {
            target_url: job.target_url.clone(),
            instructions: job.instructions.clone(),
            extraction_schema: job.extraction_schema.clone(),
            ground_truth: job.ground_truth.clone(),
        };

        let task = {
            let extractor = Arc::clone(&self.extractor);
            let progress_tx = progress_tx.clone();
            move |_attempt: u32| {
                let extractor = Arc::clone(&extractor);
                let request = request.clone();
                let progress = progress_tx.clone();
                async move {
                    extractor
                        .extract(request, progress)
                        .await
                        .map_err(|e| TaskError::new(e.to_string()))
                }
            }
        };

        // Breadcrumb hook: persists the failed attempt on the session
        // before each backoff wait. Best-effort.
        let on_retry = {
            let store = Arc::clone(&self.store);
            let bus = Arc::clone(&self.bus);
            let session_id = session.id;
            let job_id = job.id;
            move |attempt: u32, error: TaskError| {
                let store = Arc::clone(&store);
                let bus = Arc::clone(&bus);
                async move {
                    let breadcrumb = serde_json::json!({
                        "attempt": attempt,
                        "error": error.message,
                        "class": error.class.as_str(),
                        "at": chrono::Utc::now(),
                    });
                    if let Err(e) = store.append_session_breadcrumb(session_id, &breadcrumb).await
                    {
                        tracing::warn!(job_id, error = %e, "Failed to persist retry breadcrumb");
                    }
                    if let Err(e) = store.increment_job_retry(job_id).await {
                        tracing::warn!(job_id, error = %e, "Failed to bump retry count");
                    }
                    bus.publish(ExecutionEvent::JobRetry {
                        execution_id,
                        job_id,
                        attempt: attempt as i32,
                        error_class: error.class.as_str().to_string(),
                    });
                }
            }
        };

        let outcome = with_retry(&config.retry, task, on_retry).await;

        // Close the progress channel and flush pending updates so the
        // terminal event observes per-job causal order.
        drop(progress_tx);
        let _ = forwarder.await;

        match outcome.result {
            Ok(report) if report.success => {
                let evaluation = match (&job.ground_truth, &report.extracted_data) {
                    (Some(truth), Some(data)) => score_accuracy(data, truth),
                    _ => None,
                };
                // Local scoring against ground truth wins over the
                // agent's own confidence estimate.
                let accuracy = evaluation.as_ref().map(|r| r.score).or(report.accuracy);
                let logs = logs_json(&report.logs);

                self.store
                    .complete_session(
                        session.id,
                        report.extracted_data.as_ref(),
                        logs.as_ref(),
                        accuracy,
                    )
                    .await?;

                let evaluation_json = evaluation
                    .map(|r| serde_json::to_value(r).unwrap_or(serde_json::Value::Null));
                self.store
                    .complete_job(job.id, evaluation_json.as_ref())
                    .await?;

                counters.completed();
                self.bus.publish(ExecutionEvent::JobCompleted {
                    execution_id,
                    job_id: job.id,
                    accuracy,
                });
                tracing::info!(
                    execution_id,
                    job_id = job.id,
                    attempts = outcome.attempts,
                    duration_ms = outcome.total_duration.as_millis() as u64,
                    "Job completed",
                );
            }
            Ok(report) => {
                // The agent ran but the extraction itself failed.
                let error = report
                    .error
                    .unwrap_or_else(|| "Extraction reported failure".to_string());
                let logs = logs_json(&report.logs);

                self.store
                    .fail_session(session.id, &error, logs.as_ref())
                    .await?;
                self.store.fail_job(job.id, &error).await?;

                counters.errored();
                self.bus.publish(ExecutionEvent::JobFailed {
                    execution_id,
                    job_id: job.id,
                    error,
                });
            }
            Err(task_error) => {
                // Retries exhausted or a permanent failure.
                self.store
                    .fail_session(session.id, &task_error.message, None)
                    .await?;
                self.store.fail_job(job.id, &task_error.message).await?;

                counters.errored();
                self.bus.publish(ExecutionEvent::JobFailed {
                    execution_id,
                    job_id: job.id,
                    error: task_error.message.clone(),
                });
                tracing::warn!(
                    execution_id,
                    job_id = job.id,
                    attempts = outcome.attempts,
                    class = task_error.class.as_str(),
                    error = %task_error,
                    "Job failed",
                );
            }
        }

        // Flush the aggregate counters and publish the roll-up.
        let stats = counters.snapshot();
        self.store.update_execution_stats(execution_id, stats).await?;
        self.bus.publish(ExecutionEvent::ExecutionStatsUpdated {
            execution_id,
            completed_jobs: stats.completed_jobs,
            running_jobs: stats.running_jobs,
            queued_jobs: stats.queued_jobs,
            error_jobs: stats.error_jobs,
        });

        Ok(())
    }
}

fn execution_status(execution: &Execution) -> Result<ExecutionStatus, OrchestratorError> {
    ExecutionStatus::from_id(execution.status_id).ok_or(OrchestratorError::UnknownStatus {
        execution_id: execution.id,
        status_id: execution.status_id,
    })
}

fn logs_json(logs: &[String]) -> Option<serde_json::Value> {
    if logs.is_empty() {
        None
    } else {
        Some(serde_json::json!(logs))
    }
}

/// In-memory aggregate counters for one run.
///
/// Kept orchestrator-local instead of read-modify-write on the row, so
/// concurrent job settlements cannot lose updates.
struct Counters {
    stats: Mutex<ExecutionStats>,
}

impl Counters {
    fn new(completed: i32, errored: i32, queued: i32) -> Self {
        Self {
            stats: Mutex::new(ExecutionStats {
                completed_jobs: completed,
                running_jobs: 0,
                queued_jobs: queued,
                error_jobs: errored,
            }),
        }
    }

    fn admitted(&self) {
        let mut stats = self.stats.lock().expect("counters poisoned");
        stats.queued_jobs -= 1;
        stats.running_jobs += 1;
    }

    /// A job settled successfully.
    fn completed(&self) {
        let mut stats = self.stats.lock().expect("counters poisoned");
        stats.running_jobs -= 1;
        stats.completed_jobs += 1;
    }

    /// A job settled with an error. Errored jobs count as settled, so
    /// `completed_jobs` advances too and `error_jobs` tracks the subset.
    fn errored(&self) {
        let mut stats = self.stats.lock().expect("counters poisoned");
        stats.running_jobs -= 1;
        stats.completed_jobs += 1;
        stats.error_jobs += 1;
    }

    /// A panicked task may or may not have been admitted; drop whichever
    /// slot it held and settle it as an error.
    fn panicked(&self) {
        let mut stats = self.stats.lock().expect("counters poisoned");
        if stats.running_jobs > 0 {
            stats.running_jobs -= 1;
        } else if stats.queued_jobs > 0 {
            stats.queued_jobs -= 1;
        }
        stats.completed_jobs += 1;
        stats.error_jobs += 1;
    }

    fn snapshot(&self) -> ExecutionStats {
        *self.stats.lock().expect("counters poisoned")
    }
}
