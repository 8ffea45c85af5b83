//! Shared test doubles for orchestrator integration tests: an in-memory
//! [`ExecutionStore`] and scriptable [`Extractor`] implementations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use siphon_agent::{
    AgentError, ExtractionOutcome, ExtractionRequest, Extractor, ProgressSender, ProgressUpdate,
};
use siphon_core::types::DbId;
use siphon_db::models::execution::{Execution, ExecutionStats};
use siphon_db::models::job::Job;
use siphon_db::models::session::ExtractionSession;
use siphon_db::models::status::{ExecutionStatus, JobStatus, SessionStatus};
use siphon_engine::store::{ExecutionStore, StoreError, StoreResult};

// ---------------------------------------------------------------------------
// Row builders
// ---------------------------------------------------------------------------

pub fn make_execution(id: DbId, batch_id: DbId, concurrency: i32, total_jobs: i32) -> Execution {
    let now = chrono::Utc::now();
    Execution {
        id,
        batch_id,
        status_id: ExecutionStatus::Pending.id(),
        concurrency,
        total_jobs,
        completed_jobs: 0,
        running_jobs: 0,
        queued_jobs: total_jobs,
        error_jobs: 0,
        started_at: None,
        paused_at: None,
        resumed_at: None,
        stopped_at: None,
        completed_at: None,
        last_activity_at: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn make_job(id: DbId, batch_id: DbId, target_url: &str) -> Job {
    let now = chrono::Utc::now();
    Job {
        id,
        batch_id,
        execution_id: None,
        status_id: JobStatus::Queued.id(),
        target_url: target_url.to_string(),
        instructions: "extract the company contact card".to_string(),
        extraction_schema: serde_json::json!({"name": "string"}),
        ground_truth: None,
        progress_percent: 0,
        current_step: None,
        retry_count: 0,
        evaluation: None,
        error_message: None,
        started_at: None,
        completed_at: None,
        created_at: now,
        updated_at: now,
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// In-memory [`ExecutionStore`] mirroring the repository transition guards.
#[derive(Default)]
pub struct MemStore {
    executions: Mutex<HashMap<DbId, Execution>>,
    jobs: Mutex<HashMap<DbId, Job>>,
    sessions: Mutex<Vec<ExtractionSession>>,
    /// When set, `mark_job_running` fails to simulate a persistence outage.
    pub fail_mark_job_running: AtomicBool,
    pub metrics_snapshots: AtomicUsize,
}

impl MemStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_execution(&self, execution: Execution) {
        self.executions
            .lock()
            .unwrap()
            .insert(execution.id, execution);
    }

    pub fn insert_job(&self, job: Job) {
        self.jobs.lock().unwrap().insert(job.id, job);
    }

    pub fn execution(&self, id: DbId) -> Execution {
        self.executions.lock().unwrap()[&id].clone()
    }

    pub fn job(&self, id: DbId) -> Job {
        self.jobs.lock().unwrap()[&id].clone()
    }

    pub fn job_status(&self, id: DbId) -> JobStatus {
        JobStatus::from_id(self.job(id).status_id).unwrap()
    }

    pub fn execution_status(&self, id: DbId) -> ExecutionStatus {
        ExecutionStatus::from_id(self.execution(id).status_id).unwrap()
    }

    pub fn list_jobs(&self, batch_id: DbId) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.batch_id == batch_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.id);
        jobs
    }

    pub fn jobs_with_status(&self, status: JobStatus) -> usize {
        self.jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.status_id == status.id())
            .count()
    }

    pub fn sessions_for_job(&self, job_id: DbId) -> Vec<ExtractionSession> {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.job_id == job_id)
            .cloned()
            .collect()
    }

    fn transition_execution(
        &self,
        id: DbId,
        from: &[ExecutionStatus],
        to: ExecutionStatus,
    ) -> bool {
        let mut executions = self.executions.lock().unwrap();
        match executions.get_mut(&id) {
            Some(execution) if from.iter().any(|s| s.id() == execution.status_id) => {
                execution.status_id = to.id();
                execution.updated_at = chrono::Utc::now();
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl ExecutionStore for MemStore {
    async fn get_execution(&self, id: DbId) -> StoreResult<Execution> {
        self.executions
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "execution",
                id,
            })
    }

    async fn mark_execution_started(&self, id: DbId) -> StoreResult<bool> {
        Ok(self.transition_execution(id, &[ExecutionStatus::Pending], ExecutionStatus::Running))
    }

    async fn mark_execution_paused(&self, id: DbId) -> StoreResult<bool> {
        Ok(self.transition_execution(id, &[ExecutionStatus::Running], ExecutionStatus::Paused))
    }

    async fn mark_execution_resumed(&self, id: DbId) -> StoreResult<bool> {
        Ok(self.transition_execution(id, &[ExecutionStatus::Paused], ExecutionStatus::Running))
    }

    async fn mark_execution_stopped(&self, id: DbId) -> StoreResult<bool> {
        Ok(self.transition_execution(
            id,
            &[ExecutionStatus::Running, ExecutionStatus::Paused],
            ExecutionStatus::Stopped,
        ))
    }

    async fn mark_execution_completed(&self, id: DbId) -> StoreResult<bool> {
        Ok(self.transition_execution(id, &[ExecutionStatus::Running], ExecutionStatus::Completed))
    }

    async fn mark_execution_error(&self, id: DbId) -> StoreResult<()> {
        if let Some(execution) = self.executions.lock().unwrap().get_mut(&id) {
            execution.status_id = ExecutionStatus::Error.id();
        }
        Ok(())
    }

    async fn update_execution_stats(&self, id: DbId, stats: ExecutionStats) -> StoreResult<()> {
        if let Some(execution) = self.executions.lock().unwrap().get_mut(&id) {
            execution.completed_jobs = stats.completed_jobs;
            execution.running_jobs = stats.running_jobs;
            execution.queued_jobs = stats.queued_jobs;
            execution.error_jobs = stats.error_jobs;
            execution.last_activity_at = Some(chrono::Utc::now());
        }
        Ok(())
    }

    async fn update_execution_concurrency(&self, id: DbId, concurrency: i32) -> StoreResult<()> {
        if let Some(execution) = self.executions.lock().unwrap().get_mut(&id) {
            execution.concurrency = concurrency;
        }
        Ok(())
    }

    async fn list_jobs_for_batch(&self, batch_id: DbId) -> StoreResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.batch_id == batch_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.id);
        Ok(jobs)
    }

    async fn list_unsettled_jobs(&self, batch_id: DbId) -> StoreResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| {
                j.batch_id == batch_id
                    && matches!(
                        JobStatus::from_id(j.status_id),
                        Some(JobStatus::Queued) | Some(JobStatus::Running)
                    )
            })
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.id);
        Ok(jobs)
    }

    async fn reset_unsettled_jobs(&self, batch_id: DbId) -> StoreResult<u64> {
        let mut count = 0;
        for job in self.jobs.lock().unwrap().values_mut() {
            if job.batch_id == batch_id && job.status_id == JobStatus::Running.id() {
                job.status_id = JobStatus::Queued.id();
                count += 1;
            } else if job.batch_id == batch_id && job.status_id == JobStatus::Queued.id() {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn mark_job_running(&self, id: DbId, execution_id: DbId) -> StoreResult<()> {
        if self.fail_mark_job_running.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
            job.status_id = JobStatus::Running.id();
            job.execution_id = Some(execution_id);
            job.started_at = Some(chrono::Utc::now());
        }
        Ok(())
    }

    async fn update_job_progress(
        &self,
        id: DbId,
        percent: i16,
        step: Option<&str>,
    ) -> StoreResult<()> {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
            job.progress_percent = percent;
            job.current_step = step.map(str::to_string);
        }
        Ok(())
    }

    async fn complete_job(
        &self,
        id: DbId,
        evaluation: Option<&serde_json::Value>,
    ) -> StoreResult<()> {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
            job.status_id = JobStatus::Completed.id();
            job.evaluation = evaluation.cloned();
            job.progress_percent = 100;
            job.completed_at = Some(chrono::Utc::now());
        }
        Ok(())
    }

    async fn fail_job(&self, id: DbId, error: &str) -> StoreResult<()> {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
            job.status_id = JobStatus::Error.id();
            job.error_message = Some(error.to_string());
            job.completed_at = Some(chrono::Utc::now());
        }
        Ok(())
    }

    async fn increment_job_retry(&self, id: DbId) -> StoreResult<()> {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
            job.retry_count += 1;
        }
        Ok(())
    }

    async fn create_session(
        &self,
        job_id: DbId,
        execution_id: DbId,
    ) -> StoreResult<ExtractionSession> {
        let mut sessions = self.sessions.lock().unwrap();
        let attempt = sessions.iter().filter(|s| s.job_id == job_id).count() as i32 + 1;
        let now = chrono::Utc::now();
        let session = ExtractionSession {
            id: sessions.len() as DbId + 1,
            job_id,
            execution_id,
            attempt,
            status_id: SessionStatus::Running.id(),
            extracted_data: None,
            error_message: None,
            retry_breadcrumbs: serde_json::json!([]),
            logs: None,
            streaming_url: None,
            accuracy: None,
            started_at: now,
            ended_at: None,
            created_at: now,
        };
        sessions.push(session.clone());
        Ok(session)
    }

    async fn set_session_streaming_url(&self, id: DbId, url: &str) -> StoreResult<()> {
        if let Some(session) = self.sessions.lock().unwrap().iter_mut().find(|s| s.id == id) {
            session.streaming_url = Some(url.to_string());
        }
        Ok(())
    }

    async fn append_session_breadcrumb(
        &self,
        id: DbId,
        breadcrumb: &serde_json::Value,
    ) -> StoreResult<()> {
        if let Some(session) = self.sessions.lock().unwrap().iter_mut().find(|s| s.id == id) {
            session
                .retry_breadcrumbs
                .as_array_mut()
                .unwrap()
                .push(breadcrumb.clone());
        }
        Ok(())
    }

    async fn complete_session(
        &self,
        id: DbId,
        extracted_data: Option<&serde_json::Value>,
        logs: Option<&serde_json::Value>,
        accuracy: Option<f64>,
    ) -> StoreResult<()> {
        if let Some(session) = self.sessions.lock().unwrap().iter_mut().find(|s| s.id == id) {
            session.status_id = SessionStatus::Completed.id();
            session.extracted_data = extracted_data.cloned();
            session.logs = logs.cloned();
            session.accuracy = accuracy;
            session.ended_at = Some(chrono::Utc::now());
        }
        Ok(())
    }

    async fn fail_session(
        &self,
        id: DbId,
        error: &str,
        logs: Option<&serde_json::Value>,
    ) -> StoreResult<()> {
        if let Some(session) = self.sessions.lock().unwrap().iter_mut().find(|s| s.id == id) {
            session.status_id = SessionStatus::Error.id();
            session.error_message = Some(error.to_string());
            session.logs = logs.cloned();
            session.ended_at = Some(chrono::Utc::now());
        }
        Ok(())
    }

    async fn record_metrics_snapshot(&self, _execution_id: DbId) -> StoreResult<()> {
        self.metrics_snapshots.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scripted extractor
// ---------------------------------------------------------------------------

/// Per-target behavior for [`ScriptedExtractor`].
#[derive(Debug, Clone)]
pub enum Script {
    /// Return the given data successfully.
    Succeed(serde_json::Value),
    /// Fail every attempt with a permanently-classified error.
    PermanentError,
    /// Fail the first `n` attempts with a transient error, then succeed.
    TransientThenSucceed(u32, serde_json::Value),
    /// Run to completion but report an extraction failure.
    ReportFailure(&'static str),
}

/// [`Extractor`] double that follows a per-target script and tracks the
/// observed concurrency.
pub struct ScriptedExtractor {
    scripts: Mutex<HashMap<String, Script>>,
    attempts: Mutex<HashMap<String, u32>>,
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedExtractor {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(HashMap::new()),
            attempts: Mutex::new(HashMap::new()),
            delay,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    pub fn script(&self, target_url: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(target_url.to_string(), script);
    }

    pub fn attempts_for(&self, target_url: &str) -> u32 {
        *self.attempts.lock().unwrap().get(target_url).unwrap_or(&0)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn extract(
        &self,
        request: ExtractionRequest,
        progress: ProgressSender,
    ) -> Result<ExtractionOutcome, AgentError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let counter = attempts.entry(request.target_url.clone()).or_insert(0);
            *counter += 1;
            *counter
        };

        let _ = progress.send(ProgressUpdate::Progress {
            percent: 50,
            step: Some("navigating".to_string()),
        });
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&request.target_url)
            .cloned()
            .unwrap_or(Script::Succeed(serde_json::json!({"name": "Acme"})));

        match script {
            Script::Succeed(data) => Ok(success(data)),
            Script::PermanentError => Err(AgentError::Submit("401 Unauthorized".to_string())),
            Script::TransientThenSucceed(n, data) => {
                if attempt <= n {
                    Err(AgentError::Connection("connection reset".to_string()))
                } else {
                    Ok(success(data))
                }
            }
            Script::ReportFailure(error) => Ok(ExtractionOutcome {
                success: false,
                extracted_data: None,
                error: Some(error.to_string()),
                logs: vec!["navigated".to_string(), "selector missing".to_string()],
                accuracy: None,
            }),
        }
    }
}

fn success(data: serde_json::Value) -> ExtractionOutcome {
    ExtractionOutcome {
        success: true,
        extracted_data: Some(data),
        error: None,
        logs: vec!["navigated".to_string()],
        accuracy: None,
    }
}

// ---------------------------------------------------------------------------
// Gated extractor (holds every run open until released)
// ---------------------------------------------------------------------------

/// [`Extractor`] double whose runs block until the gate opens; used to
/// observe mid-flight state deterministically.
pub struct GatedExtractor {
    gate: watch::Receiver<bool>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl GatedExtractor {
    pub fn new() -> (Arc<Self>, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (
            Arc::new(Self {
                gate: rx,
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
            tx,
        )
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for GatedExtractor {
    async fn extract(
        &self,
        _request: ExtractionRequest,
        _progress: ProgressSender,
    ) -> Result<ExtractionOutcome, AgentError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let mut gate = self.gate.clone();
        while !*gate.borrow_and_update() {
            if gate.changed().await.is_err() {
                break;
            }
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(success(serde_json::json!({"name": "Acme"})))
    }
}

/// Wait (bounded) for a condition another task flips.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("Condition not reached within deadline");
}
