//! Client library for the remote browser-automation extraction agent.
//!
//! The agent is an external service that navigates a target site and
//! extracts structured data according to an instruction + schema pair.
//! This crate defines the [`Extractor`] contract the orchestrator consumes
//! and provides [`HttpExtractor`], the production implementation (REST
//! submission + WebSocket progress stream).

pub mod client;
pub mod messages;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use client::HttpExtractor;

/// One extraction task handed to the agent.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub target_url: String,
    pub instructions: String,
    /// JSON schema describing the fields to extract.
    pub extraction_schema: serde_json::Value,
    /// Reference output, forwarded so the agent can self-estimate its
    /// confidence. Authoritative scoring happens orchestrator-side.
    pub ground_truth: Option<serde_json::Value>,
}

/// What the agent reported back for one attempt.
///
/// `success = false` means the agent ran to completion but the extraction
/// itself failed (e.g. the data was not on the page). Transport-level
/// failures surface as [`AgentError`] instead and are the retryable case.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub success: bool,
    pub extracted_data: Option<serde_json::Value>,
    pub error: Option<String>,
    /// Raw log lines emitted by the agent during the run.
    pub logs: Vec<String>,
    /// Agent-side confidence estimate, when it reports one.
    pub accuracy: Option<f64>,
}

/// Incremental signals emitted while an attempt is in flight.
#[derive(Debug, Clone)]
pub enum ProgressUpdate {
    /// Step-level progress (0-100 plus a human-readable step name).
    Progress { percent: i16, step: Option<String> },
    /// URL of the live browser stream for this run.
    StreamingUrl(String),
}

/// Channel half the orchestrator hands to an extractor for progress.
pub type ProgressSender = mpsc::UnboundedSender<ProgressUpdate>;

/// Errors from the agent transport layer.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The submission HTTP call failed or was rejected.
    #[error("Submit failed: {0}")]
    Submit(String),

    /// The progress WebSocket could not be established.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The stream broke or ended before a terminal frame.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// The task-executor contract consumed by the orchestrator.
///
/// Implementations run one extraction attempt to completion, pushing
/// incremental updates through `progress` along the way. Dropping the
/// receiving half of `progress` must not fail the attempt.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        request: ExtractionRequest,
        progress: ProgressSender,
    ) -> Result<ExtractionOutcome, AgentError>;
}
