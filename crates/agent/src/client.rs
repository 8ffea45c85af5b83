//! Production [`Extractor`] backed by the remote agent's HTTP + WebSocket API.
//!
//! One attempt is: `POST /v1/runs` to queue the run, then attach to the
//! run's WebSocket stream and consume frames until a terminal `completed`
//! or `failed` message arrives.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::connect_async;

use crate::messages::{parse_message, AgentMessage};
use crate::{AgentError, ExtractionOutcome, ExtractionRequest, Extractor, ProgressSender, ProgressUpdate};

/// HTTP + WebSocket client for a single agent deployment.
pub struct HttpExtractor {
    client: reqwest::Client,
    /// Base HTTP URL, e.g. `http://agent:7070`.
    api_url: String,
    /// WebSocket base URL, e.g. `ws://agent:7070`.
    ws_url: String,
}

/// Response returned by the agent `/v1/runs` endpoint after queuing a run.
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    run_id: String,
}

impl HttpExtractor {
    /// Create a client for an agent deployment.
    pub fn new(api_url: String, ws_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
            ws_url,
        }
    }

    /// Queue a run on the agent, returning its server-assigned id.
    async fn submit(&self, request: &ExtractionRequest) -> Result<SubmitResponse, AgentError> {
        let body = serde_json::json!({
            "target_url": request.target_url,
            "instructions": request.instructions,
            "schema": request.extraction_schema,
            "ground_truth": request.ground_truth,
        });

        let response = self
            .client
            .post(format!("{}/v1/runs", self.api_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Submit(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(AgentError::Submit(format!("{status}: {body}")));
        }

        response
            .json::<SubmitResponse>()
            .await
            .map_err(|e| AgentError::Submit(e.to_string()))
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    async fn extract(
        &self,
        request: ExtractionRequest,
        progress: ProgressSender,
    ) -> Result<ExtractionOutcome, AgentError> {
        let run = self.submit(&request).await?;
        let client_id = uuid::Uuid::new_v4();
        let url = format!(
            "{}/v1/runs/{}/stream?clientId={}",
            self.ws_url, run.run_id, client_id
        );

        let (mut ws_stream, _response) = connect_async(&url)
            .await
            .map_err(|e| AgentError::Connection(format!("Failed to attach to run stream: {e}")))?;

        tracing::debug!(run_id = %run.run_id, target_url = %request.target_url, "Attached to agent run stream");

        let mut logs = Vec::new();

        while let Some(frame) = ws_stream.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Ping(_) | Message::Pong(_)) => continue,
                Ok(Message::Close(frame)) => {
                    tracing::debug!(run_id = %run.run_id, ?frame, "Agent stream closed");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    return Err(AgentError::Protocol(format!("Stream receive error: {e}")));
                }
            };

            match parse_message(&text) {
                Ok(AgentMessage::Progress(data)) => {
                    // A dropped receiver just means nobody is watching.
                    let _ = progress.send(ProgressUpdate::Progress {
                        percent: data.percent,
                        step: data.step,
                    });
                }
                Ok(AgentMessage::StreamingUrl(data)) => {
                    let _ = progress.send(ProgressUpdate::StreamingUrl(data.url));
                }
                Ok(AgentMessage::Log(data)) => {
                    logs.push(data.line);
                }
                Ok(AgentMessage::Completed(data)) => {
                    return Ok(ExtractionOutcome {
                        success: true,
                        extracted_data: Some(data.extracted_data),
                        error: None,
                        logs,
                        accuracy: data.accuracy,
                    });
                }
                Ok(AgentMessage::Failed(data)) => {
                    // The agent ran to completion; the extraction itself
                    // failed. Not a transport error.
                    return Ok(ExtractionOutcome {
                        success: false,
                        extracted_data: None,
                        error: Some(data.error),
                        logs,
                        accuracy: None,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        run_id = %run.run_id,
                        error = %e,
                        raw_message = %text,
                        "Failed to parse agent message",
                    );
                }
            }
        }

        Err(AgentError::Protocol(
            "Stream ended before a terminal frame".to_string(),
        ))
    }
}
