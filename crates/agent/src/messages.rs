//! Agent WebSocket message types and parser.
//!
//! The agent streams JSON messages with the shape
//! `{"type": "<kind>", "data": {...}}` while a run executes. This module
//! deserializes them into a strongly-typed [`AgentMessage`] enum.

use serde::Deserialize;

/// All known agent stream message types.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum AgentMessage {
    /// Step-level progress for the run.
    #[serde(rename = "progress")]
    Progress(ProgressData),

    /// The live browser stream is available at the given URL.
    #[serde(rename = "streaming_url")]
    StreamingUrl(StreamingUrlData),

    /// A log line from the agent's browser session.
    #[serde(rename = "log")]
    Log(LogData),

    /// The run finished and produced a result.
    #[serde(rename = "completed")]
    Completed(CompletedData),

    /// The run finished without a usable result.
    #[serde(rename = "failed")]
    Failed(FailedData),
}

/// Payload for `progress` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    /// Completion percentage (0-100).
    pub percent: i16,
    /// What the agent is currently doing, if reported.
    pub step: Option<String>,
}

/// Payload for `streaming_url` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamingUrlData {
    pub url: String,
}

/// Payload for `log` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct LogData {
    pub line: String,
}

/// Payload for `completed` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletedData {
    /// Extracted fields keyed by schema field name.
    pub extracted_data: serde_json::Value,
    /// Agent-side confidence estimate, when computed.
    pub accuracy: Option<f64>,
}

/// Payload for `failed` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct FailedData {
    pub error: String,
}

/// Parse an agent stream text message into a typed enum.
///
/// Returns `Err` for malformed JSON or unknown `type` values.
/// Callers should log unknown types and continue.
pub fn parse_message(text: &str) -> Result<AgentMessage, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_progress_message() {
        let json = r#"{"type":"progress","data":{"percent":40,"step":"filling search form"}}"#;
        let msg = parse_message(json).unwrap();
        match msg {
            AgentMessage::Progress(data) => {
                assert_eq!(data.percent, 40);
                assert_eq!(data.step.as_deref(), Some("filling search form"));
            }
            other => panic!("Expected Progress, got {other:?}"),
        }
    }

    #[test]
    fn parse_progress_without_step() {
        let json = r#"{"type":"progress","data":{"percent":10,"step":null}}"#;
        let msg = parse_message(json).unwrap();
        match msg {
            AgentMessage::Progress(data) => assert!(data.step.is_none()),
            other => panic!("Expected Progress, got {other:?}"),
        }
    }

    #[test]
    fn parse_streaming_url_message() {
        let json = r#"{"type":"streaming_url","data":{"url":"https://agent/live/abc"}}"#;
        let msg = parse_message(json).unwrap();
        match msg {
            AgentMessage::StreamingUrl(data) => {
                assert_eq!(data.url, "https://agent/live/abc");
            }
            other => panic!("Expected StreamingUrl, got {other:?}"),
        }
    }

    #[test]
    fn parse_completed_message() {
        let json = r#"{"type":"completed","data":{"extracted_data":{"name":"Acme"},"accuracy":0.9}}"#;
        let msg = parse_message(json).unwrap();
        match msg {
            AgentMessage::Completed(data) => {
                assert_eq!(data.extracted_data["name"], "Acme");
                assert_eq!(data.accuracy, Some(0.9));
            }
            other => panic!("Expected Completed, got {other:?}"),
        }
    }

    #[test]
    fn parse_failed_message() {
        let json = r#"{"type":"failed","data":{"error":"selector never resolved"}}"#;
        let msg = parse_message(json).unwrap();
        match msg {
            AgentMessage::Failed(data) => {
                assert_eq!(data.error, "selector never resolved");
            }
            other => panic!("Expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn parse_unknown_type_returns_error() {
        let json = r#"{"type":"unknown_thing","data":{}}"#;
        assert!(parse_message(json).is_err());
    }

    #[test]
    fn parse_invalid_json_returns_error() {
        assert!(parse_message("not json at all").is_err());
    }
}
