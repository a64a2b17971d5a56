//! Wire types of the agent HTTP API and frame interpretation.
//!
//! | Framing        | Frame shape                                   | Yields                                   |
//! |----------------|-----------------------------------------------|------------------------------------------|
//! | `lines`        | `{response?, node?, status?, thread_id?}`     | `NodeHighlight`, then `Token` or `Error` |
//! | `concatenated` | `{response}` with quasi-JSON domain event     | `DomainEvent`                            |
//! | `concatenated` | `{response}` with any other text              | `FinalResponse`                          |

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::framing::FramingMode;
use crate::models::StreamEvent;
use crate::normalize::{looks_like_domain_event, normalize_domain_event};
use crate::{AppError, Result};

/// Line-frame `status` value the server uses to report a failed stream.
pub const STATUS_ERROR: &str = "error";

/// Body of `POST /agent/prompt` and `POST /agent/prompt/stream`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptRequest {
    /// User prompt text.
    pub prompt: String,
    /// Conversation id replayed on streaming requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

/// Body returned by `POST /agent/prompt`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptResponse {
    /// Complete agent answer.
    pub response: String,
}

/// Body returned by `GET /health` and `GET /v1/health`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthStatus {
    /// Liveness text: `ok` from `/health`, `alive` from `/v1/health`.
    pub status: String,
}

/// Body returned by `GET /transport/config`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransportInfo {
    /// Message transport used by the agent (for example `SLIM`).
    pub transport: String,
}

/// One line of the newline-delimited stream.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct LineFrame {
    /// Text delta for the active assistant message.
    #[serde(default)]
    pub response: Option<String>,
    /// Node that produced this line.
    #[serde(default)]
    pub node: Option<String>,
    /// Server-side stream status (`start`, `streaming`, `end`, `error`).
    #[serde(default)]
    pub status: Option<String>,
    /// Echo of the conversation id.
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// Interpret one frame according to the framing protocol.
///
/// # Errors
///
/// - [`AppError::Parse`] — the frame is not JSON of the expected shape, or
///   an embedded domain event failed strict parsing.
/// - [`AppError::Validation`] — an embedded domain event lacks a required field.
pub fn interpret_frame(mode: FramingMode, frame: &str) -> Result<Vec<StreamEvent>> {
    match mode {
        FramingMode::Lines => interpret_line(frame),
        FramingMode::Concatenated => interpret_object(frame).map(|event| vec![event]),
    }
}

/// Interpret a line frame. A line without `response` is a heartbeat.
///
/// # Errors
///
/// Returns [`AppError::Parse`] when the line is not a JSON object.
pub fn interpret_line(line: &str) -> Result<Vec<StreamEvent>> {
    let frame: LineFrame = serde_json::from_str(line)
        .map_err(|err| AppError::Parse(format!("malformed line frame: {err}")))?;

    let mut events = Vec::with_capacity(2);
    if let Some(node_id) = frame.node.filter(|node| !node.is_empty()) {
        events.push(StreamEvent::NodeHighlight { node_id });
    }

    match frame.response {
        Some(message) if frame.status.as_deref() == Some(STATUS_ERROR) => {
            events.push(StreamEvent::Error { message });
        }
        Some(text) if !text.is_empty() => events.push(StreamEvent::Token { text }),
        _ => {}
    }

    Ok(events)
}

/// Interpret a concatenated-object frame.
///
/// # Errors
///
/// - [`AppError::Parse`] — not a JSON object with a string `response`, or
///   the embedded domain event is not valid quasi-JSON.
/// - [`AppError::Validation`] — the embedded domain event is incomplete.
pub fn interpret_object(frame: &str) -> Result<StreamEvent> {
    let value: Value = serde_json::from_str(frame)
        .map_err(|err| AppError::Parse(format!("malformed object frame: {err}")))?;

    let Some(response) = value.get("response").and_then(Value::as_str) else {
        return Err(AppError::Parse(
            "object frame has no string `response` field".into(),
        ));
    };

    if looks_like_domain_event(response) {
        normalize_domain_event(response).map(StreamEvent::DomainEvent)
    } else {
        Ok(StreamEvent::FinalResponse {
            text: response.to_owned(),
        })
    }
}
