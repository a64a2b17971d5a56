//! Stream events produced by frame interpretation.

use serde::{Deserialize, Serialize};

/// Validated record describing one step of the streamed workflow.
///
/// Every field is a non-blank string; see
/// [`validate_domain_event`](crate::normalize::validate_domain_event).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DomainEvent {
    /// Identifier of the order this step belongs to.
    pub order_id: String,
    /// Party that emitted the step.
    pub sender: String,
    /// Party the step is addressed to.
    pub receiver: String,
    /// Human-readable message text.
    pub message: String,
    /// Timestamp as reported by the agent (opaque).
    pub timestamp: String,
    /// Workflow lifecycle state after this step.
    pub state: String,
}

/// Side-channel notification that a workflow node became active.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct NodeHighlight {
    /// Generation of the request that produced the highlight.
    pub generation: u64,
    /// Node identifier as sent by the agent.
    pub node_id: String,
}

/// One interpreted value from the stream. Exactly one variant is active.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental text for the assistant message under construction.
    Token {
        /// Text delta.
        text: String,
    },
    /// Structured workflow step.
    DomainEvent(DomainEvent),
    /// Node highlight for graph consumers.
    NodeHighlight {
        /// Node identifier.
        node_id: String,
    },
    /// Plain-text final answer that terminates the stream.
    FinalResponse {
        /// Response text.
        text: String,
    },
    /// Error reported in-band by the agent.
    Error {
        /// Error text as sent by the agent.
        message: String,
    },
}

impl StreamEvent {
    /// Short label used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::DomainEvent(_) => "domain_event",
            Self::NodeHighlight { .. } => "node_highlight",
            Self::FinalResponse { .. } => "final_response",
            Self::Error { .. } => "error",
        }
    }
}
