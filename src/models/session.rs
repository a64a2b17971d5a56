//! Session model and lifecycle helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::DomainEvent;

/// Lifecycle status for a conversational turn.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No request in flight.
    #[default]
    Idle,
    /// Request sent, nothing received yet.
    Connecting,
    /// At least one value received.
    Streaming,
    /// Turn finished successfully.
    Complete,
    /// Turn failed.
    Error,
}

impl SessionStatus {
    /// Determine whether a lifecycle transition is permitted.
    ///
    /// `Streaming -> Streaming` is not listed: appending to the event log
    /// keeps the status unchanged and is not a transition.
    #[must_use]
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::Idle, SessionStatus::Connecting)
                | (SessionStatus::Connecting, SessionStatus::Streaming)
                | (SessionStatus::Streaming, SessionStatus::Complete)
                | (
                    SessionStatus::Connecting | SessionStatus::Streaming,
                    SessionStatus::Error | SessionStatus::Idle
                )
                | (
                    SessionStatus::Complete | SessionStatus::Error,
                    SessionStatus::Idle
                )
        )
    }

    /// Whether the turn has ended and only `reset` can leave this status.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Complete | SessionStatus::Error)
    }

    /// Whether a request is in flight.
    #[must_use]
    pub fn is_in_flight(self) -> bool {
        matches!(self, SessionStatus::Connecting | SessionStatus::Streaming)
    }
}

/// Read-only view of a conversational turn, consumed by UIs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionState {
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Prompt of the current or last turn.
    pub prompt: Option<String>,
    /// Append-only log of validated domain events.
    pub event_log: Vec<DomainEvent>,
    /// Assistant text accumulated from token deltas.
    pub active_message: String,
    /// Final response text, set on completion.
    pub final_response: Option<String>,
    /// User-visible error text, set on failure.
    pub error: Option<String>,
    /// Order id of the most recent domain event.
    pub current_order_id: Option<String>,
    /// Server-side conversation id; stable until explicitly cleared.
    pub thread_id: Option<String>,
    /// Time of the last mutation.
    pub updated_at: Option<DateTime<Utc>>,
}

impl SessionState {
    /// Construct an idle session with an empty log.
    #[must_use]
    pub fn new(thread_id: Option<String>) -> Self {
        Self {
            thread_id,
            ..Self::default()
        }
    }

    /// Clear everything belonging to the current turn, keeping the thread id.
    pub(crate) fn clear_turn(&mut self) {
        self.prompt = None;
        self.event_log.clear();
        self.active_message.clear();
        self.final_response = None;
        self.error = None;
        self.current_order_id = None;
    }
}
