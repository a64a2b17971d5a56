//! Streaming session state machine.
//!
//! Owns the single [`SessionState`] instance and is the only code that
//! mutates it. Every transition is checked against
//! [`SessionStatus::can_transition_to`]; an event that has no edge from the
//! current status is a logged no-op.
//!
//! ```text
//! Idle --start--> Connecting --first value--> Streaming
//! Streaming --DomainEvent--> Streaming            (append; terminal state -> Complete)
//! Streaming --FinalResponse | end of stream--> Complete
//! Connecting | Streaming --failure | in-band error--> Error
//! Connecting | Streaming --cancel--> Idle
//! Complete | Error --reset--> Idle
//! ```
//!
//! Node highlights go to a broadcast side channel and never touch state.

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::models::{DomainEvent, NodeHighlight, SessionState, SessionStatus, StreamEvent};

/// Error text recorded when the stream closes before any value arrived.
pub const EMPTY_STREAM_MESSAGE: &str = "stream closed before any response was received";

/// State machine driving one [`SessionState`].
#[derive(Debug)]
pub struct SessionMachine {
    state: SessionState,
    terminal_states: Vec<String>,
    highlights: broadcast::Sender<NodeHighlight>,
    generation: u64,
}

impl SessionMachine {
    /// Create an idle machine.
    ///
    /// `terminal_states` are the domain-event `state` values that complete
    /// the session; `highlight_capacity` sizes the side channel.
    #[must_use]
    pub fn new(terminal_states: Vec<String>, highlight_capacity: usize) -> Self {
        let (highlights, _) = broadcast::channel(highlight_capacity.max(1));
        Self {
            state: SessionState::default(),
            terminal_states,
            highlights,
            generation: 0,
        }
    }

    /// Read-only view of the session.
    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.state.status
    }

    /// Subscribe to node highlights.
    #[must_use]
    pub fn subscribe_highlights(&self) -> broadcast::Receiver<NodeHighlight> {
        self.highlights.subscribe()
    }

    /// Whether `state` is a configured terminal marker.
    #[must_use]
    pub fn is_terminal_marker(&self, state: &str) -> bool {
        self.terminal_states.iter().any(|marker| marker == state)
    }

    /// `Idle -> Connecting`, recording the prompt and its request generation.
    pub fn start(&mut self, prompt: &str, generation: u64) -> bool {
        if !self.move_to(SessionStatus::Connecting) {
            return false;
        }
        self.generation = generation;
        self.state.prompt = Some(prompt.to_owned());
        true
    }

    /// Apply one interpreted stream value.
    ///
    /// Returns `true` when the value changed state or was published.
    pub fn apply(&mut self, event: StreamEvent) -> bool {
        if self.state.status == SessionStatus::Connecting
            && !self.move_to(SessionStatus::Streaming)
        {
            return false;
        }

        if self.state.status != SessionStatus::Streaming {
            debug!(
                status = ?self.state.status,
                kind = event.kind(),
                "session: value outside streaming ignored"
            );
            return false;
        }

        match event {
            StreamEvent::Token { text } => {
                self.state.active_message.push_str(&text);
                self.touch();
                true
            }
            StreamEvent::DomainEvent(domain) => {
                self.append(domain);
                true
            }
            StreamEvent::NodeHighlight { node_id } => {
                let highlight = NodeHighlight {
                    generation: self.generation,
                    node_id,
                };
                // No subscribers is fine: highlights are best-effort.
                let _ = self.highlights.send(highlight);
                true
            }
            StreamEvent::FinalResponse { text } => {
                self.state.final_response = Some(text);
                self.move_to(SessionStatus::Complete)
            }
            StreamEvent::Error { message } => self.fail(&message),
        }
    }

    /// The stream closed on its own.
    ///
    /// From `Streaming` the turn completes, with the accumulated token text
    /// as the final response when none was sent. From `Connecting` nothing
    /// was received, which is a failure.
    pub fn finish(&mut self) -> bool {
        match self.state.status {
            SessionStatus::Streaming => {
                if self.state.final_response.is_none() && !self.state.active_message.is_empty() {
                    self.state.final_response = Some(self.state.active_message.clone());
                }
                self.move_to(SessionStatus::Complete)
            }
            SessionStatus::Connecting => self.fail(EMPTY_STREAM_MESSAGE),
            status => {
                debug!(?status, "session: end of stream ignored");
                false
            }
        }
    }

    /// Transport failure or malformed terminal: `Connecting | Streaming -> Error`.
    pub fn fail(&mut self, message: &str) -> bool {
        if !self.move_to(SessionStatus::Error) {
            return false;
        }
        self.state.error = Some(message.to_owned());
        true
    }

    /// Cancellation of the in-flight request: `Connecting | Streaming -> Idle`.
    pub fn cancel(&mut self) -> bool {
        if !self.state.status.is_in_flight() || !self.move_to(SessionStatus::Idle) {
            debug!(status = ?self.state.status, "session: cancel outside in-flight state ignored");
            return false;
        }
        self.state.clear_turn();
        true
    }

    /// `Complete | Error -> Idle`, clearing the turn but keeping the thread id.
    pub fn reset(&mut self) -> bool {
        if !self.state.status.is_terminal() || !self.move_to(SessionStatus::Idle) {
            debug!(status = ?self.state.status, "session: reset outside terminal state ignored");
            return false;
        }
        self.state.clear_turn();
        true
    }

    /// Recreate the session from scratch, dropping the thread id as well.
    pub fn discard(&mut self) {
        self.state = SessionState::default();
        self.generation = 0;
        self.touch();
    }

    /// Thread id, generating one if the session has none yet.
    pub fn ensure_thread_id(&mut self) -> &str {
        self.state
            .thread_id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .as_str()
    }

    /// Adopt a previously persisted thread id.
    pub fn set_thread_id(&mut self, thread_id: Option<String>) {
        self.state.thread_id = thread_id;
    }

    /// Forget the thread id so the next request starts a new conversation.
    pub fn clear_thread(&mut self) {
        self.state.thread_id = None;
    }

    fn append(&mut self, domain: DomainEvent) {
        let terminal = self.is_terminal_marker(&domain.state);
        debug!(
            order_id = %domain.order_id,
            state = %domain.state,
            terminal,
            "session: domain event appended"
        );
        self.state.current_order_id = Some(domain.order_id.clone());
        self.state.event_log.push(domain);
        self.touch();
        if terminal {
            self.move_to(SessionStatus::Complete);
        }
    }

    fn move_to(&mut self, next: SessionStatus) -> bool {
        let current = self.state.status;
        if !current.can_transition_to(next) {
            debug!(?current, ?next, "session: transition rejected");
            return false;
        }
        info!(?current, ?next, generation = self.generation, "session transition");
        self.state.status = next;
        self.touch();
        true
    }

    fn touch(&mut self) {
        self.state.updated_at = Some(Utc::now());
    }
}
