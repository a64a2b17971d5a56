//! Conversation turn orchestration.
//!
//! [`Conversation`] ties the pieces together for one consumer: it issues a
//! request handle per turn, drives the HTTP call, runs the stream reader as
//! a separate task, and funnels every result through [`Conversation::dispatch`].
//! That method is the only path into the [`SessionMachine`] and drops any
//! result whose generation is no longer current.
//!
//! ```text
//! issue() ──► open request ──► reader task ──► mpsc ──► dispatch ──► machine
//!    ▲                                                    │
//!    └──────────── cancel() / next issue() ── stale ──────┘ (dropped)
//! ```

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::client::{run_reader, AgentClient, ReaderItem, ReaderOptions, Tagged};
use crate::config::ClientConfig;
use crate::errors::TRANSPORT_FALLBACK_MESSAGE;
use crate::lifecycle::{CancelHandle, RequestHandle, RequestLifecycle};
use crate::models::{NodeHighlight, SessionState, StreamEvent};
use crate::retry::{log_retry, Idempotency, RetryPolicy};
use crate::session::SessionMachine;
use crate::thread::ThreadStore;
use crate::{AppError, Result};

/// Capacity of the reader-to-dispatcher channel.
const READER_CHANNEL_CAPACITY: usize = 64;

/// One consumer's conversation with the agent.
#[derive(Debug)]
pub struct Conversation {
    client: AgentClient,
    lifecycle: Arc<RequestLifecycle>,
    machine: SessionMachine,
    threads: ThreadStore,
    reader_options: ReaderOptions,
    retry: RetryPolicy,
    prompt_idempotency: Idempotency,
}

impl Conversation {
    /// Build a conversation from configuration, adopting a persisted
    /// thread id when one exists.
    ///
    /// # Errors
    ///
    /// - [`AppError::Config`] — invalid base URL.
    /// - [`AppError::Transport`] — the HTTP client could not be built.
    /// - [`AppError::Io`] — the thread file exists but cannot be read.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = AgentClient::new(config)?;
        let threads = ThreadStore::new(config.thread_file.clone());

        let mut machine = SessionMachine::new(
            config.stream.terminal_states.clone(),
            config.stream.highlight_capacity,
        );
        machine.set_thread_id(threads.load()?);

        let prompt_idempotency = if config.retry.prompt_idempotent {
            Idempotency::Idempotent
        } else {
            Idempotency::NonIdempotent
        };

        Ok(Self {
            client,
            lifecycle: Arc::new(RequestLifecycle::new()),
            machine,
            threads,
            reader_options: ReaderOptions {
                mode: config.framing,
                max_frame_bytes: config.stream.max_frame_bytes,
                idle_timeout: config.idle_timeout(),
            },
            retry: config.retry_policy(),
            prompt_idempotency,
        })
    }

    /// Read-only view of the session.
    #[must_use]
    pub fn session(&self) -> &SessionState {
        self.machine.state()
    }

    /// Underlying HTTP client.
    #[must_use]
    pub fn client(&self) -> &AgentClient {
        &self.client
    }

    /// Subscribe to node highlights of current requests.
    #[must_use]
    pub fn subscribe_highlights(&self) -> broadcast::Receiver<NodeHighlight> {
        self.machine.subscribe_highlights()
    }

    /// Handle that cancels the in-flight turn from another task.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::new(Arc::clone(&self.lifecycle))
    }

    /// Send `prompt` to the non-streaming endpoint.
    ///
    /// Retries follow the configured policy when the prompt call is marked
    /// idempotent. Failures are recorded in the returned state, never raised.
    pub async fn ask(&mut self, prompt: &str) -> &SessionState {
        let handle = self.lifecycle.issue();
        self.begin_turn();
        self.machine.start(prompt, handle.generation());

        self.run_ask(prompt, &handle).await;

        self.lifecycle.release(handle.generation());
        self.machine.state()
    }

    /// Stream the answer to `prompt`.
    pub async fn stream(&mut self, prompt: &str) -> &SessionState {
        self.stream_with(prompt, |_: &StreamEvent| {}).await
    }

    /// Stream the answer to `prompt`, calling `observer` with every value
    /// that changed the session.
    ///
    /// Returns once the turn is terminal or has been cancelled.
    pub async fn stream_with<F>(&mut self, prompt: &str, mut observer: F) -> &SessionState
    where
        F: FnMut(&StreamEvent),
    {
        let handle = self.lifecycle.issue();
        self.begin_turn();
        self.machine.start(prompt, handle.generation());

        self.run_stream(prompt, &handle, &mut observer).await;

        self.lifecycle.release(handle.generation());
        self.machine.state()
    }

    /// Apply one reader result if its generation is still current.
    ///
    /// Returns `true` when the session changed.
    pub fn dispatch(&mut self, tagged: Tagged) -> bool {
        self.dispatch_observed(tagged, &mut |_: &StreamEvent| {})
    }

    /// Cancel any in-flight turn and start a new conversation thread.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if the persisted thread id cannot be removed.
    pub fn reset(&mut self) -> Result<()> {
        self.lifecycle.cancel();
        self.machine.discard();
        info!("conversation reset");
        self.threads.clear()
    }

    fn dispatch_observed<F>(&mut self, tagged: Tagged, observer: &mut F) -> bool
    where
        F: FnMut(&StreamEvent),
    {
        let Tagged { generation, item } = tagged;
        if !self.lifecycle.is_current(generation) {
            debug!(
                generation,
                current = self.lifecycle.current_generation(),
                "stale result dropped"
            );
            return false;
        }

        match item {
            ReaderItem::Event(event) => {
                let seen = event.clone();
                let changed = self.machine.apply(event);
                if changed {
                    observer(&seen);
                }
                changed
            }
            ReaderItem::Closed => self.machine.finish(),
            ReaderItem::Failed(message) => self.machine.fail(&message),
        }
    }

    async fn run_ask(&mut self, prompt: &str, handle: &RequestHandle) {
        let generation = handle.generation();
        let policy = self.retry.for_call(self.prompt_idempotency);
        let client = &self.client;
        let outcome = tokio::select! {
            biased;

            () = handle.token().cancelled() => Err(cancelled()),

            result = policy.execute(
                || client.prompt(prompt),
                |attempt, err: &AppError, delay| log_retry(attempt, err, delay),
            ) => result,
        };

        let item = match outcome {
            Ok(text) => ReaderItem::Event(StreamEvent::FinalResponse { text }),
            Err(err) if err.is_cancellation() => {
                self.settle_cancelled(generation);
                return;
            }
            Err(err) => failure_item(&err),
        };
        self.dispatch(Tagged { generation, item });
    }

    async fn run_stream<F>(&mut self, prompt: &str, handle: &RequestHandle, observer: &mut F)
    where
        F: FnMut(&StreamEvent),
    {
        let generation = handle.generation();
        let thread_id = self.machine.ensure_thread_id().to_owned();
        if let Err(err) = self.threads.save(&thread_id) {
            warn!(error = %err, "failed to persist thread id");
        }

        let token = handle.token().clone();
        let opened = tokio::select! {
            biased;
            () = token.cancelled() => Err(cancelled()),
            result = self.client.open_stream(prompt, Some(&thread_id)) => result,
        };

        let response = match opened {
            Ok(response) => response,
            Err(err) if err.is_cancellation() => {
                self.settle_cancelled(generation);
                return;
            }
            Err(err) => {
                self.dispatch(Tagged {
                    generation,
                    item: failure_item(&err),
                });
                return;
            }
        };

        let (tx, mut rx) = mpsc::channel(READER_CHANNEL_CAPACITY);
        let reader = tokio::spawn(run_reader(
            generation,
            AgentClient::body_reader(response),
            self.reader_options,
            tx,
            token.clone(),
        ));

        while let Some(tagged) = rx.recv().await {
            self.dispatch_observed(tagged, observer);
            if self.machine.status().is_terminal() {
                break;
            }
        }

        // Stop the reader; dropping the receiver unblocks a pending send.
        token.cancel();
        drop(rx);
        if let Err(err) = reader.await {
            warn!(generation, error = %err, "stream reader task failed");
        }

        if self.machine.status().is_in_flight() {
            if self.lifecycle.is_current(generation) {
                self.machine.fail(TRANSPORT_FALLBACK_MESSAGE);
            } else {
                self.settle_cancelled(generation);
            }
        }
    }

    /// Make room for a new turn while keeping the thread id.
    fn begin_turn(&mut self) {
        let status = self.machine.status();
        if status.is_terminal() {
            self.machine.reset();
        } else if status.is_in_flight() {
            self.machine.cancel();
        }
    }

    fn settle_cancelled(&mut self, generation: u64) {
        debug!(generation, "turn cancelled");
        if self.machine.status().is_in_flight() {
            self.machine.cancel();
        }
    }
}

fn cancelled() -> AppError {
    AppError::Cancelled("request cancelled".into())
}

fn failure_item(err: &AppError) -> ReaderItem {
    warn!(error = %err, "agent request failed");
    ReaderItem::Failed(err.user_message().unwrap_or_else(|| err.to_string()))
}
