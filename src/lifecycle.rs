//! Request lifecycle manager.
//!
//! Issues generation-tagged request handles and invalidates them. Every
//! downstream mutation passes [`RequestLifecycle::is_current`] first, so a
//! slow, abandoned request can never overwrite the result of a newer one.
//!
//! The manager is shared as an `Arc` so a [`CancelHandle`] can raise the
//! signal from another task (for example a Ctrl-C handler) while the turn
//! is being driven elsewhere.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Handle for one logical request.
///
/// Not `Clone`: in-flight operations borrow it, or clone its token, but the
/// generation is owned by exactly one turn.
#[derive(Debug)]
pub struct RequestHandle {
    generation: u64,
    cancel: CancellationToken,
}

impl RequestHandle {
    /// Generation id of this request.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Cancellation signal for this request.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the signal has been raised.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Issues and invalidates [`RequestHandle`]s.
#[derive(Debug, Default)]
pub struct RequestLifecycle {
    generation: AtomicU64,
    active: Mutex<Option<CancellationToken>>,
}

impl RequestLifecycle {
    /// Create a manager whose first handle has generation 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a handle with a fresh generation and cancellation signal.
    ///
    /// The previously active request is superseded: its signal is raised so
    /// its reads stop, and its generation is no longer current.
    pub fn issue(&self) -> RequestHandle {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = active.take() {
            previous.cancel();
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        *active = Some(cancel.clone());
        debug!(generation, "request issued");

        RequestHandle { generation, cancel }
    }

    /// Raise the signal for the most recent handle and make every issued
    /// handle stale.
    ///
    /// Returns `true` when a request was still active, `false` when nothing
    /// was in flight.
    pub fn cancel(&self) -> bool {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let token = active.take();
        let stale = self.generation.fetch_add(1, Ordering::SeqCst);
        debug!(stale_generation = stale, active = token.is_some(), "request cancelled");

        match token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Mark the request for `generation` as finished.
    ///
    /// A later [`cancel`](Self::cancel) then reports that nothing is in
    /// flight. Has no effect once `generation` has been superseded.
    pub fn release(&self, generation: u64) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_current(generation) && active.take().is_some() {
            debug!(generation, "request released");
        }
    }

    /// Whether an issued request has been neither released nor cancelled.
    #[must_use]
    pub fn has_active(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Whether results tagged with `generation` may still mutate state.
    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Current generation counter.
    #[must_use]
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

/// Clonable handle that cancels whatever request is current.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<RequestLifecycle>);

impl CancelHandle {
    /// Wrap a shared lifecycle manager.
    #[must_use]
    pub fn new(lifecycle: Arc<RequestLifecycle>) -> Self {
        Self(lifecycle)
    }

    /// Cancel the current request, if any.
    ///
    /// Returns `false` when no request was in flight.
    pub fn cancel(&self) -> bool {
        self.0.cancel()
    }
}
