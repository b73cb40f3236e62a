//! Deferred values
//!
//! A deferred value is a single-assignment container for an eventual
//! outcome. Continuations registered on it fire exactly once each, in
//! registration order, and always through the scheduler queue: settling a
//! deferred never runs user code inline, so the settler's own remaining
//! synchronous code finishes first.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::{debug, warn};

use crate::engine::errors::{EngineError, EngineResult};
use crate::engine::scheduler::queue::QueueHandle;
use crate::engine::value::Value;

static NEXT_DEFERRED_ID: AtomicU64 = AtomicU64::new(0);

/// Unique deferred identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeferredId(pub u64);

impl DeferredId {
    fn next() -> Self {
        Self(NEXT_DEFERRED_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the inner value.
    #[inline]
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for DeferredId {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "Deferred({})", self.0)
    }
}

/// Settlement outcome.
///
/// `Cancelled` is the failure flavor produced by timeout/cancellation races;
/// it fires the failure branch of registered continuations.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The operation produced a value.
    Success(Value),
    /// The operation failed with a reason.
    Failure(Value),
    /// The operation was cancelled before it could produce a value.
    Cancelled(Value),
}

impl Outcome {
    /// True for the success branch.
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// The carried value or reason.
    #[inline]
    pub fn payload(&self) -> &Value {
        match self {
            Outcome::Success(v) | Outcome::Failure(v) | Outcome::Cancelled(v) => v,
        }
    }
}

/// Continuation callback, fired with the outcome's payload.
pub type OutcomeCallback = Box<dyn FnOnce(Value)>;

struct Continuation {
    on_success: OutcomeCallback,
    on_failure: OutcomeCallback,
}

#[derive(Debug)]
enum DeferredState {
    Pending,
    Settled(Outcome),
}

struct DeferredInner {
    id: DeferredId,
    state: DeferredState,
    continuations: Vec<Continuation>,
    queue: QueueHandle,
    /// Whether any continuation was ever registered. Failures that nobody
    /// observes are surfaced to the diagnostic sink on drop.
    observed: bool,
}

impl Drop for DeferredInner {
    fn drop(&mut self) {
        if self.observed {
            return;
        }
        if let DeferredState::Settled(Outcome::Failure(reason) | Outcome::Cancelled(reason)) =
            &self.state
        {
            warn!(deferred = %self.id, %reason, "deferred failure dropped unobserved");
        }
    }
}

/// Shared handle to a deferred value.
#[derive(Clone)]
pub struct DeferredHandle {
    id: DeferredId,
    inner: Rc<RefCell<DeferredInner>>,
}

impl std::fmt::Debug for DeferredHandle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("DeferredHandle")
            .field("id", &self.id)
            .field("state", &self.snapshot().state)
            .finish()
    }
}

impl DeferredHandle {
    /// Create a pending deferred whose continuations dispatch through
    /// `queue`.
    pub fn new(queue: QueueHandle) -> Self {
        let id = DeferredId::next();
        Self {
            id,
            inner: Rc::new(RefCell::new(DeferredInner {
                id,
                state: DeferredState::Pending,
                continuations: Vec::new(),
                queue,
                observed: false,
            })),
        }
    }

    /// Create a deferred already settled with `outcome`.
    pub fn settled(
        queue: QueueHandle,
        outcome: Outcome,
    ) -> Self {
        let handle = Self::new(queue);
        handle
            .settle(outcome)
            .unwrap_or_else(|_| unreachable!("fresh deferred cannot be settled"));
        handle
    }

    /// Get the deferred ID.
    #[inline]
    pub fn id(&self) -> DeferredId {
        self.id
    }

    /// The queue this deferred dispatches on.
    #[inline]
    pub fn queue(&self) -> QueueHandle {
        self.inner.borrow().queue.clone()
    }

    /// Whether the deferred is still pending.
    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self.inner.borrow().state, DeferredState::Pending)
    }

    /// Assign the outcome. Fails with
    /// [`EngineError::AlreadySettledFault`] on a second settlement; the
    /// first outcome stands and the second is discarded.
    ///
    /// Every continuation registered so far is enqueued, in registration
    /// order, onto the run queue. Nothing runs inline.
    pub fn settle(
        &self,
        outcome: Outcome,
    ) -> EngineResult<()> {
        let (queue, continuations) = {
            let mut inner = self.inner.borrow_mut();
            if !matches!(inner.state, DeferredState::Pending) {
                return Err(EngineError::AlreadySettledFault(inner.id));
            }
            debug!(deferred = %inner.id, outcome = ?outcome, "deferred settled");
            inner.state = DeferredState::Settled(outcome.clone());
            (inner.queue.clone(), std::mem::take(&mut inner.continuations))
        };
        for continuation in continuations {
            enqueue_branch(&queue, continuation, &outcome);
        }
        Ok(())
    }

    /// Settle with a success value.
    #[inline]
    pub fn settle_success(
        &self,
        value: Value,
    ) -> EngineResult<()> {
        self.settle(Outcome::Success(value))
    }

    /// Settle with a failure reason.
    #[inline]
    pub fn settle_failure(
        &self,
        reason: Value,
    ) -> EngineResult<()> {
        self.settle(Outcome::Failure(reason))
    }

    /// Settle as cancelled.
    #[inline]
    pub fn cancel(
        &self,
        reason: Value,
    ) -> EngineResult<()> {
        self.settle(Outcome::Cancelled(reason))
    }

    /// Register a continuation pair. While pending it is appended; once
    /// settled the matching branch is enqueued immediately, still through
    /// the queue, never inline.
    pub fn register_continuation(
        &self,
        on_success: impl FnOnce(Value) + 'static,
        on_failure: impl FnOnce(Value) + 'static,
    ) {
        let mut inner = self.inner.borrow_mut();
        inner.observed = true;
        let continuation = Continuation {
            on_success: Box::new(on_success),
            on_failure: Box::new(on_failure),
        };
        match &inner.state {
            DeferredState::Pending => inner.continuations.push(continuation),
            DeferredState::Settled(outcome) => {
                let outcome = outcome.clone();
                enqueue_branch(&inner.queue, continuation, &outcome);
            }
        }
    }

    /// Read the settled outcome, if any. Read-only inspection; does not
    /// count as observing a failure.
    pub fn outcome(&self) -> Option<Outcome> {
        match &self.inner.borrow().state {
            DeferredState::Pending => None,
            DeferredState::Settled(outcome) => Some(outcome.clone()),
        }
    }

    /// Synchronous accessor for drivers and tests: the settled success
    /// value, or the corresponding fault.
    pub fn expect_value(&self) -> EngineResult<Value> {
        match self.outcome() {
            None => Err(EngineError::InvalidState(format!(
                "{} is still pending",
                self.id
            ))),
            Some(Outcome::Success(value)) => Ok(value),
            Some(Outcome::Failure(reason)) => {
                Err(EngineError::UncaughtSuspendedException(reason))
            }
            Some(Outcome::Cancelled(_)) => Err(EngineError::CancelledFault(self.id)),
        }
    }

    /// Diagnostics snapshot.
    pub fn snapshot(&self) -> DeferredSnapshot {
        let inner = self.inner.borrow();
        let (state, payload) = match &inner.state {
            DeferredState::Pending => ("pending", None),
            DeferredState::Settled(Outcome::Success(v)) => ("fulfilled", Some(v.clone())),
            DeferredState::Settled(Outcome::Failure(v)) => ("rejected", Some(v.clone())),
            DeferredState::Settled(Outcome::Cancelled(v)) => ("cancelled", Some(v.clone())),
        };
        DeferredSnapshot {
            id: inner.id.inner(),
            state,
            payload,
            pending_continuations: inner.continuations.len(),
        }
    }
}

/// Read-only diagnostics view of a deferred.
#[derive(Debug, Clone, Serialize)]
pub struct DeferredSnapshot {
    /// Deferred id.
    pub id: u64,
    /// `pending`, `fulfilled`, `rejected`, or `cancelled`.
    pub state: &'static str,
    /// Settled value or reason.
    pub payload: Option<Value>,
    /// Continuations still waiting (always 0 once settled).
    pub pending_continuations: usize,
}

fn enqueue_branch(
    queue: &QueueHandle,
    continuation: Continuation,
    outcome: &Outcome,
) {
    let payload = outcome.payload().clone();
    let callback = match outcome {
        Outcome::Success(_) => continuation.on_success,
        Outcome::Failure(_) | Outcome::Cancelled(_) => continuation.on_failure,
    };
    queue.push_continuation(move || callback(payload));
}
