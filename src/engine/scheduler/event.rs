//! External events and event sources
//!
//! An external event is a unit of work originating outside the engine (an
//! accepted connection, a timer expiry). The collaborator that produces it
//! owns payload well-formedness; the scheduler only counts and dispatches.

use std::collections::VecDeque;
use std::sync::Arc;

/// A single external unit of work: a label for diagnostics plus the handler
/// to invoke when the scheduler services it.
pub struct ExternalEvent {
    label: Arc<str>,
    handler: Box<dyn FnOnce()>,
}

impl std::fmt::Debug for ExternalEvent {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ExternalEvent")
            .field("label", &self.label)
            .finish()
    }
}

impl ExternalEvent {
    /// Create an event.
    pub fn new(
        label: impl AsRef<str>,
        handler: impl FnOnce() + 'static,
    ) -> Self {
        Self {
            label: Arc::from(label.as_ref()),
            handler: Box::new(handler),
        }
    }

    /// Diagnostic label.
    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Run the handler to its completion or next suspension. Consumes the
    /// event; handlers are invoked exactly once.
    #[inline]
    pub fn fire(self) {
        (self.handler)();
    }
}

/// A collaborator feeding external events into the scheduler.
///
/// `poll_ready` is non-blocking: it returns the next ready event or `None`.
/// After servicing, the scheduler reports back through `acknowledge` so the
/// source can keep its own accounting.
pub trait EventSource {
    /// Source name for diagnostics.
    fn name(&self) -> &str;

    /// Take the next ready event, if any.
    fn poll_ready(&mut self) -> Option<ExternalEvent>;

    /// Completion acknowledgment: `serviced` events produced by this source
    /// have been handled so far.
    fn acknowledge(
        &mut self,
        serviced: usize,
    ) {
        let _ = serviced;
    }

    /// True once this source can never produce another event. Transports
    /// that stay open (a listening socket) keep the default `false`, which
    /// keeps an unbounded run alive until it is stopped.
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// An event source backed by a pre-loaded queue. Stands in for a listening
/// socket in tests and the demo pump.
pub struct QueuedSource {
    name: String,
    pending: VecDeque<ExternalEvent>,
    acknowledged: usize,
}

impl QueuedSource {
    /// Create an empty source.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pending: VecDeque::new(),
            acknowledged: 0,
        }
    }

    /// Queue an event for later polling.
    pub fn push(
        &mut self,
        event: ExternalEvent,
    ) {
        self.pending.push_back(event);
    }

    /// Number of events not yet polled.
    #[inline]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Number of events the scheduler has acknowledged servicing.
    #[inline]
    pub fn acknowledged(&self) -> usize {
        self.acknowledged
    }
}

impl EventSource for QueuedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll_ready(&mut self) -> Option<ExternalEvent> {
        self.pending.pop_front()
    }

    fn acknowledge(
        &mut self,
        serviced: usize,
    ) {
        self.acknowledged = serviced;
    }

    fn is_exhausted(&self) -> bool {
        self.pending.is_empty()
    }
}

/// A source that produces one event after a fixed number of polls: the
/// minimal timer, used to build timeouts by racing a deferred against it.
pub struct TimerSource {
    name: String,
    remaining_polls: usize,
    event: Option<ExternalEvent>,
}

impl TimerSource {
    /// Create a timer that fires after `polls` calls to `poll_ready`.
    pub fn new(
        name: impl Into<String>,
        polls: usize,
        event: ExternalEvent,
    ) -> Self {
        Self {
            name: name.into(),
            remaining_polls: polls,
            event: Some(event),
        }
    }

    /// Whether the timer has already fired.
    #[inline]
    pub fn fired(&self) -> bool {
        self.event.is_none()
    }
}

impl EventSource for TimerSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll_ready(&mut self) -> Option<ExternalEvent> {
        if self.event.is_none() {
            return None;
        }
        if self.remaining_polls > 0 {
            self.remaining_polls -= 1;
            return None;
        }
        self.event.take()
    }

    fn is_exhausted(&self) -> bool {
        self.fired()
    }
}
