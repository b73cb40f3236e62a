//! Bounded cooperative scheduler
//!
//! A single-threaded run loop over a FIFO of ready work: continuation fires
//! (settled deferreds awaiting their registered callbacks) and external
//! events (work fed in by collaborators such as a listening socket
//! abstraction). The scheduler is an explicit, constructible object owned by
//! the entry point; tests build as many independent instances as they like.
//!
//! There is no preemption. A unit of work runs to its next suspension or
//! completion; stopping only prevents further entries from being serviced.

pub mod event;
pub mod queue;

pub use event::{EventSource, ExternalEvent, QueuedSource, TimerSource};
pub use queue::{QueueEntry, QueueHandle};

use std::cell::{Cell, RefCell};

use serde::Serialize;
use tracing::{debug, trace};

use crate::engine::deferred::DeferredHandle;
use crate::engine::errors::{EngineError, EngineResult};

/// Scheduler run-loop phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    /// Not inside `run`.
    Idle,
    /// Inside `run`, servicing entries.
    Draining,
    /// `stop` was requested; the last `run` has returned.
    Stopped,
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Upper bound on continuation fires serviced between two external
    /// events. Exceeding it aborts the run: it means a continuation keeps
    /// scheduling itself without ever suspending.
    pub continuation_burst_limit: usize,
    /// Emit a trace line per dispatched entry.
    pub trace_dispatch: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            continuation_burst_limit: 1_000_000,
            trace_dispatch: false,
        }
    }
}

/// Scheduler counters.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    continuations_fired: Cell<usize>,
    externals_serviced: Cell<usize>,
    runs_completed: Cell<usize>,
}

impl SchedulerStats {
    /// Snapshot the counters for diagnostics.
    pub fn snapshot(&self) -> SchedulerStatsSnapshot {
        SchedulerStatsSnapshot {
            continuations_fired: self.continuations_fired.get(),
            externals_serviced: self.externals_serviced.get(),
            runs_completed: self.runs_completed.get(),
        }
    }
}

/// Serializable view of [`SchedulerStats`].
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatsSnapshot {
    /// Continuation fires dispatched.
    pub continuations_fired: usize,
    /// External events serviced.
    pub externals_serviced: usize,
    /// Completed calls to `run`.
    pub runs_completed: usize,
}

/// The cooperative run loop.
///
/// Methods take `&self`; all state is interior so that continuations holding
/// a shared scheduler reference can attempt (and be denied) a nested `run`.
pub struct Scheduler {
    config: SchedulerConfig,
    queue: QueueHandle,
    sources: RefCell<Vec<Box<dyn EventSource>>>,
    phase: Cell<SchedulerPhase>,
    stop_requested: Cell<bool>,
    next_source: Cell<usize>,
    total_serviced: Cell<usize>,
    stats: SchedulerStats,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("phase", &self.phase.get())
            .field("queued", &self.queue.len())
            .field("sources", &self.sources.borrow().len())
            .finish()
    }
}

impl Scheduler {
    /// Create a scheduler with default configuration.
    #[inline]
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Create a scheduler with custom configuration.
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            config,
            queue: QueueHandle::new(),
            sources: RefCell::new(Vec::new()),
            phase: Cell::new(SchedulerPhase::Idle),
            stop_requested: Cell::new(false),
            next_source: Cell::new(0),
            total_serviced: Cell::new(0),
            stats: SchedulerStats::default(),
        }
    }

    /// The enqueue handle shared with deferreds, drivers, and sources.
    #[inline]
    pub fn queue(&self) -> QueueHandle {
        self.queue.clone()
    }

    /// Create a pending deferred dispatching on this scheduler.
    #[inline]
    pub fn deferred(&self) -> DeferredHandle {
        DeferredHandle::new(self.queue.clone())
    }

    /// Register an event source. Sources are polled round-robin whenever
    /// the queue holds no ready external event.
    pub fn add_source(
        &self,
        source: impl EventSource + 'static,
    ) {
        self.sources.borrow_mut().push(Box::new(source));
    }

    /// Feed an external event directly, bypassing source polling.
    #[inline]
    pub fn submit(
        &self,
        event: ExternalEvent,
    ) {
        self.queue.push_external(event);
    }

    /// Current phase.
    #[inline]
    pub fn phase(&self) -> SchedulerPhase {
        self.phase.get()
    }

    /// Counter snapshot.
    #[inline]
    pub fn stats(&self) -> SchedulerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Request that no further queue entries be serviced. The in-flight
    /// handler, if any, runs to its next suspension or completion.
    pub fn stop(&self) {
        debug!("scheduler stop requested");
        self.stop_requested.set(true);
    }

    /// Pump the run loop.
    ///
    /// Entries are serviced strictly in enqueue order. Continuation fires
    /// are not counted; external events are. `max_events == 0` means
    /// unbounded: the loop services everything, including events that
    /// arrive while draining, and returns once `stop` was requested or the
    /// queue is empty and every source reports exhaustion (a transport that
    /// never exhausts keeps the loop alive until `stop`). `max_events == n`
    /// stops after `n` external events.
    ///
    /// Returns the number of external events actually serviced. A nested
    /// call while draining fails with
    /// [`EngineError::SchedulerReentrancyFault`].
    pub fn run(
        &self,
        max_events: usize,
    ) -> EngineResult<usize> {
        if self.phase.get() == SchedulerPhase::Draining {
            return Err(EngineError::SchedulerReentrancyFault);
        }
        self.phase.set(SchedulerPhase::Draining);
        self.stop_requested.set(false);
        trace!(max_events, "scheduler run begins");

        let mut serviced = 0usize;
        let outcome = self.drain(max_events, &mut serviced);

        self.phase.set(if self.stop_requested.get() {
            SchedulerPhase::Stopped
        } else {
            SchedulerPhase::Idle
        });
        self.stats
            .runs_completed
            .set(self.stats.runs_completed.get() + 1);
        trace!(serviced, "scheduler run ends");
        outcome.map(|_| serviced)
    }

    fn drain(
        &self,
        max_events: usize,
        serviced: &mut usize,
    ) -> EngineResult<()> {
        let mut burst = 0usize;
        loop {
            if self.stop_requested.get() {
                return Ok(());
            }

            match self.queue.pop() {
                Some(QueueEntry::ContinuationFire(fire)) => {
                    burst += 1;
                    if burst > self.config.continuation_burst_limit {
                        return Err(EngineError::InvalidState(format!(
                            "continuation burst exceeded {} fires without an external event",
                            self.config.continuation_burst_limit
                        )));
                    }
                    if self.config.trace_dispatch {
                        trace!("dispatch continuation fire");
                    }
                    fire();
                    self.stats
                        .continuations_fired
                        .set(self.stats.continuations_fired.get() + 1);
                }
                Some(QueueEntry::External(event)) => {
                    burst = 0;
                    self.service_external(event, serviced);
                    if max_events > 0 && *serviced == max_events {
                        return Ok(());
                    }
                }
                None => {
                    match self.poll_sources() {
                        Some(event) => {
                            burst = 0;
                            self.service_external(event, serviced);
                            if max_events > 0 && *serviced == max_events {
                                return Ok(());
                            }
                        }
                        None => {
                            // Nothing ready. Give up only when no source can
                            // ever produce again; otherwise keep polling
                            // until stopped.
                            if self.queue.is_empty() && self.sources_exhausted() {
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
    }

    fn service_external(
        &self,
        event: ExternalEvent,
        serviced: &mut usize,
    ) {
        if self.config.trace_dispatch {
            trace!(label = event.label(), "dispatch external event");
        }
        event.fire();
        *serviced += 1;
        self.total_serviced.set(self.total_serviced.get() + 1);
        self.stats
            .externals_serviced
            .set(self.stats.externals_serviced.get() + 1);
        self.acknowledge_sources();
    }

    /// Poll registered sources round-robin, starting after the source that
    /// produced last time.
    fn poll_sources(&self) -> Option<ExternalEvent> {
        let mut sources = self.sources.borrow_mut();
        let count = sources.len();
        if count == 0 {
            return None;
        }
        let start = self.next_source.get() % count;
        for offset in 0..count {
            let index = (start + offset) % count;
            if let Some(event) = sources[index].poll_ready() {
                self.next_source.set(index + 1);
                return Some(event);
            }
        }
        None
    }

    fn sources_exhausted(&self) -> bool {
        self.sources
            .borrow()
            .iter()
            .all(|source| source.is_exhausted())
    }

    fn acknowledge_sources(&self) {
        let total = self.total_serviced.get();
        for source in self.sources.borrow_mut().iter_mut() {
            source.acknowledge(total);
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
