//! Async driver
//!
//! Couples a resumable sequence to the deferred-value protocol. Each
//! suspension of the sequence is inspected: a yielded [`Value::Deferred`]
//! parks the driver as that deferred's continuation; anything else is
//! treated as already resolved and an immediate resumption is enqueued.
//! Either way the sequence is only ever re-entered from the scheduler
//! queue, so a settler's synchronous code always finishes first.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::engine::deferred::DeferredHandle;
use crate::engine::errors::EngineError;
use crate::engine::scheduler::queue::QueueHandle;
use crate::engine::sequence::{SequenceHandle, StepResult};
use crate::engine::value::Value;

/// Encode a `{value, done}` step pair for transport inside a deferred.
pub fn encode_step(
    value: Value,
    done: bool,
) -> Value {
    Value::list(vec![value, Value::Bool(done)])
}

/// Decode a step pair produced by [`encode_step`].
pub fn decode_step(value: &Value) -> Option<StepResult> {
    let items = value.as_list()?;
    match items {
        [value, Value::Bool(done)] => Some(StepResult {
            value: value.clone(),
            done: *done,
        }),
        _ => None,
    }
}

enum DriverInput {
    Resume(Value),
    Inject(Value),
}

struct DriverInner {
    sequence: SequenceHandle,
    outward: DeferredHandle,
    queue: QueueHandle,
}

/// Drives a sequence to completion through its awaits.
///
/// The driver exposes a single outward deferred that settles exactly once:
/// success with the sequence's final return value, failure with its uncaught
/// exception.
pub struct AsyncDriver;

impl AsyncDriver {
    /// Start driving `sequence`. The body runs synchronously up to its
    /// first suspension, like an async function runs to its first await.
    pub fn spawn(
        queue: QueueHandle,
        sequence: SequenceHandle,
    ) -> DeferredHandle {
        let outward = DeferredHandle::new(queue.clone());
        let inner = Rc::new(DriverInner {
            sequence,
            outward: outward.clone(),
            queue,
        });
        debug!(sequence = %inner.sequence.id(), outward = %outward.id(), "async driver spawned");
        Self::step(inner, DriverInput::Resume(Value::Undefined));
        outward
    }

    fn step(
        driver: Rc<DriverInner>,
        input: DriverInput,
    ) {
        let result = match input {
            DriverInput::Resume(value) => driver.sequence.resume(value),
            DriverInput::Inject(exception) => driver.sequence.force_throw(exception),
        };

        match result {
            Ok(StepResult { value, done: true }) => {
                Self::settle_once(&driver, Ok(value));
            }
            Ok(StepResult { value, done: false }) => {
                if let Some(awaited) = value.as_deferred().cloned() {
                    trace!(sequence = %driver.sequence.id(), awaited = %awaited.id(), "driver awaiting");
                    let on_success = driver.clone();
                    let on_failure = driver.clone();
                    awaited.register_continuation(
                        move |settled| Self::step(on_success, DriverInput::Resume(settled)),
                        move |reason| Self::step(on_failure, DriverInput::Inject(reason)),
                    );
                } else {
                    // Already resolved; resumption still goes through the
                    // queue, never inline.
                    let resumed = driver.clone();
                    driver
                        .queue
                        .push_continuation(move || Self::step(resumed, DriverInput::Resume(value)));
                }
            }
            Err(EngineError::UncaughtSuspendedException(exception)) => {
                Self::settle_once(&driver, Err(exception));
            }
            Err(fault) => {
                Self::settle_once(&driver, Err(Value::str(fault.to_string())));
            }
        }
    }

    fn settle_once(
        driver: &DriverInner,
        outcome: Result<Value, Value>,
    ) {
        let settled = match outcome {
            Ok(value) => driver.outward.settle_success(value),
            Err(reason) => driver.outward.settle_failure(reason),
        };
        if let Err(fault) = settled {
            debug!(outward = %driver.outward.id(), %fault, "outward deferred already settled");
        }
    }
}

struct AsyncSequenceState {
    in_flight: bool,
    finished: bool,
    waiters: VecDeque<(Value, DeferredHandle)>,
}

struct AsyncSequenceInner {
    sequence: SequenceHandle,
    queue: QueueHandle,
    state: RefCell<AsyncSequenceState>,
}

/// An asynchronously iterated sequence: each step surfaces through a
/// deferred `{value, done}` pair, and an element that is itself a deferred
/// is awaited before being surfaced.
///
/// `next` requests are serviced strictly in call order; a request issued
/// while a step is in flight queues behind it.
#[derive(Clone)]
pub struct AsyncSequence {
    inner: Rc<AsyncSequenceInner>,
}

impl AsyncSequence {
    /// Wrap a sequence for asynchronous iteration.
    pub fn new(
        queue: QueueHandle,
        sequence: SequenceHandle,
    ) -> Self {
        Self {
            inner: Rc::new(AsyncSequenceInner {
                sequence,
                queue,
                state: RefCell::new(AsyncSequenceState {
                    in_flight: false,
                    finished: false,
                    waiters: VecDeque::new(),
                }),
            }),
        }
    }

    /// Request the next step, resuming the body with `input`. The returned
    /// deferred settles with an encoded `{value, done}` pair (see
    /// [`decode_step`]), or with a failure if the body raises.
    pub fn next(
        &self,
        input: Value,
    ) -> DeferredHandle {
        let step = DeferredHandle::new(self.inner.queue.clone());
        {
            let mut state = self.inner.state.borrow_mut();
            state.waiters.push_back((input, step.clone()));
        }
        Self::service(self.inner.clone());
        step
    }

    /// Start the frontmost queued request unless one is already in flight.
    fn service(inner: Rc<AsyncSequenceInner>) {
        let next = {
            let mut state = inner.state.borrow_mut();
            if state.in_flight {
                return;
            }
            let Some((input, waiter)) = state.waiters.pop_front() else {
                return;
            };
            if state.finished {
                // Exhausted iterators keep answering `{undefined, done}`.
                let _ = waiter.settle_success(encode_step(Value::Undefined, true));
                drop(state);
                Self::service(inner);
                return;
            }
            state.in_flight = true;
            (input, waiter)
        };
        Self::pump(inner, DriverInput::Resume(next.0), next.1);
    }

    fn pump(
        inner: Rc<AsyncSequenceInner>,
        input: DriverInput,
        waiter: DeferredHandle,
    ) {
        let result = match input {
            DriverInput::Resume(value) => inner.sequence.resume(value),
            DriverInput::Inject(exception) => inner.sequence.force_throw(exception),
        };

        match result {
            Ok(StepResult { value, done: true }) => {
                Self::finish_step(inner, &waiter, Ok(encode_step(value, true)), true);
            }
            Ok(StepResult { value, done: false }) => {
                if let Some(awaited) = value.as_deferred().cloned() {
                    // Await the element before surfacing it.
                    let succeeded = inner.clone();
                    let failed = inner.clone();
                    let success_waiter = waiter.clone();
                    awaited.register_continuation(
                        move |settled| {
                            Self::finish_step(
                                succeeded,
                                &success_waiter,
                                Ok(encode_step(settled, false)),
                                false,
                            );
                        },
                        move |reason| {
                            // Give the body a chance to absorb the failure.
                            Self::pump(failed, DriverInput::Inject(reason), waiter);
                        },
                    );
                } else {
                    Self::finish_step(inner, &waiter, Ok(encode_step(value, false)), false);
                }
            }
            Err(EngineError::UncaughtSuspendedException(exception)) => {
                Self::finish_step(inner, &waiter, Err(exception), true);
            }
            Err(fault) => {
                Self::finish_step(inner, &waiter, Err(Value::str(fault.to_string())), true);
            }
        }
    }

    fn finish_step(
        inner: Rc<AsyncSequenceInner>,
        waiter: &DeferredHandle,
        outcome: Result<Value, Value>,
        finished: bool,
    ) {
        let settled = match outcome {
            Ok(step) => waiter.settle_success(step),
            Err(reason) => waiter.settle_failure(reason),
        };
        if let Err(fault) = settled {
            debug!(step = %waiter.id(), %fault, "async step already settled");
        }
        {
            let mut state = inner.state.borrow_mut();
            state.in_flight = false;
            state.finished = state.finished || finished;
        }
        Self::service(inner);
    }
}
