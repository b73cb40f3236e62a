//! Deferred combinators
//!
//! All combinators are derived: each creates a fresh deferred, registers a
//! continuation on every input, and settles the fresh one according to its
//! policy. Losing settlements inside a combinator are expected and silently
//! discarded; only direct double-settles through the public API fault.

use std::cell::RefCell;
use std::rc::Rc;

use crate::engine::deferred::{DeferredHandle, Outcome};
use crate::engine::scheduler::event::{ExternalEvent, TimerSource};
use crate::engine::scheduler::queue::QueueHandle;
use crate::engine::scheduler::Scheduler;
use crate::engine::value::Value;

/// Settles success once every input settled successfully, with results in
/// input order; settles failure on the first input failure. Later
/// settlements of the same input set are ignored.
pub fn all_of(
    queue: &QueueHandle,
    inputs: Vec<DeferredHandle>,
) -> DeferredHandle {
    let output = DeferredHandle::new(queue.clone());
    if inputs.is_empty() {
        let _ = output.settle_success(Value::list(Vec::new()));
        return output;
    }

    let results: Rc<RefCell<Vec<Option<Value>>>> = Rc::new(RefCell::new(vec![None; inputs.len()]));
    let remaining = Rc::new(RefCell::new(inputs.len()));

    for (index, input) in inputs.into_iter().enumerate() {
        let results = results.clone();
        let remaining = remaining.clone();
        let on_success_output = output.clone();
        let on_failure_output = output.clone();
        input.register_continuation(
            move |value| {
                results.borrow_mut()[index] = Some(value);
                let mut left = remaining.borrow_mut();
                *left -= 1;
                if *left == 0 {
                    let collected = results
                        .borrow_mut()
                        .iter_mut()
                        .map(|slot| slot.take().unwrap_or_default())
                        .collect();
                    let _ = on_success_output.settle_success(Value::list(collected));
                }
            },
            move |reason| {
                let _ = on_failure_output.settle_failure(reason);
            },
        );
    }
    output
}

/// Waits for every input to settle, then settles success with one
/// `[status, payload]` descriptor per input, in input order. Statuses match
/// the snapshot vocabulary (`fulfilled`, `rejected`, `cancelled`). Never
/// fails: input failures are reported, not propagated.
pub fn all_settled(
    queue: &QueueHandle,
    inputs: Vec<DeferredHandle>,
) -> DeferredHandle {
    let output = DeferredHandle::new(queue.clone());
    if inputs.is_empty() {
        let _ = output.settle_success(Value::list(Vec::new()));
        return output;
    }

    let descriptors: Rc<RefCell<Vec<Option<Value>>>> =
        Rc::new(RefCell::new(vec![None; inputs.len()]));
    let remaining = Rc::new(RefCell::new(inputs.len()));

    for (index, input) in inputs.into_iter().enumerate() {
        let success_slots = descriptors.clone();
        let failure_slots = descriptors.clone();
        let success_remaining = remaining.clone();
        let failure_remaining = remaining.clone();
        let on_success_output = output.clone();
        let on_failure_output = output.clone();
        let settled_input = input.clone();
        input.register_continuation(
            move |value| {
                record_descriptor(
                    &success_slots,
                    &success_remaining,
                    &on_success_output,
                    index,
                    Value::list(vec![Value::str("fulfilled"), value]),
                );
            },
            move |reason| {
                let status = match settled_input.outcome() {
                    Some(Outcome::Cancelled(_)) => "cancelled",
                    _ => "rejected",
                };
                record_descriptor(
                    &failure_slots,
                    &failure_remaining,
                    &on_failure_output,
                    index,
                    Value::list(vec![Value::str(status), reason]),
                );
            },
        );
    }
    output
}

fn record_descriptor(
    descriptors: &Rc<RefCell<Vec<Option<Value>>>>,
    remaining: &Rc<RefCell<usize>>,
    output: &DeferredHandle,
    index: usize,
    descriptor: Value,
) {
    descriptors.borrow_mut()[index] = Some(descriptor);
    let mut left = remaining.borrow_mut();
    *left -= 1;
    if *left == 0 {
        let collected = descriptors
            .borrow_mut()
            .iter_mut()
            .map(|slot| slot.take().unwrap_or_default())
            .collect();
        let _ = output.settle_success(Value::list(collected));
    }
}

/// Settles success on the first input success; settles failure with the
/// list of reasons, in input order, once every input has failed.
pub fn any_of(
    queue: &QueueHandle,
    inputs: Vec<DeferredHandle>,
) -> DeferredHandle {
    let output = DeferredHandle::new(queue.clone());
    if inputs.is_empty() {
        let _ = output.settle_failure(Value::list(Vec::new()));
        return output;
    }

    let reasons: Rc<RefCell<Vec<Option<Value>>>> = Rc::new(RefCell::new(vec![None; inputs.len()]));
    let remaining = Rc::new(RefCell::new(inputs.len()));

    for (index, input) in inputs.into_iter().enumerate() {
        let reasons = reasons.clone();
        let remaining = remaining.clone();
        let on_success_output = output.clone();
        let on_failure_output = output.clone();
        input.register_continuation(
            move |value| {
                let _ = on_success_output.settle_success(value);
            },
            move |reason| {
                reasons.borrow_mut()[index] = Some(reason);
                let mut left = remaining.borrow_mut();
                *left -= 1;
                if *left == 0 {
                    let collected = reasons
                        .borrow_mut()
                        .iter_mut()
                        .map(|slot| slot.take().unwrap_or_default())
                        .collect();
                    let _ = on_failure_output.settle_failure(Value::list(collected));
                }
            },
        );
    }
    output
}

/// Settles with whichever input settles first, preserving the outcome
/// flavor (a cancelled input cancels the race output).
pub fn race(
    queue: &QueueHandle,
    inputs: Vec<DeferredHandle>,
) -> DeferredHandle {
    let output = DeferredHandle::new(queue.clone());
    for input in inputs {
        let on_success_output = output.clone();
        let on_failure_output = output.clone();
        let failed_input = input.clone();
        input.register_continuation(
            move |value| {
                let _ = on_success_output.settle_success(value);
            },
            move |reason| {
                let outcome = match failed_input.outcome() {
                    Some(Outcome::Cancelled(_)) => Outcome::Cancelled(reason),
                    _ => Outcome::Failure(reason),
                };
                let _ = on_failure_output.settle(outcome);
            },
        );
    }
    output
}

/// Race `target` against a timer: the returned deferred settles with
/// `target`'s outcome, or as cancelled with `reason` if the timer fires
/// first. The timer fires after `polls` scheduler polls of its source.
pub fn cancel_after(
    scheduler: &Scheduler,
    target: DeferredHandle,
    polls: usize,
    reason: Value,
) -> DeferredHandle {
    let queue = scheduler.queue();
    let timeout = DeferredHandle::new(queue.clone());
    let trigger = timeout.clone();
    scheduler.add_source(TimerSource::new(
        "cancel-timer",
        polls,
        ExternalEvent::new("timeout", move || {
            // Losing the race to the target is fine.
            let _ = trigger.cancel(reason);
        }),
    ));
    race(&queue, vec![target, timeout])
}
