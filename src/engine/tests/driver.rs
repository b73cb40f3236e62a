//! Async driver unit tests

use std::cell::RefCell;
use std::rc::Rc;

use crate::engine::deferred::Outcome;
use crate::engine::driver::{decode_step, encode_step, AsyncDriver, AsyncSequence};
use crate::engine::scheduler::Scheduler;
use crate::engine::sequence::{ScriptStep, SequenceHandle};
use crate::engine::value::Value;

/// An awaiting body: yields the deferred, stores what comes back, returns it.
fn awaiting_sequence(awaited: Value) -> SequenceHandle {
    SequenceHandle::from_script(vec![
        ScriptStep::Emit(awaited),
        ScriptStep::StoreSent("settled".into()),
        ScriptStep::FinishLocal("settled".into()),
    ])
}

#[test]
fn test_await_success_resumes_with_settled_value() {
    let scheduler = Scheduler::new();
    let response = scheduler.deferred();
    let outward = AsyncDriver::spawn(
        scheduler.queue(),
        awaiting_sequence(Value::Deferred(response.clone())),
    );

    // The body ran to its first await; nothing settled yet
    assert!(outward.is_pending());

    response.settle_success(Value::Int(42)).unwrap();
    scheduler.run(0).unwrap();
    assert_eq!(outward.expect_value().unwrap(), Value::Int(42));
}

#[test]
fn test_await_failure_propagates_to_outward_deferred() {
    let scheduler = Scheduler::new();
    let response = scheduler.deferred();
    let outward = AsyncDriver::spawn(
        scheduler.queue(),
        awaiting_sequence(Value::Deferred(response.clone())),
    );
    // Observe the failure so it is not reported as dropped
    outward.register_continuation(|_| panic!("failure expected"), |_| {});

    response.settle_failure(Value::str("X")).unwrap();
    scheduler.run(0).unwrap();

    // Failure "X" surfaced without ever producing a success
    assert_eq!(outward.outcome(), Some(Outcome::Failure(Value::str("X"))));
}

#[test]
fn test_non_deferred_suspension_is_treated_as_resolved() {
    let scheduler = Scheduler::new();
    let outward = AsyncDriver::spawn(scheduler.queue(), awaiting_sequence(Value::Int(7)));

    // The resumption is queued, never inline
    assert!(outward.is_pending());
    scheduler.run(0).unwrap();
    assert_eq!(outward.expect_value().unwrap(), Value::Int(7));
}

#[test]
fn test_body_without_suspensions_settles_immediately() {
    let scheduler = Scheduler::new();
    let outward = AsyncDriver::spawn(
        scheduler.queue(),
        SequenceHandle::from_script(vec![ScriptStep::Finish(Value::Int(1))]),
    );
    assert_eq!(outward.expect_value().unwrap(), Value::Int(1));
}

#[test]
fn test_uncaught_body_exception_fails_outward_deferred() {
    let scheduler = Scheduler::new();
    let outward = AsyncDriver::spawn(
        scheduler.queue(),
        SequenceHandle::from_script(vec![ScriptStep::Fail(Value::str("boom"))]),
    );
    outward.register_continuation(|_| panic!("failure expected"), |_| {});
    assert_eq!(outward.outcome(), Some(Outcome::Failure(Value::str("boom"))));
}

#[test]
fn test_chained_awaits_settle_in_order() {
    let scheduler = Scheduler::new();
    let first = scheduler.deferred();
    let second = scheduler.deferred();
    let sequence = SequenceHandle::from_script(vec![
        ScriptStep::Emit(Value::Deferred(first.clone())),
        ScriptStep::StoreSent("a".into()),
        ScriptStep::Emit(Value::Deferred(second.clone())),
        ScriptStep::StoreSent("b".into()),
        ScriptStep::FinishLocal("b".into()),
    ]);
    let outward = AsyncDriver::spawn(scheduler.queue(), sequence);

    first.settle_success(Value::Int(1)).unwrap();
    scheduler.run(0).unwrap();
    // Still parked on the second await
    assert!(outward.is_pending());

    second.settle_success(Value::Int(2)).unwrap();
    scheduler.run(0).unwrap();
    assert_eq!(outward.expect_value().unwrap(), Value::Int(2));
}

#[test]
fn test_step_pair_encoding_round_trip() {
    let encoded = encode_step(Value::Int(5), false);
    let decoded = decode_step(&encoded).unwrap();
    assert_eq!(decoded.value, Value::Int(5));
    assert!(!decoded.done);
    assert!(decode_step(&Value::Int(5)).is_none());
}

#[test]
fn test_async_sequence_surfaces_awaited_elements() {
    let scheduler = Scheduler::new();
    let element = scheduler.deferred();
    let sequence = SequenceHandle::from_script(vec![
        ScriptStep::Emit(Value::Deferred(element.clone())),
        ScriptStep::Emit(Value::Int(2)),
        ScriptStep::Finish(Value::Int(3)),
    ]);
    let iterator = AsyncSequence::new(scheduler.queue(), sequence);

    let steps: Rc<RefCell<Vec<(Value, bool)>>> = Rc::new(RefCell::new(Vec::new()));
    for _ in 0..4 {
        let sink = steps.clone();
        iterator.next(Value::Undefined).register_continuation(
            move |pair| {
                let step = decode_step(&pair).expect("step pair");
                sink.borrow_mut().push((step.value, step.done));
            },
            |reason| panic!("unexpected failure: {}", reason),
        );
    }

    element.settle_success(Value::Int(1)).unwrap();
    scheduler.run(0).unwrap();

    assert_eq!(
        *steps.borrow(),
        vec![
            (Value::Int(1), false),
            (Value::Int(2), false),
            (Value::Int(3), true),
            // Exhausted iterators keep answering done
            (Value::Undefined, true),
        ]
    );
}

#[test]
fn test_async_sequence_failure_rejects_step() {
    let scheduler = Scheduler::new();
    let sequence = SequenceHandle::from_script(vec![
        ScriptStep::Emit(Value::Int(1)),
        ScriptStep::Fail(Value::str("mid-stream")),
    ]);
    let iterator = AsyncSequence::new(scheduler.queue(), sequence);

    let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    for _ in 0..2 {
        let ok = log.clone();
        let bad = log.clone();
        iterator.next(Value::Undefined).register_continuation(
            move |pair| ok.borrow_mut().push(format!("ok:{}", pair)),
            move |reason| bad.borrow_mut().push(format!("err:{}", reason)),
        );
    }
    scheduler.run(0).unwrap();

    assert_eq!(*log.borrow(), vec!["ok:[1, false]", "err:mid-stream"]);
}
