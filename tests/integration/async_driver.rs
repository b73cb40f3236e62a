//! End-to-end async driver scenarios

use std::cell::RefCell;
use std::rc::Rc;

use weft::{
    cancel_after, decode_step, AsyncDriver, AsyncSequence, Outcome, Scheduler, ScriptStep,
    SequenceHandle, Value,
};

#[test]
fn awaited_failure_propagates() {
    let scheduler = Scheduler::new();
    let awaited = scheduler.deferred();
    let sequence = SequenceHandle::from_script(vec![
        ScriptStep::Emit(Value::Deferred(awaited.clone())),
        ScriptStep::StoreSent("x".into()),
        ScriptStep::FinishLocal("x".into()),
    ]);
    let outward = AsyncDriver::spawn(scheduler.queue(), sequence);

    let outcomes: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let ok = outcomes.clone();
    let bad = outcomes.clone();
    outward.register_continuation(
        move |value| ok.borrow_mut().push(format!("success:{}", value)),
        move |reason| bad.borrow_mut().push(format!("failure:{}", reason)),
    );

    awaited.settle_failure(Value::str("X")).unwrap();
    scheduler.run(0).unwrap();

    // Failure "X" and never a success
    assert_eq!(*outcomes.borrow(), vec!["failure:X"]);
}

#[test]
fn async_computation_over_multiple_awaits_and_plain_values() {
    let scheduler = Scheduler::new();
    let first = scheduler.deferred();
    let sequence = SequenceHandle::from_script(vec![
        ScriptStep::Emit(Value::Deferred(first.clone())),
        ScriptStep::StoreSent("a".into()),
        // A plain value: treated as already resolved
        ScriptStep::Emit(Value::Int(10)),
        ScriptStep::StoreSent("b".into()),
        ScriptStep::FinishLocal("a".into()),
    ]);
    let outward = AsyncDriver::spawn(scheduler.queue(), sequence);

    first.settle_success(Value::Int(5)).unwrap();
    scheduler.run(0).unwrap();
    assert_eq!(outward.expect_value().unwrap(), Value::Int(5));
}

#[test]
fn async_body_can_absorb_awaited_failure() {
    // The body catches the injected failure and completes with it
    let scheduler = Scheduler::new();
    let awaited = scheduler.deferred();
    let handled: Rc<RefCell<Option<Value>>> = Rc::new(RefCell::new(None));

    let body_handled = handled.clone();
    let body_awaited = awaited.clone();
    let sequence = SequenceHandle::new(
        move |frame: &mut weft::FrameState, input: weft::ResumeInput| match input {
            weft::ResumeInput::Value(_) => {
                if frame.resume_point().inner() == 0 {
                    frame.set_resume_point(1u32);
                    weft::StepEvent::Yield(Value::Deferred(body_awaited.clone()))
                } else {
                    weft::StepEvent::Return(Value::str("unreachable"))
                }
            }
            weft::ResumeInput::Raise(exception) => {
                *body_handled.borrow_mut() = Some(exception);
                weft::StepEvent::Return(Value::str("recovered"))
            }
            weft::ResumeInput::Return(value) => weft::StepEvent::Return(value),
        },
    );
    let outward = AsyncDriver::spawn(scheduler.queue(), sequence);

    awaited.settle_failure(Value::str("transient")).unwrap();
    scheduler.run(0).unwrap();

    assert_eq!(outward.expect_value().unwrap(), Value::str("recovered"));
    assert_eq!(*handled.borrow(), Some(Value::str("transient")));
}

#[test]
fn async_iteration_full_consumption() {
    let scheduler = Scheduler::new();
    let slow_element = scheduler.deferred();
    let sequence = SequenceHandle::from_script(vec![
        ScriptStep::Emit(Value::Int(1)),
        ScriptStep::Emit(Value::Deferred(slow_element.clone())),
        ScriptStep::Finish(Value::str("done")),
    ]);
    let iterator = AsyncSequence::new(scheduler.queue(), sequence);

    let steps: Rc<RefCell<Vec<(Value, bool)>>> = Rc::new(RefCell::new(Vec::new()));
    for _ in 0..3 {
        let sink = steps.clone();
        iterator.next(Value::Undefined).register_continuation(
            move |pair| {
                let step = decode_step(&pair).expect("step pair");
                sink.borrow_mut().push((step.value, step.done));
            },
            |reason| panic!("unexpected failure: {}", reason),
        );
    }

    slow_element.settle_success(Value::Int(2)).unwrap();
    scheduler.run(0).unwrap();

    assert_eq!(
        *steps.borrow(),
        vec![
            (Value::Int(1), false),
            (Value::Int(2), false),
            (Value::str("done"), true),
        ]
    );
}

#[test]
fn timeout_race_cancels_slow_computation() {
    let scheduler = Scheduler::new();
    let slow = scheduler.deferred();
    let guarded = cancel_after(&scheduler, slow.clone(), 3, Value::str("deadline"));

    let observed: Rc<RefCell<Option<Outcome>>> = Rc::new(RefCell::new(None));
    let sink = observed.clone();
    let watched = guarded.clone();
    guarded.register_continuation(
        |_| panic!("cancellation expected"),
        move |_| *sink.borrow_mut() = watched.outcome(),
    );

    scheduler.run(0).unwrap();
    assert_eq!(
        *observed.borrow(),
        Some(Outcome::Cancelled(Value::str("deadline")))
    );
}
