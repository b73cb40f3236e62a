//! End-to-end request pump: external events spawn async computations that
//! settle inside the same drain, the shape a server entry point uses.

use std::cell::RefCell;
use std::rc::Rc;

use weft::{
    AsyncDriver, DeferredHandle, ExternalEvent, QueuedSource, Scheduler, ScriptStep,
    SequenceHandle, Value,
};

fn request_event(
    scheduler: &Scheduler,
    id: i64,
    responses: &Rc<RefCell<Vec<(i64, Value)>>>,
) -> ExternalEvent {
    let queue = scheduler.queue();
    let responses = responses.clone();
    ExternalEvent::new(format!("request-{}", id), move || {
        let body = DeferredHandle::new(queue.clone());
        let sequence = SequenceHandle::from_script(vec![
            ScriptStep::Emit(Value::Deferred(body.clone())),
            ScriptStep::StoreSent("payload".into()),
            ScriptStep::FinishLocal("payload".into()),
        ]);
        let outcome = AsyncDriver::spawn(queue.clone(), sequence);
        outcome.register_continuation(
            move |value| responses.borrow_mut().push((id, value)),
            move |reason| panic!("request failed: {}", reason),
        );
        // The handler itself produces the response asynchronously
        body.settle_success(Value::Int(id * 10)).unwrap();
    })
}

#[test]
fn bounded_pump_services_exactly_the_budget() {
    let scheduler = Scheduler::new();
    let responses = Rc::new(RefCell::new(Vec::new()));

    let mut source = QueuedSource::new("connections");
    for id in 0..5 {
        source.push(request_event(&scheduler, id, &responses));
    }
    scheduler.add_source(source);

    assert_eq!(scheduler.run(3).unwrap(), 3);
    // The run returns as soon as the third event is serviced; that
    // request's continuation fires are still queued for the next run.
    assert_eq!(
        *responses.borrow(),
        vec![(0, Value::Int(0)), (1, Value::Int(10))]
    );

    assert_eq!(scheduler.run(0).unwrap(), 2);
    assert_eq!(
        *responses.borrow(),
        vec![
            (0, Value::Int(0)),
            (1, Value::Int(10)),
            (2, Value::Int(20)),
            (3, Value::Int(30)),
            (4, Value::Int(40)),
        ]
    );
}

#[test]
fn unbounded_pump_drains_everything_and_returns() {
    let scheduler = Scheduler::new();
    let responses = Rc::new(RefCell::new(Vec::new()));

    let mut source = QueuedSource::new("connections");
    for id in 0..4 {
        source.push(request_event(&scheduler, id, &responses));
    }
    scheduler.add_source(source);

    assert_eq!(scheduler.run(0).unwrap(), 4);
    assert_eq!(responses.borrow().len(), 4);

    let stats = scheduler.stats();
    assert_eq!(stats.externals_serviced, 4);
    // Each request fires at least its driver resumption and its response
    assert!(stats.continuations_fired >= 4);
}

#[test]
fn two_schedulers_are_independent() {
    let first = Scheduler::new();
    let second = Scheduler::new();
    let responses_first = Rc::new(RefCell::new(Vec::new()));
    let responses_second = Rc::new(RefCell::new(Vec::new()));

    first.submit(request_event(&first, 1, &responses_first));
    second.submit(request_event(&second, 2, &responses_second));

    assert_eq!(first.run(0).unwrap(), 1);
    assert_eq!(*responses_first.borrow(), vec![(1, Value::Int(10))]);
    // The second scheduler has not run; its work is untouched
    assert!(responses_second.borrow().is_empty());

    assert_eq!(second.run(0).unwrap(), 1);
    assert_eq!(*responses_second.borrow(), vec![(2, Value::Int(20))]);
}
