//! End-to-end delegation scenarios

use weft::{ScriptStep, SequenceHandle, Value};

fn collect(seq: &SequenceHandle) -> (Vec<Value>, Value) {
    let mut seen = Vec::new();
    loop {
        let step = seq.resume(Value::Undefined).unwrap();
        if step.done {
            return (seen, step.value);
        }
        seen.push(step.value);
    }
}

#[test]
fn inner_drains_before_outer_continues() {
    let inner = SequenceHandle::from_values(
        vec![Value::Int(10), Value::Int(20)],
        Value::Int(100),
    );
    let outer = SequenceHandle::from_script(vec![
        ScriptStep::Emit(Value::Int(0)),
        ScriptStep::Delegate(inner),
        ScriptStep::Emit(Value::Int(99)),
        ScriptStep::Finish(Value::Undefined),
    ]);

    let (seen, _) = collect(&outer);
    assert_eq!(
        seen,
        vec![Value::Int(0), Value::Int(10), Value::Int(20), Value::Int(99)]
    );
}

#[test]
fn nested_delegation_chains_drain_innermost_first() {
    let innermost = SequenceHandle::from_values(vec![Value::Int(3)], Value::str("c"));
    let middle = SequenceHandle::from_script(vec![
        ScriptStep::Emit(Value::Int(2)),
        ScriptStep::Delegate(innermost),
        ScriptStep::Finish(Value::str("b")),
    ]);
    let outer = SequenceHandle::from_script(vec![
        ScriptStep::Emit(Value::Int(1)),
        ScriptStep::Delegate(middle),
        ScriptStep::Emit(Value::Int(4)),
        ScriptStep::Finish(Value::str("a")),
    ]);

    let (seen, ret) = collect(&outer);
    assert_eq!(
        seen,
        vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]
    );
    assert_eq!(ret, Value::str("a"));
}

#[test]
fn inner_return_value_feeds_delegation_expression() {
    let inner = SequenceHandle::from_values(vec![Value::Int(10)], Value::Int(100));
    let outer = SequenceHandle::from_script(vec![
        ScriptStep::Delegate(inner),
        ScriptStep::StoreSent("result".into()),
        ScriptStep::EmitLocal("result".into()),
        ScriptStep::Finish(Value::Undefined),
    ]);

    let (seen, _) = collect(&outer);
    assert_eq!(seen, vec![Value::Int(10), Value::Int(100)]);
}

#[test]
fn force_return_unwinds_inner_then_outer() {
    let inner = SequenceHandle::from_values(
        vec![Value::Int(10), Value::Int(20)],
        Value::Int(100),
    );
    let outer = SequenceHandle::from_script(vec![
        ScriptStep::Emit(Value::Int(0)),
        ScriptStep::Delegate(inner.clone()),
        ScriptStep::Emit(Value::Int(99)),
        ScriptStep::Finish(Value::Undefined),
    ]);

    outer.resume(Value::Undefined).unwrap(); // 0
    outer.resume(Value::Undefined).unwrap(); // 10, delegate installed

    let step = outer.force_return(Value::Int(-1)).unwrap();
    assert_eq!((step.value, step.done), (Value::Int(-1), true));
    assert!(inner.is_done());
    assert!(outer.is_done());
}
