//! End-to-end resumable sequence scenarios

use proptest::prelude::*;

use weft::{EngineError, ScriptStep, SequenceHandle, SequenceStatus, Value};

#[test]
fn transcript_yield_one_two_return_three() {
    let seq = SequenceHandle::from_values(
        vec![Value::Int(1), Value::Int(2)],
        Value::Int(3),
    );

    let transcript: Vec<(Value, bool)> = (0..4)
        .map(|_| {
            let step = seq.resume(Value::Int(0)).unwrap();
            (step.value, step.done)
        })
        .collect();

    assert_eq!(
        transcript,
        vec![
            (Value::Int(1), false),
            (Value::Int(2), false),
            (Value::Int(3), true),
            (Value::Undefined, true),
        ]
    );
}

#[test]
fn terminated_sequence_is_absorbing() {
    let seq = SequenceHandle::from_script(vec![
        ScriptStep::Emit(Value::Int(1)),
        ScriptStep::Fail(Value::str("die")),
    ]);
    seq.resume(Value::Undefined).unwrap();
    assert!(matches!(
        seq.resume(Value::Undefined),
        Err(EngineError::UncaughtSuspendedException(_))
    ));
    assert_eq!(seq.status(), SequenceStatus::Terminated);
    for _ in 0..3 {
        let step = seq.resume(Value::Undefined).unwrap();
        assert_eq!((step.value, step.done), (Value::Undefined, true));
    }
}

proptest! {
    /// A sequence with k suspension points needs exactly k+1 resumes to
    /// complete, and stays completed afterwards.
    #[test]
    fn resume_count_matches_suspension_points(k in 0usize..32) {
        let values: Vec<Value> = (0..k as i64).map(Value::Int).collect();
        let seq = SequenceHandle::from_values(values, Value::str("end"));

        for i in 0..k {
            let step = seq.resume(Value::Undefined).unwrap();
            prop_assert_eq!(step.value, Value::Int(i as i64));
            prop_assert!(!step.done);
        }

        let last = seq.resume(Value::Undefined).unwrap();
        prop_assert_eq!(last.value, Value::str("end"));
        prop_assert!(last.done);

        let after = seq.resume(Value::Undefined).unwrap();
        prop_assert_eq!(after.value, Value::Undefined);
        prop_assert!(after.done);
    }
}
