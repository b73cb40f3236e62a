//! Resumable sequences
//!
//! A resumable sequence is a paused computation driven on demand. Its body
//! is an explicit state machine over [`FrameState`]: each call to `step`
//! receives the frame and the value (or exception) being resumed into the
//! suspension expression, advances to the next suspension point or exit, and
//! reports what happened as a [`StepEvent`]. Native call-stack capture is
//! never involved, so a sequence can be parked indefinitely and resumed from
//! any call stack.
//!
//! Sequences are single-threaded; handles are `Rc`-shared and re-entrant
//! calls are rejected with [`EngineError::ReentrancyFault`].

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::engine::errors::{EngineError, EngineResult};
use crate::engine::frame::FrameState;
use crate::engine::value::Value;

static NEXT_SEQUENCE_ID: AtomicU64 = AtomicU64::new(0);

/// Unique sequence identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SequenceId(pub u64);

impl SequenceId {
    fn next() -> Self {
        Self(NEXT_SEQUENCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the inner value.
    #[inline]
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SequenceId {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "Sequence({})", self.0)
    }
}

/// Sequence lifecycle status.
///
/// `Executing` is transient: external callers can only observe it from code
/// running inside the sequence's own step (there is exactly one thread).
/// `Completed` and `Terminated` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceStatus {
    /// Created, body never entered.
    SuspendedStart,
    /// Parked at a suspension point.
    SuspendedYield,
    /// Currently running a step.
    Executing,
    /// Exited normally.
    Completed,
    /// Exited with an uncaught exception or was torn down.
    Terminated,
}

impl SequenceStatus {
    /// True for the absorbing states.
    #[inline]
    pub fn is_done(&self) -> bool {
        matches!(self, SequenceStatus::Completed | SequenceStatus::Terminated)
    }
}

/// What is being delivered into the paused body.
#[derive(Debug, Clone)]
pub enum ResumeInput {
    /// The value of the suspension expression being resumed.
    Value(Value),
    /// An exception injected at the resume point.
    Raise(Value),
    /// A synthesized early return; cleanup regions run before exit.
    Return(Value),
}

/// What a body step produced.
pub enum StepEvent {
    /// Suspend, surfacing a value to the caller.
    Yield(Value),
    /// Forward all further driving to an inner sequence until it completes.
    Delegate(SequenceHandle),
    /// Normal exit with a final value.
    Return(Value),
    /// Exceptional exit; the value propagates to whoever drove the step.
    Raise(Value),
}

impl std::fmt::Debug for StepEvent {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            StepEvent::Yield(v) => f.debug_tuple("Yield").field(v).finish(),
            StepEvent::Delegate(h) => f.debug_tuple("Delegate").field(&h.id()).finish(),
            StepEvent::Return(v) => f.debug_tuple("Return").field(v).finish(),
            StepEvent::Raise(v) => f.debug_tuple("Raise").field(v).finish(),
        }
    }
}

/// A sequence body: an explicit state machine stepped by the engine.
pub trait SequenceBody {
    /// Run from the current resume point to the next suspension or exit.
    fn step(
        &mut self,
        frame: &mut FrameState,
        input: ResumeInput,
    ) -> StepEvent;
}

impl<F> SequenceBody for F
where
    F: FnMut(&mut FrameState, ResumeInput) -> StepEvent,
{
    fn step(
        &mut self,
        frame: &mut FrameState,
        input: ResumeInput,
    ) -> StepEvent {
        self(frame, input)
    }
}

/// Result of driving a sequence one step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// The surfaced (or final) value.
    pub value: Value,
    /// True only on normal or exceptional exit.
    pub done: bool,
}

impl StepResult {
    /// A suspension result.
    #[inline]
    pub fn suspended(value: Value) -> Self {
        Self { value, done: false }
    }

    /// A completion result.
    #[inline]
    pub fn finished(value: Value) -> Self {
        Self { value, done: true }
    }
}

struct ResumableSequence {
    id: SequenceId,
    status: SequenceStatus,
    frame: FrameState,
    delegate: Option<SequenceHandle>,
    body: Box<dyn SequenceBody>,
}

/// Shared handle to a resumable sequence.
///
/// All driving goes through the handle; the underlying state is exclusively
/// owned and a call that would re-enter a running step fails with
/// [`EngineError::ReentrancyFault`].
#[derive(Clone)]
pub struct SequenceHandle {
    id: SequenceId,
    inner: Rc<RefCell<ResumableSequence>>,
}

impl std::fmt::Debug for SequenceHandle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SequenceHandle")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}

impl SequenceHandle {
    /// Create a sequence from a body.
    pub fn new(body: impl SequenceBody + 'static) -> Self {
        let id = SequenceId::next();
        trace!(sequence = %id, "sequence created");
        Self {
            id,
            inner: Rc::new(RefCell::new(ResumableSequence {
                id,
                status: SequenceStatus::SuspendedStart,
                frame: FrameState::new(),
                delegate: None,
                body: Box::new(body),
            })),
        }
    }

    /// Create a sequence that yields `values` in order, then returns `ret`.
    pub fn from_values(
        values: Vec<Value>,
        ret: Value,
    ) -> Self {
        let mut steps: Vec<ScriptStep> = values.into_iter().map(ScriptStep::Emit).collect();
        steps.push(ScriptStep::Finish(ret));
        Self::from_script(steps)
    }

    /// Create a sequence driven by a [`ScriptBody`].
    pub fn from_script(steps: Vec<ScriptStep>) -> Self {
        Self::new(ScriptBody::new(steps))
    }

    /// Get the sequence ID.
    #[inline]
    pub fn id(&self) -> SequenceId {
        self.id
    }

    /// Current status. Reports `Executing` while a step of this sequence is
    /// on the call stack.
    pub fn status(&self) -> SequenceStatus {
        self.inner
            .try_borrow()
            .map(|seq| seq.status)
            .unwrap_or(SequenceStatus::Executing)
    }

    /// True once the sequence reached an absorbing state.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.status().is_done()
    }

    /// Resume the sequence, delivering `input` as the value of the
    /// suspension expression it is parked on.
    ///
    /// Finished sequences answer `{undefined, done: true}` idempotently.
    pub fn resume(
        &self,
        input: Value,
    ) -> EngineResult<StepResult> {
        self.drive(ResumeInput::Value(input))
    }

    /// Synthesize a normal exit with `value`. Cleanup regions scoped to the
    /// frame run first; a body may even suspend again from one of them, in
    /// which case the result has `done: false` and driving must continue.
    pub fn force_return(
        &self,
        value: Value,
    ) -> EngineResult<StepResult> {
        self.drive(ResumeInput::Return(value))
    }

    /// Inject `exception` at the current resume point. If no handler in the
    /// body absorbs it, the sequence terminates and the exception comes back
    /// as [`EngineError::UncaughtSuspendedException`].
    pub fn force_throw(
        &self,
        exception: Value,
    ) -> EngineResult<StepResult> {
        self.drive(ResumeInput::Raise(exception))
    }

    fn drive(
        &self,
        input: ResumeInput,
    ) -> EngineResult<StepResult> {
        let mut seq = self
            .inner
            .try_borrow_mut()
            .map_err(|_| EngineError::ReentrancyFault(self.id))?;

        match seq.status {
            SequenceStatus::Executing => return Err(EngineError::ReentrancyFault(self.id)),
            SequenceStatus::Completed | SequenceStatus::Terminated => {
                return finished_protocol(input);
            }
            SequenceStatus::SuspendedStart => {
                // The body never ran, so there are no cleanup regions yet.
                match input {
                    ResumeInput::Return(value) => {
                        seq.status = SequenceStatus::Completed;
                        seq.frame.clear_on_exit();
                        return Ok(StepResult::finished(value));
                    }
                    ResumeInput::Raise(exception) => {
                        seq.status = SequenceStatus::Terminated;
                        seq.frame.clear_on_exit();
                        return Err(EngineError::UncaughtSuspendedException(exception));
                    }
                    ResumeInput::Value(_) => {}
                }
            }
            SequenceStatus::SuspendedYield => {}
        }

        seq.status = SequenceStatus::Executing;

        // Forward through an installed delegate first.
        let mut input = input;
        if let Some(delegate) = seq.delegate.clone() {
            match Self::forward_to_delegate(&delegate, input) {
                Forwarded::Suspended(result) => {
                    seq.status = SequenceStatus::SuspendedYield;
                    return Ok(result);
                }
                Forwarded::Fault(err) => {
                    seq.status = SequenceStatus::SuspendedYield;
                    return Err(err);
                }
                Forwarded::Finished(next) => {
                    seq.delegate = None;
                    input = next;
                }
            }
        }

        self.run_body(&mut seq, input)
    }

    /// Forward one driving call verbatim to the delegate.
    fn forward_to_delegate(
        delegate: &SequenceHandle,
        input: ResumeInput,
    ) -> Forwarded {
        let unwinding = matches!(input, ResumeInput::Return(_));
        let outcome = match input {
            ResumeInput::Value(v) => delegate.resume(v),
            ResumeInput::Raise(e) => delegate.force_throw(e),
            ResumeInput::Return(v) => delegate.force_return(v),
        };
        match outcome {
            Ok(result) if !result.done => Forwarded::Suspended(result),
            Ok(result) => {
                // The inner sequence is exhausted. Its final value becomes
                // the value of the delegation expression; a forwarded
                // force-return keeps unwinding the outer body as well.
                let next = if unwinding {
                    ResumeInput::Return(result.value)
                } else {
                    ResumeInput::Value(result.value)
                };
                Forwarded::Finished(next)
            }
            Err(EngineError::UncaughtSuspendedException(exception)) => {
                Forwarded::Finished(ResumeInput::Raise(exception))
            }
            Err(err) => Forwarded::Fault(err),
        }
    }

    fn run_body(
        &self,
        seq: &mut ResumableSequence,
        mut input: ResumeInput,
    ) -> EngineResult<StepResult> {
        loop {
            let event = {
                let ResumableSequence { body, frame, .. } = seq;
                body.step(frame, input)
            };
            trace!(sequence = %seq.id, event = ?event, "body step");
            match event {
                StepEvent::Yield(value) => {
                    seq.status = SequenceStatus::SuspendedYield;
                    return Ok(StepResult::suspended(value));
                }
                StepEvent::Return(value) => {
                    seq.status = SequenceStatus::Completed;
                    seq.frame.clear_on_exit();
                    return Ok(StepResult::finished(value));
                }
                StepEvent::Raise(exception) => {
                    seq.status = SequenceStatus::Terminated;
                    seq.frame.clear_on_exit();
                    return Err(EngineError::UncaughtSuspendedException(exception));
                }
                StepEvent::Delegate(inner) => {
                    // The delegate always suspends first: start it
                    // immediately, before the outer body gets another step.
                    match inner.resume(Value::Undefined) {
                        Ok(result) if !result.done => {
                            seq.delegate = Some(inner);
                            seq.status = SequenceStatus::SuspendedYield;
                            return Ok(result);
                        }
                        Ok(result) => {
                            input = ResumeInput::Value(result.value);
                        }
                        Err(EngineError::UncaughtSuspendedException(exception)) => {
                            input = ResumeInput::Raise(exception);
                        }
                        Err(err) => {
                            seq.status = SequenceStatus::SuspendedYield;
                            return Err(err);
                        }
                    }
                }
            }
        }
    }
}

/// Protocol for driving calls that arrive after an absorbing state.
fn finished_protocol(input: ResumeInput) -> EngineResult<StepResult> {
    match input {
        ResumeInput::Value(_) => Ok(StepResult::finished(Value::Undefined)),
        ResumeInput::Return(value) => Ok(StepResult::finished(value)),
        ResumeInput::Raise(exception) => Err(EngineError::UncaughtSuspendedException(exception)),
    }
}

enum Forwarded {
    Suspended(StepResult),
    Finished(ResumeInput),
    Fault(EngineError),
}

/// One step of a [`ScriptBody`].
#[derive(Clone)]
pub enum ScriptStep {
    /// Suspend, surfacing a constant.
    Emit(Value),
    /// Suspend, echoing back the value that was resumed in.
    EmitSent,
    /// Store the resumed value into a frame local and fall through.
    StoreSent(String),
    /// Suspend, surfacing a frame local.
    EmitLocal(String),
    /// Delegate to an inner sequence until it completes; its final value is
    /// the resumed value of the following step.
    Delegate(SequenceHandle),
    /// Exit normally with a constant.
    Finish(Value),
    /// Exit normally with a frame local.
    FinishLocal(String),
    /// Raise an exception.
    Fail(Value),
}

impl std::fmt::Debug for ScriptStep {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            ScriptStep::Emit(v) => f.debug_tuple("Emit").field(v).finish(),
            ScriptStep::EmitSent => write!(f, "EmitSent"),
            ScriptStep::StoreSent(name) => f.debug_tuple("StoreSent").field(name).finish(),
            ScriptStep::EmitLocal(name) => f.debug_tuple("EmitLocal").field(name).finish(),
            ScriptStep::Delegate(h) => f.debug_tuple("Delegate").field(&h.id()).finish(),
            ScriptStep::Finish(v) => f.debug_tuple("Finish").field(v).finish(),
            ScriptStep::FinishLocal(name) => f.debug_tuple("FinishLocal").field(name).finish(),
            ScriptStep::Fail(v) => f.debug_tuple("Fail").field(v).finish(),
        }
    }
}

/// A small interpreted body: a linear step list using the frame's resume
/// point as its program counter. Enough to express the fixed producers the
/// tests and the demo pump need; anything fancier supplies its own
/// [`SequenceBody`].
pub struct ScriptBody {
    steps: Vec<ScriptStep>,
}

impl ScriptBody {
    /// Build a script body.
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self { steps }
    }
}

impl SequenceBody for ScriptBody {
    fn step(
        &mut self,
        frame: &mut FrameState,
        input: ResumeInput,
    ) -> StepEvent {
        // Scripts have no cleanup regions: injected exceptions and
        // synthesized returns take effect at the resume point directly.
        let mut sent = match input {
            ResumeInput::Value(value) => value,
            ResumeInput::Raise(exception) => return StepEvent::Raise(exception),
            ResumeInput::Return(value) => return StepEvent::Return(value),
        };

        loop {
            let pc = frame.resume_point().inner() as usize;
            if pc >= self.steps.len() {
                return StepEvent::Return(Value::Undefined);
            }
            match &self.steps[pc] {
                ScriptStep::Emit(value) => {
                    frame.set_resume_point(pc as u32 + 1);
                    return StepEvent::Yield(value.clone());
                }
                ScriptStep::EmitSent => {
                    frame.set_resume_point(pc as u32 + 1);
                    return StepEvent::Yield(sent.clone());
                }
                ScriptStep::StoreSent(name) => {
                    frame.set_local(name, std::mem::take(&mut sent));
                    frame.set_resume_point(pc as u32 + 1);
                }
                ScriptStep::EmitLocal(name) => {
                    frame.set_resume_point(pc as u32 + 1);
                    return StepEvent::Yield(frame.local_or_undefined(name));
                }
                ScriptStep::Delegate(inner) => {
                    frame.set_resume_point(pc as u32 + 1);
                    return StepEvent::Delegate(inner.clone());
                }
                ScriptStep::Finish(value) => return StepEvent::Return(value.clone()),
                ScriptStep::FinishLocal(name) => {
                    return StepEvent::Return(frame.local_or_undefined(name));
                }
                ScriptStep::Fail(exception) => return StepEvent::Raise(exception.clone()),
            }
        }
    }
}
