//! Frame state of a paused computation
//!
//! A `FrameState` is pure data: the resume-point tag, the locals live across
//! that point, an evaluation-stack snapshot, and an optional parked
//! exception. It is owned by exactly one sequence and mutated only from
//! inside that sequence's resume operation; bodies receive `&mut FrameState`
//! for the duration of a single step.

use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::engine::value::Value;

/// Resume-point tag. Point 0 is the start of the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ResumePointId(pub u32);

impl ResumePointId {
    /// The entry point of a body that has never run.
    pub const START: ResumePointId = ResumePointId(0);

    /// Get the inner value.
    #[inline]
    pub fn inner(&self) -> u32 {
        self.0
    }
}

impl From<u32> for ResumePointId {
    fn from(val: u32) -> Self {
        Self(val)
    }
}

impl std::fmt::Display for ResumePointId {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "ResumePoint({})", self.0)
    }
}

/// Saved state of a paused computation.
#[derive(Debug, Clone, Default)]
pub struct FrameState {
    /// Where the next step continues.
    resume_point: ResumePointId,
    /// Bindings live across the resume point, in declaration order.
    locals: IndexMap<Arc<str>, Value>,
    /// Operand snapshot at the suspension point.
    eval_stack: SmallVec<[Value; 8]>,
    /// Exception parked while cleanup regions run.
    pending_exception: Option<Value>,
}

impl FrameState {
    /// Create a fresh frame positioned at the body entry.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current resume point.
    #[inline]
    pub fn resume_point(&self) -> ResumePointId {
        self.resume_point
    }

    /// Set the resume point for the next step.
    #[inline]
    pub fn set_resume_point(
        &mut self,
        point: impl Into<ResumePointId>,
    ) {
        self.resume_point = point.into();
    }

    /// Read a local binding.
    #[inline]
    pub fn local(
        &self,
        name: &str,
    ) -> Option<&Value> {
        self.locals.get(name)
    }

    /// Read a local binding, defaulting to `Undefined`.
    #[inline]
    pub fn local_or_undefined(
        &self,
        name: &str,
    ) -> Value {
        self.locals.get(name).cloned().unwrap_or_default()
    }

    /// Write a local binding, preserving first-insertion order.
    #[inline]
    pub fn set_local(
        &mut self,
        name: impl AsRef<str>,
        value: Value,
    ) {
        self.locals.insert(Arc::from(name.as_ref()), value);
    }

    /// Remove a local binding, returning its value.
    #[inline]
    pub fn take_local(
        &mut self,
        name: &str,
    ) -> Option<Value> {
        self.locals.shift_remove(name)
    }

    /// Number of live locals.
    #[inline]
    pub fn local_count(&self) -> usize {
        self.locals.len()
    }

    /// Iterate locals in declaration order.
    pub fn locals(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.locals.iter().map(|(k, v)| (k.as_ref(), v))
    }

    /// Push onto the evaluation stack.
    #[inline]
    pub fn push(
        &mut self,
        value: Value,
    ) {
        self.eval_stack.push(value);
    }

    /// Pop from the evaluation stack.
    #[inline]
    pub fn pop(&mut self) -> Option<Value> {
        self.eval_stack.pop()
    }

    /// Peek at the top of the evaluation stack.
    #[inline]
    pub fn peek(&self) -> Option<&Value> {
        self.eval_stack.last()
    }

    /// Evaluation stack depth.
    #[inline]
    pub fn stack_depth(&self) -> usize {
        self.eval_stack.len()
    }

    /// Park an exception while cleanup regions run.
    #[inline]
    pub fn set_pending_exception(
        &mut self,
        exception: Value,
    ) {
        self.pending_exception = Some(exception);
    }

    /// Take the parked exception, if any.
    #[inline]
    pub fn take_pending_exception(&mut self) -> Option<Value> {
        self.pending_exception.take()
    }

    /// Whether an exception is parked.
    #[inline]
    pub fn has_pending_exception(&self) -> bool {
        self.pending_exception.is_some()
    }

    /// Drop everything the frame holds. Called when the owning sequence
    /// reaches an absorbing state; the frame is never restored afterwards.
    pub fn clear_on_exit(&mut self) {
        self.locals.clear();
        self.eval_stack.clear();
        self.pending_exception = None;
    }
}
