//! Suspendable execution engine
//!
//! The engine has five pieces, leaves first: [`frame`] (the saved state of a
//! paused computation), [`sequence`] (resumable sequences driven on demand,
//! including delegation), [`deferred`] (single-assignment eventual
//! outcomes), [`driver`] (await semantics coupling sequences to deferreds),
//! and [`scheduler`] (the bounded cooperative run loop that owns "what runs
//! next").

pub mod combinators;
pub mod deferred;
pub mod driver;
pub mod errors;
pub mod frame;
pub mod scheduler;
pub mod sequence;
pub mod value;

#[cfg(test)]
mod tests;

pub use combinators::{all_of, all_settled, any_of, cancel_after, race};
pub use deferred::{DeferredHandle, DeferredId, DeferredSnapshot, Outcome};
pub use driver::{decode_step, encode_step, AsyncDriver, AsyncSequence};
pub use errors::{EngineError, EngineResult};
pub use frame::{FrameState, ResumePointId};
pub use scheduler::{
    EventSource, ExternalEvent, QueueHandle, QueuedSource, Scheduler, SchedulerConfig,
    SchedulerPhase, TimerSource,
};
pub use sequence::{
    ResumeInput, ScriptBody, ScriptStep, SequenceBody, SequenceHandle, SequenceId,
    SequenceStatus, StepEvent, StepResult,
};
pub use value::Value;
