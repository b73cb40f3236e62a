//! Weft
//!
//! A suspendable execution engine: resumable sequence producers, deferred
//! values, an async driver coupling the two, and a bounded cooperative
//! scheduler. Execution never relies on native call-stack capture: a paused
//! computation is an explicit frame that can be parked indefinitely and
//! resumed from any call stack.
//!
//! # Example
//!
//! ```
//! use weft::{Scheduler, SequenceHandle, Value};
//!
//! let producer = SequenceHandle::from_values(
//!     vec![Value::Int(1), Value::Int(2)],
//!     Value::Int(3),
//! );
//! assert_eq!(producer.resume(Value::Undefined).unwrap().value, Value::Int(1));
//! assert_eq!(producer.resume(Value::Undefined).unwrap().value, Value::Int(2));
//! assert!(producer.resume(Value::Undefined).unwrap().done);
//!
//! let scheduler = Scheduler::new();
//! assert_eq!(scheduler.run(0).unwrap(), 0);
//! ```

#![doc(html_root_url = "https://docs.rs/weft")]
#![warn(rust_2018_idioms)]

// Public modules
pub mod engine;

// Re-exports
pub use anyhow::{Context, Result};
pub use thiserror::Error;

pub use engine::{
    all_of, all_settled, any_of, cancel_after, decode_step, encode_step, race, AsyncDriver,
    AsyncSequence, DeferredHandle, DeferredId,
    DeferredSnapshot, EngineError, EngineResult, EventSource, ExternalEvent, FrameState, Outcome,
    QueueHandle, QueuedSource, ResumeInput, ResumePointId, Scheduler, SchedulerConfig,
    SchedulerPhase, ScriptBody, ScriptStep, SequenceBody, SequenceHandle, SequenceId,
    SequenceStatus, StepEvent, StepResult, TimerSource, Value,
};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name
pub const NAME: &str = "Weft";
