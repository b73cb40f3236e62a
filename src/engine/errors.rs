//! Engine errors

use thiserror::Error;

use crate::engine::deferred::DeferredId;
use crate::engine::sequence::SequenceId;
use crate::engine::value::Value;

/// Engine result
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine errors
///
/// The first three variants are misuse faults: they abort the offending call
/// with a descriptive error and leave all other state untouched.
/// `UncaughtSuspendedException` carries a value raised inside a sequence body
/// that no handler absorbed; it is recoverable by whoever drives the
/// sequence (a delegating outer sequence, an async driver, or the caller).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0} resumed while it is already executing")]
    ReentrancyFault(SequenceId),

    #[error("scheduler run() called while the scheduler is already draining")]
    SchedulerReentrancyFault,

    #[error("{0} settled twice; the second outcome is discarded")]
    AlreadySettledFault(DeferredId),

    #[error("uncaught exception in suspended sequence: {0}")]
    UncaughtSuspendedException(Value),

    #[error("{0} was cancelled")]
    CancelledFault(DeferredId),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl EngineError {
    /// True for API-misuse faults that must not be silently swallowed.
    #[inline]
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            EngineError::ReentrancyFault(_)
                | EngineError::SchedulerReentrancyFault
                | EngineError::AlreadySettledFault(_)
        )
    }
}
