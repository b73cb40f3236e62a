//! Run queue for the scheduler
//!
//! A FIFO of ready work. The shared [`QueueHandle`] is the only enqueue path
//! handed out to continuations and event sources; the scheduler itself is
//! the only consumer.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use super::event::ExternalEvent;

/// A unit of ready work.
pub enum QueueEntry {
    /// A continuation of a settled deferred (or an immediate resumption
    /// scheduled by the async driver). Not counted by bounded runs.
    ContinuationFire(Box<dyn FnOnce()>),
    /// Work originating outside the engine. Counted by bounded runs.
    External(ExternalEvent),
}

impl std::fmt::Debug for QueueEntry {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            QueueEntry::ContinuationFire(_) => write!(f, "ContinuationFire"),
            QueueEntry::External(event) => f.debug_tuple("External").field(event).finish(),
        }
    }
}

#[derive(Debug, Default)]
struct RunQueue {
    entries: VecDeque<QueueEntry>,
}

/// Shared handle to the run queue.
#[derive(Clone, Default)]
pub struct QueueHandle {
    inner: Rc<RefCell<RunQueue>>,
}

impl std::fmt::Debug for QueueHandle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("QueueHandle")
            .field("len", &self.len())
            .finish()
    }
}

impl QueueHandle {
    /// Create a fresh, empty queue.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a continuation fire.
    #[inline]
    pub fn push_continuation(
        &self,
        fire: impl FnOnce() + 'static,
    ) {
        self.inner
            .borrow_mut()
            .entries
            .push_back(QueueEntry::ContinuationFire(Box::new(fire)));
    }

    /// Enqueue an external event directly, bypassing source polling.
    #[inline]
    pub fn push_external(
        &self,
        event: ExternalEvent,
    ) {
        self.inner
            .borrow_mut()
            .entries
            .push_back(QueueEntry::External(event));
    }

    /// Pop the frontmost entry, whatever its kind.
    #[inline]
    pub fn pop(&self) -> Option<QueueEntry> {
        self.inner.borrow_mut().entries.pop_front()
    }

    /// Pop the frontmost entry only if it is a continuation fire.
    pub fn pop_continuation(&self) -> Option<Box<dyn FnOnce()>> {
        let mut queue = self.inner.borrow_mut();
        match queue.entries.front() {
            Some(QueueEntry::ContinuationFire(_)) => match queue.entries.pop_front() {
                Some(QueueEntry::ContinuationFire(fire)) => Some(fire),
                _ => unreachable!("front entry changed under exclusive borrow"),
            },
            _ => None,
        }
    }

    /// Pop the frontmost entry only if it is an external event.
    pub fn pop_external(&self) -> Option<ExternalEvent> {
        let mut queue = self.inner.borrow_mut();
        match queue.entries.front() {
            Some(QueueEntry::External(_)) => match queue.entries.pop_front() {
                Some(QueueEntry::External(event)) => Some(event),
                _ => unreachable!("front entry changed under exclusive borrow"),
            },
            _ => None,
        }
    }

    /// Number of queued entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    /// Check if the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().entries.is_empty()
    }
}
