//! Schedulable request wrapper.
//!
//! A [`Prioritizable`] is anything the pool can run: it names itself with an
//! [`Identifier`] and executes one phase body, capturing the outcome
//! internally. [`PrioritizableRequest`] wraps it with the scheduling
//! bookkeeping the queue needs (tier index, cancelled flag) and owns the
//! panic boundary: a body that panics is recorded as a failure on the
//! request instead of unwinding through the worker loop.

use crate::executor::Priority;
use crate::identifier::Identifier;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;

/// A unit of work the scheduler can run.
pub trait Prioritizable: Send + 'static {
    /// Key used for queue deduplication and in-flight suppression.
    fn identifier(&self) -> &Identifier;

    /// Runs the phase body, capturing its outcome internally.
    fn execute(&mut self) -> BoxFuture<'_, ()>;

    /// Records a failure raised at the execution boundary rather than by
    /// the body itself (a panic). Implementations fold the message into
    /// their captured error form.
    fn record_failure(&mut self, message: String);
}

/// How a request's execution ended at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The body ran to completion (its own outcome, success or failure, is
    /// captured inside the prioritizable).
    Completed,
    /// The body panicked; the message was recorded on the prioritizable.
    Panicked(String),
}

/// A prioritizable plus its scheduling bookkeeping.
pub struct PrioritizableRequest<P> {
    prioritizable: P,
    accessor_index: usize,
    cancelled: bool,
}

impl<P: Prioritizable> PrioritizableRequest<P> {
    /// Wraps `prioritizable` for scheduling at `priority`.
    pub fn new(prioritizable: P, priority: Priority) -> Self {
        Self::with_accessor_index(prioritizable, priority.accessor_index())
    }

    /// Wraps `prioritizable` for scheduling at a raw tier index.
    pub fn with_accessor_index(prioritizable: P, accessor_index: usize) -> Self {
        Self {
            prioritizable,
            accessor_index,
            cancelled: false,
        }
    }

    /// The identifier this request is keyed on.
    pub fn identifier(&self) -> &Identifier {
        self.prioritizable.identifier()
    }

    /// Tier index this request is queued at; 0 is served first.
    pub fn accessor_index(&self) -> usize {
        self.accessor_index
    }

    /// True once the request has been marked cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Marks the request cancelled. A cancelled request still sitting in a
    /// queue is discarded at dequeue time instead of running.
    pub fn set_cancelled(&mut self) {
        self.cancelled = true;
    }

    /// Borrows the wrapped prioritizable.
    pub fn prioritizable(&self) -> &P {
        &self.prioritizable
    }

    /// Consumes the wrapper, returning the prioritizable.
    pub fn into_inner(self) -> P {
        self.prioritizable
    }

    /// Runs the body, converting a panic into a recorded failure.
    pub async fn run(&mut self) -> RunOutcome {
        let outcome = AssertUnwindSafe(self.prioritizable.execute())
            .catch_unwind()
            .await;
        match outcome {
            Ok(()) => RunOutcome::Completed,
            Err(payload) => {
                let message = panic_text(payload.as_ref());
                self.prioritizable.record_failure(message.clone());
                RunOutcome::Panicked(message)
            }
        }
    }
}

impl<P: Prioritizable> fmt::Debug for PrioritizableRequest<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrioritizableRequest")
            .field("identifier", self.identifier())
            .field("accessor_index", &self.accessor_index)
            .field("cancelled", &self.cancelled)
            .finish()
    }
}

fn panic_text(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        String::from("panic with non-string payload")
    }
}
