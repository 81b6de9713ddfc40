//! Per-task execution context.
//!
//! Every task owns a [`TaskContext`]; phase bodies receive a reference to
//! it. The context carries the ambient [`ExecutionContext`] the submitter
//! installed, the task's cancellation token, and the list of dependents a
//! phase registers dynamically while it runs.

use crate::task::task::{Task, TaskNode};
use crate::task::TwoPhaseTask;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Opaque ambient value shared down a task graph.
///
/// Holds whatever the submitter needs its phases to see (a connection
/// handle, a cache, a tenant id). Dynamically spawned dependents inherit
/// their parent's execution context unless one was set explicitly.
#[derive(Clone, Default)]
pub struct ExecutionContext {
    value: Option<Arc<dyn Any + Send + Sync>>,
}

impl ExecutionContext {
    /// A context carrying nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wraps a value for sharing with phase bodies.
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            value: Some(Arc::new(value)),
        }
    }

    /// Returns the carried value if it has type `T`.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.value.as_ref()?.clone().downcast::<T>().ok()
    }

    /// True when no value is carried.
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("is_empty", &self.is_empty())
            .finish()
    }
}

/// Context handed to a task's phase bodies.
///
/// # Cancellation
///
/// The token is cancelled when the task is cancelled. Checking it inside a
/// phase body is optional; a body that exits early because of it fails
/// every waiter coalesced onto the same identifier, so long-running bodies
/// should only do so when the identifier is known not to be shared.
pub struct TaskContext {
    execution: Mutex<ExecutionContext>,
    cancellation: CancellationToken,
    spawned: Mutex<Vec<Arc<dyn TaskNode>>>,
}

impl TaskContext {
    pub(crate) fn new() -> Self {
        Self {
            execution: Mutex::new(ExecutionContext::empty()),
            cancellation: CancellationToken::new(),
            spawned: Mutex::new(Vec::new()),
        }
    }

    /// The ambient execution context installed by the submitter.
    pub fn execution(&self) -> ExecutionContext {
        self.execution.lock().clone()
    }

    pub(crate) fn set_execution(&self, context: ExecutionContext) {
        *self.execution.lock() = context;
    }

    /// True once the owning task has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// The task's cancellation token, for racing phase work against
    /// cancellation with `tokio::select!`.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub(crate) fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Registers a task discovered while a phase was running.
    ///
    /// The task becomes a dependent of the one this context belongs to: it
    /// inherits the parent's request executor, observer and execution
    /// context where it has none of its own, and starts once the parent
    /// completes. If the parent fails or is cancelled, the spawned task is
    /// failed or cancelled with it.
    pub fn spawn_dependent<U: TwoPhaseTask>(&self, task: &Task<U>) {
        self.spawned.lock().push(task.node());
    }

    /// Number of dependents registered and not yet collected.
    pub fn spawned_count(&self) -> usize {
        self.spawned.lock().len()
    }

    pub(crate) fn take_spawned(&self) -> Vec<Arc<dyn TaskNode>> {
        std::mem::take(&mut *self.spawned.lock())
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("is_cancelled", &self.is_cancelled())
            .field("spawned", &self.spawned_count())
            .finish_non_exhaustive()
    }
}
