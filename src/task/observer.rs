//! Task lifecycle notifications.

use crate::service::ServiceError;
use crate::task::task::TaskHandle;

/// Receives task lifecycle events.
///
/// Exactly one terminal callback fires per task, except for cancellation:
/// cancelling a task that is mid-phase notifies on every `cancel` call
/// until the in-flight phase returns and the task settles.
///
/// Callbacks run on whatever thread drives the underlying request, so
/// implementations must be quick and must not block on task completion.
pub trait TaskObserver: Send + Sync {
    /// The task has resolved its prerequisites and entered its
    /// networking phase.
    fn on_task_started(&self, task: &TaskHandle) {
        let _ = task;
    }

    /// Both phases finished successfully.
    fn on_task_complete(&self, task: &TaskHandle) {
        let _ = task;
    }

    /// A phase returned an error, or a prerequisite failed before the
    /// task could start.
    fn on_task_failure(&self, task: &TaskHandle, error: &ServiceError) {
        let _ = (task, error);
    }

    /// The task was cancelled before it could complete.
    fn on_task_cancelled(&self, task: &TaskHandle) {
        let _ = task;
    }
}
