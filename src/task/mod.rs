//! Two-phase task graph layered on the request executor.
//!
//! A task pairs a networking phase with a processing phase and carries the
//! dependency wiring between them and other tasks. The type implementing
//! [`TwoPhaseTask`] supplies the phase bodies; [`Task`] owns the lifecycle,
//! prerequisite counting and observer notifications.
//!
//! ```ignore
//! let executor = Arc::new(RequestExecutor::new());
//! let task = Task::new(FetchForecast::for_station("KSEA"));
//! task.set_request_executor(executor);
//! task.set_task_observer(Arc::new(LogOnSettle));
//! task.execute();
//! ```

mod context;
mod observer;
mod state;
#[allow(clippy::module_inception)]
mod task;

pub use context::{ExecutionContext, TaskContext};
pub use observer::TaskObserver;
pub use state::TaskState;
pub use task::{Task, TaskHandle, TwoPhaseTask, NO_REQUEST_EXECUTOR};
