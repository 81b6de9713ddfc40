//! Twostage - two-phase task scheduling with coalescing request pools
//!
//! This library schedules units of work that split into a networking phase
//! and a processing phase. Requests are keyed by [`Identifier`]: newer
//! submissions for a key jump the queue, and concurrent submissions for the
//! same key coalesce onto a single execution whose outcome fans out to
//! every waiter.
//!
//! # High-Level API
//!
//! Most callers implement [`TwoPhaseTask`], wrap it in a [`Task`] and hand
//! it to a shared [`RequestExecutor`]:
//!
//! ```ignore
//! use twostage::{RequestExecutor, Task};
//!
//! let executor = Arc::new(RequestExecutor::new());
//!
//! let task = Task::new(FetchForecast::for_station("KSEA"));
//! task.set_request_executor(executor);
//! task.set_task_observer(Arc::new(CacheOnComplete::default()));
//! task.execute();
//! ```
//!
//! The layers underneath are usable on their own: [`executor`] holds the
//! priority queues and worker pools, [`service`] the coalescing request
//! executor, and [`task`] the dependency graph.

pub mod executor;
pub mod identifier;
pub mod log;
pub mod service;
pub mod task;

pub use executor::{AuxiliaryExecutor, ExecutorStats, PoolConfig, Priority};
pub use identifier::Identifier;
pub use log::{LogLevel, Logger, NoOpLogger, TracingLogger};
pub use service::{
    CoalescingStats, RequestExecutor, RequestExecutorConfig, RequestHandler,
    SerialRequestExecutor, ServiceError,
};
pub use task::{
    ExecutionContext, Task, TaskContext, TaskHandle, TaskObserver, TaskState, TwoPhaseTask,
    NO_REQUEST_EXECUTOR,
};

/// Version of the twostage library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
