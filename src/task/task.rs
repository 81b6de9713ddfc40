//! Two-phase tasks and their dependency graph.
//!
//! A [`Task`] wraps a [`TwoPhaseTask`] implementation and walks it through
//! the lifecycle in [`TaskState`](crate::task::TaskState): networking first,
//! then processing, with observer callbacks at the edges. Tasks link into a
//! graph through prerequisites; a task starts once every prerequisite has
//! completed, fails if any of them fails, and is cancelled along with them.
//!
//! Phase work is submitted through a [`RequestHandler`], so the same task
//! runs unchanged against the pooled
//! [`RequestExecutor`](crate::service::RequestExecutor) or the inline
//! [`SerialRequestExecutor`](crate::service::SerialRequestExecutor).

use crate::executor::{PrioritizableRequest, Priority};
use crate::identifier::Identifier;
use crate::service::{
    NetworkingObserver, NetworkingPrioritizable, PhaseData, ProcessingObserver,
    ProcessingPrioritizable, RequestHandler, ServiceError,
};
use crate::task::context::{ExecutionContext, TaskContext};
use crate::task::observer::TaskObserver;
use crate::task::state::TaskState;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

/// Panic message raised when a task is executed without a request executor.
pub const NO_REQUEST_EXECUTOR: &str = "Cannot execute request. No request executor found.";

/// Unit of work with a networking phase and a processing phase.
///
/// The networking phase produces `Data`; the processing phase consumes it.
/// Both receive the task's [`TaskContext`] and run on the workers of the
/// request executor the task was submitted through, so neither should block
/// a thread.
pub trait TwoPhaseTask: Send + Sync + 'static {
    /// Payload handed from the networking phase to the processing phase.
    type Data: Send + Sync + 'static;

    /// Key used for queue bumping and request coalescing.
    ///
    /// Tasks sharing an identifier are treated as interchangeable: one
    /// in-flight request serves all of them. Returning `None` makes the
    /// request executor allocate a private identifier, opting the task out
    /// of coalescing. Read once, when the task is wrapped in [`Task::new`].
    fn identifier(&self) -> Option<Identifier> {
        None
    }

    /// Queue priority for both phases.
    fn priority(&self) -> Priority {
        Priority::Normal
    }

    /// First phase: fetch or produce the payload.
    fn execute_networking<'a>(
        &'a self,
        context: &'a TaskContext,
    ) -> BoxFuture<'a, Result<Self::Data, ServiceError>>;

    /// Second phase: consume the payload produced by the first.
    fn execute_processing<'a>(
        &'a self,
        context: &'a TaskContext,
        data: Arc<Self::Data>,
    ) -> BoxFuture<'a, Result<(), ServiceError>>;
}

/// Outcome a prerequisite reports to its dependents when it settles.
pub(crate) enum PrerequisiteOutcome {
    Completed,
    Failed(ServiceError),
}

/// Type-erased edge of the task graph.
///
/// Parents hold their dependents as trait objects so tasks with different
/// `Data` types can depend on each other.
pub(crate) trait TaskNode: Send + Sync {
    /// Adds one outstanding prerequisite.
    fn increment_pending(&self);

    /// Makes a dynamically spawned task a dependent: fills in a missing
    /// request executor, observer and execution context from the parent,
    /// arms it, and adds one outstanding prerequisite.
    fn adopt(
        &self,
        handler: Option<Arc<dyn RequestHandler>>,
        observer: Option<Arc<dyn TaskObserver>>,
        execution: ExecutionContext,
    );

    /// A prerequisite settled.
    fn prerequisite_finished(&self, outcome: PrerequisiteOutcome);

    /// Cancels this node and everything below it.
    fn cancel_node(&self);
}

/// Mutable task bookkeeping, guarded by the cell's lock.
#[derive(Default)]
struct TaskCore {
    state: TaskState,
    pending_prerequisites: usize,
    identifier: Option<Identifier>,
    error: Option<ServiceError>,
    dependents: Vec<Arc<dyn TaskNode>>,
    observer: Option<Arc<dyn TaskObserver>>,
    handler: Option<Arc<dyn RequestHandler>>,
    cancel_delivered: bool,
}

/// State shared between a task and its handles, independent of `Data`.
pub(crate) struct TaskCell {
    core: Mutex<TaskCore>,
    context: Arc<TaskContext>,
}

/// Read-only view of a task, handed to observers.
///
/// Handles compare equal when they view the same task.
#[derive(Clone)]
pub struct TaskHandle {
    cell: Arc<TaskCell>,
}

impl TaskHandle {
    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        self.cell.core.lock().state
    }

    /// The identifier the task runs under. `None` until start for tasks
    /// that receive an automatic identifier.
    pub fn identifier(&self) -> Option<Identifier> {
        self.cell.core.lock().identifier.clone()
    }

    /// The error a failed task settled with.
    pub fn error(&self) -> Option<ServiceError> {
        self.cell.core.lock().error.clone()
    }

    /// True once the task has been cancelled, even while a phase is still
    /// in flight.
    pub fn is_cancelled(&self) -> bool {
        self.cell.context.is_cancelled()
    }
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl Eq for TaskHandle {}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.cell.core.lock();
        f.debug_struct("TaskHandle")
            .field("state", &core.state)
            .field("identifier", &core.identifier)
            .finish()
    }
}

struct TaskInner<T: TwoPhaseTask> {
    task: T,
    cell: Arc<TaskCell>,
    self_ref: Weak<TaskInner<T>>,
}

/// Handle to a two-phase task in the dependency graph.
///
/// Cloning yields another handle to the same task. Dropping every handle
/// does not cancel the task; in-flight phases keep it alive until they
/// settle.
pub struct Task<T: TwoPhaseTask> {
    inner: Arc<TaskInner<T>>,
}

impl<T: TwoPhaseTask> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: TwoPhaseTask> Task<T> {
    pub fn new(task: T) -> Self {
        let core = TaskCore {
            identifier: task.identifier(),
            ..TaskCore::default()
        };
        let cell = Arc::new(TaskCell {
            core: Mutex::new(core),
            context: Arc::new(TaskContext::new()),
        });
        let inner = Arc::new_cyclic(|self_ref| TaskInner {
            task,
            cell,
            self_ref: self_ref.clone(),
        });
        Self { inner }
    }

    /// Installs the request executor phase work is submitted through.
    pub fn set_request_executor(&self, handler: Arc<dyn RequestHandler>) {
        self.inner.cell.core.lock().handler = Some(handler);
    }

    /// Installs the observer notified of lifecycle events.
    pub fn set_task_observer(&self, observer: Arc<dyn TaskObserver>) {
        self.inner.cell.core.lock().observer = Some(observer);
    }

    /// Installs the ambient context phase bodies can read.
    pub fn set_execution_context(&self, context: ExecutionContext) {
        self.inner.cell.context.set_execution(context);
    }

    /// The ambient context phase bodies see.
    pub fn execution_context(&self) -> ExecutionContext {
        self.inner.cell.context.execution()
    }

    /// Declares that this task must not start before `prerequisite` has
    /// completed.
    ///
    /// If the prerequisite has already settled, its outcome is applied
    /// immediately: completed counts the prerequisite as done, failed fails
    /// this task with the same error, cancelled cancels it.
    pub fn add_prerequisite<U: TwoPhaseTask>(&self, prerequisite: &Task<U>) {
        prerequisite.inner.link_dependent(self.node());
    }

    /// Declares that `dependent` must not start before this task has
    /// completed. Mirror of [`add_prerequisite`](Self::add_prerequisite).
    pub fn add_dependent<U: TwoPhaseTask>(&self, dependent: &Task<U>) {
        self.inner.link_dependent(dependent.node());
    }

    /// Arms the task. It starts as soon as every prerequisite has
    /// completed, immediately if there are none.
    ///
    /// Executing a task that already ran is ignored.
    ///
    /// # Panics
    ///
    /// Panics with [`NO_REQUEST_EXECUTOR`] if no request executor has been
    /// installed.
    pub fn execute(&self) {
        self.inner.execute_task();
    }

    /// Cancels the task and everything depending on it.
    ///
    /// Idle tasks settle immediately. A task with a phase in flight stays
    /// in its awaiting state until the phase returns, then settles without
    /// further callbacks; every `cancel` call made in that window notifies
    /// the observer again.
    pub fn cancel(&self) {
        self.inner.cancel_task();
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        self.inner.cell.core.lock().state
    }

    /// The identifier the task runs under. `None` until start for tasks
    /// that receive an automatic identifier.
    pub fn identifier(&self) -> Option<Identifier> {
        self.inner.cell.core.lock().identifier.clone()
    }

    /// The error a failed task settled with.
    pub fn error(&self) -> Option<ServiceError> {
        self.inner.cell.core.lock().error.clone()
    }

    /// A read-only view of this task for observers and bookkeeping.
    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            cell: Arc::clone(&self.inner.cell),
        }
    }

    pub(crate) fn node(&self) -> Arc<dyn TaskNode> {
        Arc::clone(&self.inner) as Arc<dyn TaskNode>
    }
}

impl<T: TwoPhaseTask> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.inner.cell.core.lock();
        f.debug_struct("Task")
            .field("state", &core.state)
            .field("identifier", &core.identifier)
            .field("pending_prerequisites", &core.pending_prerequisites)
            .finish_non_exhaustive()
    }
}

impl<T: TwoPhaseTask> TaskInner<T> {
    fn handle(&self) -> TaskHandle {
        TaskHandle {
            cell: Arc::clone(&self.cell),
        }
    }

    fn execute_task(&self) {
        let ready = {
            let mut core = self.cell.core.lock();
            if core.state != TaskState::Created {
                return;
            }
            if core.handler.is_none() {
                panic!("{}", NO_REQUEST_EXECUTOR);
            }
            core.state = TaskState::Started;
            core.pending_prerequisites == 0
        };
        if ready {
            self.start_networking();
        }
    }

    /// Moves an armed task with no outstanding prerequisites into its
    /// networking phase.
    fn start_networking(&self) {
        let (handler, declared) = {
            let core = self.cell.core.lock();
            if core.state != TaskState::Started || core.pending_prerequisites != 0 {
                return;
            }
            match &core.handler {
                Some(handler) => (Arc::clone(handler), core.identifier.clone()),
                None => return,
            }
        };

        // Task hooks run unlocked; their implementations are user code.
        let priority = self.task.priority();
        let resolved = declared.unwrap_or_else(|| handler.next_auto_identifier());

        let (identifier, observer) = {
            let mut core = self.cell.core.lock();
            // Re-check: a cancel or a second start may have won the race.
            if core.state != TaskState::Started || core.pending_prerequisites != 0 {
                return;
            }
            core.identifier = Some(resolved.clone());
            core.state = TaskState::AwaitingNetworking;
            (resolved, core.observer.clone())
        };

        if let Some(observer) = observer {
            observer.on_task_started(&self.handle());
        }

        let Some(inner) = self.self_ref.upgrade() else {
            return;
        };
        let context = Arc::clone(&self.cell.context);
        let body_inner = Arc::clone(&inner);
        let work = NetworkingPrioritizable::new(
            identifier,
            inner as Arc<dyn NetworkingObserver>,
            move || async move {
                body_inner
                    .task
                    .execute_networking(&context)
                    .await
                    .map(|data| -> PhaseData { Arc::new(data) })
            },
        );
        handler.execute_networking_request(PrioritizableRequest::new(work, priority));
    }

    /// Consumes the networking payload and queues the processing phase.
    fn begin_processing(&self, payload: Arc<T::Data>) {
        let priority = self.task.priority();
        let mut core = self.cell.core.lock();
        if core.state != TaskState::AwaitingNetworking {
            return;
        }
        let cancelled = self.cell.context.is_cancelled();
        let submit = if cancelled {
            None
        } else {
            core.state = TaskState::AwaitingProcessing;
            core.handler.clone().zip(core.identifier.clone())
        };
        drop(core);

        if cancelled {
            self.settle_cancelled();
            return;
        }
        let Some((handler, identifier)) = submit else {
            return;
        };

        // Dependents the networking body spawned join the graph before the
        // processing phase is queued.
        let adopted = self.adopt_spawned();
        if !adopted.is_empty() {
            self.cell.core.lock().dependents.extend(adopted);
        }

        let Some(inner) = self.self_ref.upgrade() else {
            return;
        };
        let context = Arc::clone(&self.cell.context);
        let body_inner = Arc::clone(&inner);
        let work = ProcessingPrioritizable::new(
            identifier,
            inner as Arc<dyn ProcessingObserver>,
            move || async move { body_inner.task.execute_processing(&context, payload).await },
        );
        handler.execute_processing_request(PrioritizableRequest::new(work, priority));
    }

    /// Settles the task as completed and releases its dependents.
    fn complete(&self) {
        let settled = {
            let mut core = self.cell.core.lock();
            if core.state != TaskState::AwaitingProcessing {
                return;
            }
            if self.cell.context.is_cancelled() {
                None
            } else {
                core.state = TaskState::Completed;
                Some((core.observer.clone(), std::mem::take(&mut core.dependents)))
            }
        };
        let Some((observer, dependents)) = settled else {
            self.settle_cancelled();
            return;
        };

        // The task's own callback fires before any dependent starts.
        if let Some(observer) = observer {
            observer.on_task_complete(&self.handle());
        }
        let adopted = self.adopt_spawned();
        for dependent in dependents.into_iter().chain(adopted) {
            dependent.prerequisite_finished(PrerequisiteOutcome::Completed);
        }
    }

    /// Settles the task as failed and short-circuits its dependents.
    fn fail(&self, error: ServiceError) {
        let settled = {
            let mut core = self.cell.core.lock();
            if core.state.is_terminal() {
                return;
            }
            if self.cell.context.is_cancelled() {
                None
            } else {
                core.state = TaskState::Failed;
                core.error = Some(error.clone());
                Some((core.observer.clone(), std::mem::take(&mut core.dependents)))
            }
        };
        let Some((observer, dependents)) = settled else {
            self.settle_cancelled();
            return;
        };

        // The task's own callback fires before the failure cascades.
        if let Some(observer) = observer {
            observer.on_task_failure(&self.handle(), &error);
        }
        let adopted = self.adopt_spawned();
        for dependent in dependents.into_iter().chain(adopted) {
            dependent.prerequisite_finished(PrerequisiteOutcome::Failed(error.clone()));
        }
    }

    /// Finalizes a cancelled task once its in-flight phase has returned,
    /// or immediately when the cancellation flag was raised without going
    /// through `cancel`.
    fn settle_cancelled(&self) {
        let (dependents, observer) = {
            let mut core = self.cell.core.lock();
            core.state = TaskState::Cancelled;
            let observer = if core.cancel_delivered {
                None
            } else {
                core.cancel_delivered = true;
                core.observer.clone()
            };
            (std::mem::take(&mut core.dependents), observer)
        };
        let spawned = self.cell.context.take_spawned();
        for dependent in dependents.into_iter().chain(spawned) {
            dependent.cancel_node();
        }
        if let Some(observer) = observer {
            observer.on_task_cancelled(&self.handle());
        }
    }

    fn cancel_task(&self) {
        self.cell.context.cancel();
        let notify = {
            let mut core = self.cell.core.lock();
            if core.state.is_terminal() {
                None
            } else {
                let in_flight = matches!(
                    core.state,
                    TaskState::AwaitingNetworking | TaskState::AwaitingProcessing
                );
                // An in-flight phase defers the terminal transition to the
                // phase boundary.
                if !in_flight {
                    core.state = TaskState::Cancelled;
                }
                core.cancel_delivered = true;
                Some((core.observer.clone(), std::mem::take(&mut core.dependents)))
            }
        };
        let Some((observer, dependents)) = notify else {
            return;
        };

        // Dependents are notified before the task's own callback.
        let spawned = self.cell.context.take_spawned();
        for dependent in dependents.into_iter().chain(spawned) {
            dependent.cancel_node();
        }
        if let Some(observer) = observer {
            observer.on_task_cancelled(&self.handle());
        }
    }

    /// Registers `child` as a dependent, or applies this task's settled
    /// outcome to it immediately.
    fn link_dependent(&self, child: Arc<dyn TaskNode>) {
        child.increment_pending();
        let settled = {
            let mut core = self.cell.core.lock();
            if core.state.is_terminal() {
                Some((core.state, core.error.clone()))
            } else {
                core.dependents.push(Arc::clone(&child));
                None
            }
        };
        match settled {
            None => {}
            Some((TaskState::Completed, _)) => {
                child.prerequisite_finished(PrerequisiteOutcome::Completed);
            }
            Some((TaskState::Failed, error)) => {
                let error =
                    error.unwrap_or_else(|| ServiceError::internal("prerequisite failed"));
                child.prerequisite_finished(PrerequisiteOutcome::Failed(error));
            }
            Some(_) => child.cancel_node(),
        }
    }

    /// Collects tasks spawned by a phase body and attaches them as
    /// dependents, inheriting this task's wiring where they have none.
    fn adopt_spawned(&self) -> Vec<Arc<dyn TaskNode>> {
        let spawned = self.cell.context.take_spawned();
        if spawned.is_empty() {
            return spawned;
        }
        let (handler, observer) = {
            let core = self.cell.core.lock();
            (core.handler.clone(), core.observer.clone())
        };
        let execution = self.cell.context.execution();
        for child in &spawned {
            child.adopt(handler.clone(), observer.clone(), execution.clone());
        }
        spawned
    }
}

impl<T: TwoPhaseTask> TaskNode for TaskInner<T> {
    fn increment_pending(&self) {
        let mut core = self.cell.core.lock();
        if !core.state.is_terminal() {
            core.pending_prerequisites += 1;
        }
    }

    fn adopt(
        &self,
        handler: Option<Arc<dyn RequestHandler>>,
        observer: Option<Arc<dyn TaskObserver>>,
        execution: ExecutionContext,
    ) {
        {
            let mut core = self.cell.core.lock();
            if core.state.is_terminal() {
                return;
            }
            if core.handler.is_none() {
                core.handler = handler;
            }
            if core.observer.is_none() {
                core.observer = observer;
            }
            if core.state == TaskState::Created {
                core.state = TaskState::Started;
            }
            core.pending_prerequisites += 1;
        }
        if self.cell.context.execution().is_empty() && !execution.is_empty() {
            self.cell.context.set_execution(execution);
        }
    }

    fn prerequisite_finished(&self, outcome: PrerequisiteOutcome) {
        match outcome {
            PrerequisiteOutcome::Completed => {
                let ready = {
                    let mut core = self.cell.core.lock();
                    if core.state.is_terminal() {
                        return;
                    }
                    core.pending_prerequisites = core.pending_prerequisites.saturating_sub(1);
                    core.state == TaskState::Started && core.pending_prerequisites == 0
                };
                if ready {
                    self.start_networking();
                }
            }
            PrerequisiteOutcome::Failed(error) => self.fail(error),
        }
    }

    fn cancel_node(&self) {
        self.cancel_task();
    }
}

impl<T: TwoPhaseTask> NetworkingObserver for TaskInner<T> {
    fn on_networking_complete(&self, data: PhaseData) {
        match data.downcast::<T::Data>() {
            Ok(payload) => self.begin_processing(payload),
            Err(_) => self.fail(ServiceError::payload_mismatch(
                "networking payload type did not match the task's data type",
            )),
        }
    }

    fn on_networking_failure(&self, error: ServiceError) {
        self.fail(error);
    }
}

impl<T: TwoPhaseTask> ProcessingObserver for TaskInner<T> {
    fn on_processing_complete(&self) {
        self.complete();
    }

    fn on_processing_failure(&self, error: ServiceError) {
        self.fail(error);
    }
}
