//! Auxiliary worker pool with priority scheduling and identifier tracking.
//!
//! An [`AuxiliaryExecutor`] owns a [`PriorityQueue`] of pending requests and
//! a set of on-demand tokio workers that drain it. Workers are spawned lazily
//! up to the configured pool size and retire after sitting idle for the
//! keep-alive period, so an idle scheduler holds no tasks.
//!
//! # Identifier tracking
//!
//! The pool tracks which identifiers are active: popped and running, or run
//! and not yet released. A queued request whose identifier is active is left
//! in the queue until [`AuxiliaryExecutor::notify_request_complete`] releases
//! the identifier. The owner calls that release after it has finished
//! delivering results for the identifier, which closes the window where a
//! fresh submission could start a second execution while listeners for the
//! first are still being notified.
//!
//! # Lock discipline
//!
//! All pool state lives behind one mutex that is never held across an await
//! point or an observer call. Workers pop under the lock, run and report
//! outside it.

use crate::executor::config::PoolConfig;
use crate::executor::queue::PriorityQueue;
use crate::executor::request::{Prioritizable, PrioritizableRequest, RunOutcome};
use crate::identifier::Identifier;
use crate::log::{Logger, NoOpLogger};
use crate::{log_debug, log_error, log_trace, log_warn};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Receives every request the pool finishes with.
///
/// Callbacks are invoked from worker tasks with no pool lock held. The
/// observer owns the request from that point on; delivering its outcome to
/// whoever is waiting, and eventually releasing the identifier, is the
/// observer's job.
pub trait ExecutorObserver<P>: Send + Sync {
    /// The request ran to its end state. The identifier stays active until
    /// [`AuxiliaryExecutor::notify_request_complete`] is called for it.
    fn on_complete(&self, request: PrioritizableRequest<P>);

    /// The request was discarded without running because it was cancelled
    /// while queued, or was rejected after shutdown.
    fn on_cancelled(&self, request: PrioritizableRequest<P>);
}

/// Point-in-time counters for one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Requests waiting in the queue.
    pub queued: usize,
    /// Identifiers running or awaiting release.
    pub active: usize,
    /// Live worker tasks.
    pub workers: usize,
    /// Workers parked waiting for work.
    pub idle_workers: usize,
}

struct PoolState<P> {
    queue: PriorityQueue<P>,
    active: HashSet<Identifier>,
    workers: usize,
    idle: usize,
}

struct PoolCore<P> {
    state: Mutex<PoolState<P>>,
    work: Notify,
    shutdown: CancellationToken,
    config: PoolConfig,
    logger: Arc<dyn Logger>,
    runtime: Handle,
    worker_seq: AtomicU64,
}

impl<P: Prioritizable> PoolCore<P> {
    /// Caller holds the state lock. Returns true when the caller must spawn
    /// a worker; otherwise an existing worker has been notified or will
    /// re-poll on its own.
    fn ensure_worker(&self, state: &mut PoolState<P>) -> bool {
        if state.queue.is_empty() {
            return false;
        }
        if state.idle == 0 && state.workers < self.config.core_pool_size {
            state.workers += 1;
            return true;
        }
        self.work.notify_one();
        false
    }

    async fn run_worker(self: Arc<Self>, worker: u64, observer: Arc<dyn ExecutorObserver<P>>) {
        log_debug!(
            self.logger,
            "{} worker {} started",
            self.config.label,
            worker
        );

        loop {
            // Drain phase: run queued requests until none are eligible.
            loop {
                let (request, cancelled) = {
                    let mut guard = self.state.lock();
                    let state = &mut *guard;
                    let dequeue = state.queue.remove_highest_priority(&state.active);
                    if let Some(request) = &dequeue.request {
                        state.active.insert(request.identifier().clone());
                    }
                    (dequeue.request, dequeue.cancelled)
                };

                for request in cancelled {
                    log_debug!(
                        self.logger,
                        "{} discarding cancelled request {:?}",
                        self.config.label,
                        request.identifier()
                    );
                    observer.on_cancelled(request);
                }

                let Some(mut request) = request else {
                    break;
                };

                let identifier = request.identifier().clone();
                log_trace!(
                    self.logger,
                    "{} worker {} running {:?}",
                    self.config.label,
                    worker,
                    identifier
                );

                if let RunOutcome::Panicked(message) = request.run().await {
                    log_error!(
                        self.logger,
                        "{} request {:?} panicked: {}",
                        self.config.label,
                        identifier,
                        message
                    );
                }

                observer.on_complete(request);
            }

            // Park phase: wait for work, shutdown, or the keep-alive to lapse.
            {
                let mut state = self.state.lock();
                state.idle += 1;
            }

            enum Wake {
                Work,
                Shutdown,
                Timeout,
            }

            let wake = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => Wake::Shutdown,
                _ = self.work.notified() => Wake::Work,
                _ = tokio::time::sleep(self.config.keep_alive) => Wake::Timeout,
            };

            let retire = {
                let mut state = self.state.lock();
                state.idle -= 1;
                let retire = match wake {
                    Wake::Shutdown => true,
                    Wake::Work => false,
                    Wake::Timeout => state.queue.is_empty(),
                };
                if retire {
                    state.workers -= 1;
                }
                retire
            };

            if retire {
                log_debug!(
                    self.logger,
                    "{} worker {} retired",
                    self.config.label,
                    worker
                );
                return;
            }
        }
    }
}

/// Priority-scheduled worker pool for one execution phase.
///
/// The pool accepts [`PrioritizableRequest`]s, de-duplicates them by
/// identifier, and runs them on lazily spawned tokio tasks. Finished and
/// discarded requests are handed to the pool's [`ExecutorObserver`].
pub struct AuxiliaryExecutor<P> {
    core: Arc<PoolCore<P>>,
    observer: Arc<dyn ExecutorObserver<P>>,
}

impl<P: Prioritizable> AuxiliaryExecutor<P> {
    /// Creates a pool with a silent logger.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime; the pool captures the
    /// current runtime handle so later submissions may come from any thread.
    pub fn new(config: PoolConfig, observer: Arc<dyn ExecutorObserver<P>>) -> Self {
        Self::with_logger(config, observer, Arc::new(NoOpLogger))
    }

    /// Creates a pool with the given logger.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn with_logger(
        mut config: PoolConfig,
        observer: Arc<dyn ExecutorObserver<P>>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        config.core_pool_size = config.core_pool_size.max(1);
        Self {
            core: Arc::new(PoolCore {
                state: Mutex::new(PoolState {
                    queue: PriorityQueue::new(config.priority_levels),
                    active: HashSet::new(),
                    workers: 0,
                    idle: 0,
                }),
                work: Notify::new(),
                shutdown: CancellationToken::new(),
                config,
                logger,
                runtime: Handle::current(),
                worker_seq: AtomicU64::new(0),
            }),
            observer,
        }
    }

    /// Accepts a request for execution.
    ///
    /// A pending request with the same identifier is replaced and bumped to
    /// the top of its tier. If the identifier is currently active the new
    /// entry waits in the queue until the identifier is released. Workers
    /// are spawned on demand on the runtime the pool was created in.
    pub fn execute(&self, mut request: PrioritizableRequest<P>) {
        if self.core.shutdown.is_cancelled() {
            log_warn!(
                self.core.logger,
                "{} executor is shut down, rejecting {:?}",
                self.core.config.label,
                request.identifier()
            );
            request.set_cancelled();
            self.observer.on_cancelled(request);
            return;
        }

        let spawn = {
            let mut guard = self.core.state.lock();
            let state = &mut *guard;
            log_trace!(
                self.core.logger,
                "{} queued {:?}",
                self.core.config.label,
                request.identifier()
            );
            state.queue.add(request);
            self.core.ensure_worker(state)
        };
        if spawn {
            self.spawn_worker();
        }
    }

    /// Releases an identifier, allowing a queued request with the same
    /// identifier to run.
    ///
    /// Owners call this once they have finished delivering results for the
    /// identifier's completed request.
    pub fn notify_request_complete(&self, identifier: &Identifier) {
        let spawn = {
            let mut guard = self.core.state.lock();
            let state = &mut *guard;
            if !state.active.remove(identifier) {
                log_warn!(
                    self.core.logger,
                    "{} released {:?} which was not active",
                    self.core.config.label,
                    identifier
                );
            }
            self.core.ensure_worker(state)
        };
        if spawn {
            self.spawn_worker();
        }
    }

    /// Marks every queued request cancelled.
    ///
    /// The entries are discarded and reported through
    /// [`ExecutorObserver::on_cancelled`] the next time a worker scans the
    /// queue; a worker is woken or spawned to do so promptly. Requests
    /// already running are not interrupted.
    pub fn cancel_all(&self) {
        let spawn = {
            let mut guard = self.core.state.lock();
            let state = &mut *guard;
            state.queue.mark_all_cancelled();
            self.core.ensure_worker(state)
        };
        if spawn {
            self.spawn_worker();
        }
    }

    /// Stops all workers. Queued requests are dropped with the pool.
    pub fn shutdown(&self) {
        log_debug!(
            self.core.logger,
            "{} executor shutting down",
            self.core.config.label
        );
        self.core.shutdown.cancel();
    }

    /// Number of requests waiting in the queue.
    pub fn queue_size(&self) -> usize {
        self.core.state.lock().queue.size()
    }

    /// Number of identifiers running or awaiting release.
    pub fn active_count(&self) -> usize {
        self.core.state.lock().active.len()
    }

    /// Queued plus active requests.
    pub fn outstanding_count(&self) -> usize {
        let state = self.core.state.lock();
        state.queue.size() + state.active.len()
    }

    /// True when nothing is queued, running, or awaiting release.
    pub fn is_idle(&self) -> bool {
        let state = self.core.state.lock();
        state.queue.is_empty() && state.active.is_empty()
    }

    /// Snapshot of the pool's counters.
    pub fn stats(&self) -> ExecutorStats {
        let state = self.core.state.lock();
        ExecutorStats {
            queued: state.queue.size(),
            active: state.active.len(),
            workers: state.workers,
            idle_workers: state.idle,
        }
    }

    fn spawn_worker(&self) {
        let worker = self.core.worker_seq.fetch_add(1, Ordering::Relaxed);
        let core = Arc::clone(&self.core);
        let observer = Arc::clone(&self.observer);
        self.core.runtime.spawn(core.run_worker(worker, observer));
    }
}

impl<P> Drop for AuxiliaryExecutor<P> {
    fn drop(&mut self) {
        self.core.shutdown.cancel();
    }
}

impl<P: Prioritizable> fmt::Debug for AuxiliaryExecutor<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        f.debug_struct("AuxiliaryExecutor")
            .field("label", &self.core.config.label)
            .field("queued", &stats.queued)
            .field("active", &stats.active)
            .field("workers", &stats.workers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Priority;
    use futures::future::BoxFuture;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct TestWork {
        identifier: Identifier,
        runs: Arc<AtomicUsize>,
        gate: Option<Arc<Notify>>,
        panic_message: Option<&'static str>,
    }

    impl TestWork {
        fn new(key: &str, runs: Arc<AtomicUsize>) -> Self {
            Self {
                identifier: Identifier::from(key),
                runs,
                gate: None,
                panic_message: None,
            }
        }

        fn gated(key: &str, runs: Arc<AtomicUsize>, gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new(key, runs)
            }
        }

        fn panicking(key: &str, runs: Arc<AtomicUsize>, message: &'static str) -> Self {
            Self {
                panic_message: Some(message),
                ..Self::new(key, runs)
            }
        }
    }

    impl Prioritizable for TestWork {
        fn identifier(&self) -> &Identifier {
            &self.identifier
        }

        fn execute(&mut self) -> BoxFuture<'_, ()> {
            Box::pin(async move {
                self.runs.fetch_add(1, Ordering::SeqCst);
                if let Some(gate) = &self.gate {
                    gate.notified().await;
                }
                if let Some(message) = self.panic_message {
                    panic!("{}", message);
                }
            })
        }

        fn record_failure(&mut self, _message: String) {}
    }

    #[derive(Default)]
    struct RecordingObserver {
        completed: Mutex<Vec<Identifier>>,
        cancelled: Mutex<Vec<Identifier>>,
    }

    impl RecordingObserver {
        fn completed_count(&self) -> usize {
            self.completed.lock().len()
        }

        fn cancelled_count(&self) -> usize {
            self.cancelled.lock().len()
        }
    }

    impl ExecutorObserver<TestWork> for RecordingObserver {
        fn on_complete(&self, request: PrioritizableRequest<TestWork>) {
            self.completed.lock().push(request.identifier().clone());
        }

        fn on_cancelled(&self, request: PrioritizableRequest<TestWork>) {
            self.cancelled.lock().push(request.identifier().clone());
        }
    }

    fn quick_config() -> PoolConfig {
        PoolConfig::new("test", 2).with_keep_alive(Duration::from_millis(20))
    }

    async fn wait_for(label: &str, mut condition: impl FnMut() -> bool) {
        let waited = tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "timed out waiting for {}", label);
    }

    fn request(work: TestWork) -> PrioritizableRequest<TestWork> {
        PrioritizableRequest::new(work, Priority::Normal)
    }

    #[tokio::test]
    async fn test_executes_submitted_request() {
        let observer = Arc::new(RecordingObserver::default());
        let executor = AuxiliaryExecutor::new(quick_config(), observer.clone());
        let runs = Arc::new(AtomicUsize::new(0));

        executor.execute(request(TestWork::new("job", runs.clone())));

        wait_for("completion", || observer.completed_count() == 1).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(executor.queue_size(), 0);
        // The identifier stays active until released.
        assert_eq!(executor.active_count(), 1);
        executor.notify_request_complete(&Identifier::from("job"));
        assert!(executor.is_idle());
    }

    #[tokio::test]
    async fn test_same_identifier_waits_for_release() {
        let observer = Arc::new(RecordingObserver::default());
        let executor = AuxiliaryExecutor::new(quick_config(), observer.clone());
        let runs = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        executor.execute(request(TestWork::gated("dup", runs.clone(), gate.clone())));
        wait_for("first run to start", || runs.load(Ordering::SeqCst) == 1).await;

        // Same identifier while the first is in flight: queued, not run.
        executor.execute(request(TestWork::new("dup", runs.clone())));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(executor.queue_size(), 1);

        gate.notify_one();
        wait_for("first completion", || observer.completed_count() == 1).await;

        // Still blocked: the identifier has not been released.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        executor.notify_request_complete(&Identifier::from("dup"));
        wait_for("second completion", || observer.completed_count() == 2).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_duplicate_queued_submission_replaces_entry() {
        let observer = Arc::new(RecordingObserver::default());
        let executor = AuxiliaryExecutor::new(
            PoolConfig::new("test", 1).with_keep_alive(Duration::from_millis(20)),
            observer.clone(),
        );
        let runs = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        executor.execute(request(TestWork::gated("busy", runs.clone(), gate.clone())));
        wait_for("worker busy", || runs.load(Ordering::SeqCst) == 1).await;

        executor.execute(request(TestWork::new("queued", runs.clone())));
        executor.execute(request(TestWork::new("queued", runs.clone())));
        assert_eq!(executor.queue_size(), 1);

        gate.notify_one();
        wait_for("both completions", || observer.completed_count() == 2).await;
        executor.notify_request_complete(&Identifier::from("busy"));
        executor.notify_request_complete(&Identifier::from("queued"));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancel_all_reports_discarded_requests() {
        let observer = Arc::new(RecordingObserver::default());
        let executor = AuxiliaryExecutor::new(
            PoolConfig::new("test", 1).with_keep_alive(Duration::from_millis(20)),
            observer.clone(),
        );
        let runs = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        executor.execute(request(TestWork::gated("running", runs.clone(), gate.clone())));
        wait_for("worker busy", || runs.load(Ordering::SeqCst) == 1).await;
        executor.execute(request(TestWork::new("a", runs.clone())));
        executor.execute(request(TestWork::new("b", runs.clone())));

        executor.cancel_all();
        gate.notify_one();

        wait_for("cancellations", || observer.cancelled_count() == 2).await;
        wait_for("running completion", || observer.completed_count() == 1).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_workers_retire_after_keep_alive() {
        let observer = Arc::new(RecordingObserver::default());
        let executor = AuxiliaryExecutor::new(quick_config(), observer.clone());
        let runs = Arc::new(AtomicUsize::new(0));

        executor.execute(request(TestWork::new("short", runs.clone())));
        wait_for("completion", || observer.completed_count() == 1).await;
        executor.notify_request_complete(&Identifier::from("short"));

        wait_for("worker retirement", || executor.stats().workers == 0).await;

        // The pool spawns a fresh worker for later work.
        executor.execute(request(TestWork::new("later", runs.clone())));
        wait_for("second completion", || observer.completed_count() == 2).await;
    }

    #[tokio::test]
    async fn test_panicking_request_is_reported_and_worker_survives() {
        let observer = Arc::new(RecordingObserver::default());
        let executor = AuxiliaryExecutor::new(
            PoolConfig::new("test", 1).with_keep_alive(Duration::from_millis(200)),
            observer.clone(),
        );
        let runs = Arc::new(AtomicUsize::new(0));

        executor.execute(request(TestWork::panicking("boom", runs.clone(), "exploded")));
        wait_for("panicked completion", || observer.completed_count() == 1).await;
        executor.notify_request_complete(&Identifier::from("boom"));

        executor.execute(request(TestWork::new("after", runs.clone())));
        wait_for("follow-up completion", || observer.completed_count() == 2).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_execute_after_shutdown_reports_cancelled() {
        let observer = Arc::new(RecordingObserver::default());
        let executor = AuxiliaryExecutor::new(quick_config(), observer.clone());
        let runs = Arc::new(AtomicUsize::new(0));

        executor.shutdown();
        executor.execute(request(TestWork::new("late", runs.clone())));

        assert_eq!(observer.cancelled_count(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stats_snapshot() {
        let observer = Arc::new(RecordingObserver::default());
        let executor = AuxiliaryExecutor::new(
            PoolConfig::new("test", 1).with_keep_alive(Duration::from_millis(20)),
            observer.clone(),
        );
        let runs = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        assert_eq!(
            executor.stats(),
            ExecutorStats {
                queued: 0,
                active: 0,
                workers: 0,
                idle_workers: 0
            }
        );

        executor.execute(request(TestWork::gated("busy", runs.clone(), gate.clone())));
        wait_for("worker busy", || runs.load(Ordering::SeqCst) == 1).await;
        executor.execute(request(TestWork::new("waiting", runs.clone())));

        let stats = executor.stats();
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.workers, 1);
        assert_eq!(executor.outstanding_count(), 2);

        gate.notify_one();
        wait_for("all done", || observer.completed_count() == 2).await;
    }
}
