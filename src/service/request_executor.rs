//! Coalescing two-pool request executor.
//!
//! [`RequestExecutor`] is the pooled [`RequestHandler`]: networking work
//! runs on one [`AuxiliaryExecutor`], processing work on another, and
//! concurrent submissions that share an identifier are coalesced into a
//! single execution whose outcome fans out to every registered observer.
//!
//! # Coalescing
//!
//! Each pool has a waiter map keyed by identifier. The first submission for
//! an identifier registers its observer and enters the pool; while that
//! entry is in flight, further submissions only append their observers and
//! the duplicate work item is dropped. On completion the waiter list is
//! drained and notified in subscription order, and only then is the
//! identifier released back to the pool, so a repeat submission cannot start
//! until every waiter of the previous run has heard its outcome.
//!
//! # Lock order
//!
//! The waiter-map lock may be taken before a pool lock, never after, and is
//! never held while observers are notified.

use crate::executor::{
    AuxiliaryExecutor, ExecutorObserver, ExecutorStats, PoolConfig, PrioritizableRequest,
};
use crate::identifier::Identifier;
use crate::log::{Logger, NoOpLogger};
use crate::service::handler::RequestHandler;
use crate::service::identifier_map::IdentifierMap;
use crate::service::phases::{
    NetworkingObserver, NetworkingPrioritizable, NetworkingRequest, ProcessingObserver,
    ProcessingPrioritizable, ProcessingRequest,
};
use crate::{log_debug, log_trace, log_warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Configuration for both pools of a [`RequestExecutor`].
#[derive(Clone, Debug)]
pub struct RequestExecutorConfig {
    /// Networking pool sizing.
    pub network: PoolConfig,

    /// Processing pool sizing.
    pub processing: PoolConfig,
}

impl Default for RequestExecutorConfig {
    fn default() -> Self {
        Self {
            network: PoolConfig::network(),
            processing: PoolConfig::processing(),
        }
    }
}

/// Submission counters across both pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoalescingStats {
    /// Requests handed to the executor.
    pub submissions: u64,
    /// Submissions absorbed by an in-flight identifier.
    pub coalesced: u64,
    /// Submissions that entered a pool.
    pub executions: u64,
}

struct Maps {
    network: IdentifierMap<Arc<dyn NetworkingObserver>>,
    processing: IdentifierMap<Arc<dyn ProcessingObserver>>,
}

struct Inner {
    maps: Mutex<Maps>,
    network: AuxiliaryExecutor<NetworkingPrioritizable>,
    processing: AuxiliaryExecutor<ProcessingPrioritizable>,
    next_identifier: AtomicU64,
    submissions: AtomicU64,
    coalesced: AtomicU64,
    executions: AtomicU64,
    logger: Arc<dyn Logger>,
}

impl Inner {
    fn submit_networking(&self, request: NetworkingRequest) {
        self.submissions.fetch_add(1, Ordering::Relaxed);
        let identifier = request.identifier().clone();
        let observer = request.prioritizable().observer();

        let mut maps = self.maps.lock();
        if maps.network.add(identifier.clone(), observer) {
            // Registration and pool entry are one atomic step under the
            // map lock.
            self.network.execute(request);
            drop(maps);
            self.executions.fetch_add(1, Ordering::Relaxed);
            log_trace!(self.logger, "networking request {:?} submitted", identifier);
        } else {
            drop(maps);
            self.coalesced.fetch_add(1, Ordering::Relaxed);
            log_trace!(
                self.logger,
                "networking request {:?} coalesced onto in-flight execution",
                identifier
            );
        }
    }

    fn submit_processing(&self, request: ProcessingRequest) {
        self.submissions.fetch_add(1, Ordering::Relaxed);
        let identifier = request.identifier().clone();
        let observer = request.prioritizable().observer();

        let mut maps = self.maps.lock();
        if maps.processing.add(identifier.clone(), observer) {
            self.processing.execute(request);
            drop(maps);
            self.executions.fetch_add(1, Ordering::Relaxed);
            log_trace!(self.logger, "processing request {:?} submitted", identifier);
        } else {
            drop(maps);
            self.coalesced.fetch_add(1, Ordering::Relaxed);
            log_trace!(
                self.logger,
                "processing request {:?} coalesced onto in-flight execution",
                identifier
            );
        }
    }

    fn complete_networking(&self, request: PrioritizableRequest<NetworkingPrioritizable>) {
        let identifier = request.identifier().clone();
        let outcome = request.into_inner().into_outcome();

        let waiters = self.maps.lock().network.remove(&identifier);
        if waiters.is_empty() {
            log_warn!(
                self.logger,
                "networking request {:?} completed with no registered waiters",
                identifier
            );
        }

        match outcome {
            Ok(data) => {
                log_debug!(
                    self.logger,
                    "networking request {:?} complete, notifying {} waiter(s)",
                    identifier,
                    waiters.len()
                );
                for observer in &waiters {
                    observer.on_networking_complete(Arc::clone(&data));
                }
            }
            Err(error) => {
                log_debug!(
                    self.logger,
                    "networking request {:?} failed ({}), notifying {} waiter(s)",
                    identifier,
                    error,
                    waiters.len()
                );
                for observer in &waiters {
                    observer.on_networking_failure(error.clone());
                }
            }
        }

        // Release last: a queued duplicate must not start until every
        // waiter above has heard the outcome.
        self.network.notify_request_complete(&identifier);
    }

    fn complete_processing(&self, request: PrioritizableRequest<ProcessingPrioritizable>) {
        let identifier = request.identifier().clone();
        let outcome = request.into_inner().into_outcome();

        let waiters = self.maps.lock().processing.remove(&identifier);
        if waiters.is_empty() {
            log_warn!(
                self.logger,
                "processing request {:?} completed with no registered waiters",
                identifier
            );
        }

        match outcome {
            Ok(()) => {
                log_debug!(
                    self.logger,
                    "processing request {:?} complete, notifying {} waiter(s)",
                    identifier,
                    waiters.len()
                );
                for observer in &waiters {
                    observer.on_processing_complete();
                }
            }
            Err(error) => {
                log_debug!(
                    self.logger,
                    "processing request {:?} failed ({}), notifying {} waiter(s)",
                    identifier,
                    error,
                    waiters.len()
                );
                for observer in &waiters {
                    observer.on_processing_failure(error.clone());
                }
            }
        }

        self.processing.notify_request_complete(&identifier);
    }
}

struct NetworkingPoolObserver {
    inner: Weak<Inner>,
}

impl ExecutorObserver<NetworkingPrioritizable> for NetworkingPoolObserver {
    fn on_complete(&self, request: PrioritizableRequest<NetworkingPrioritizable>) {
        if let Some(inner) = self.inner.upgrade() {
            inner.complete_networking(request);
        }
    }

    fn on_cancelled(&self, request: PrioritizableRequest<NetworkingPrioritizable>) {
        // May run inside the submit path with the map lock held; must not
        // touch the maps.
        if let Some(inner) = self.inner.upgrade() {
            log_debug!(
                inner.logger,
                "networking request {:?} discarded without running",
                request.identifier()
            );
        }
    }
}

struct ProcessingPoolObserver {
    inner: Weak<Inner>,
}

impl ExecutorObserver<ProcessingPrioritizable> for ProcessingPoolObserver {
    fn on_complete(&self, request: PrioritizableRequest<ProcessingPrioritizable>) {
        if let Some(inner) = self.inner.upgrade() {
            inner.complete_processing(request);
        }
    }

    fn on_cancelled(&self, request: PrioritizableRequest<ProcessingPrioritizable>) {
        if let Some(inner) = self.inner.upgrade() {
            log_debug!(
                inner.logger,
                "processing request {:?} discarded without running",
                request.identifier()
            );
        }
    }
}

/// Two-pool request scheduler with per-identifier coalescing.
///
/// Cloning yields another handle to the same executor. Dropping the last
/// handle stops the workers.
///
/// # Example
///
/// ```ignore
/// use twostage::service::{RequestExecutor, RequestHandler, NetworkingPrioritizable, phase_data};
/// use twostage::executor::{Priority, PrioritizableRequest};
/// use twostage::Identifier;
///
/// let executor = RequestExecutor::new();
/// let work = NetworkingPrioritizable::new(
///     Identifier::from("record/42"),
///     observer,
///     || async { Ok(phase_data(fetch_record(42).await?)) },
/// );
/// executor.execute_networking_request(PrioritizableRequest::new(work, Priority::Normal));
/// ```
#[derive(Clone)]
pub struct RequestExecutor {
    inner: Arc<Inner>,
}

impl RequestExecutor {
    /// Creates an executor with default pool sizing and a silent logger.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new() -> Self {
        Self::with_config(RequestExecutorConfig::default())
    }

    /// Creates an executor with custom pool sizing.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn with_config(config: RequestExecutorConfig) -> Self {
        Self::with_logger(config, Arc::new(NoOpLogger))
    }

    /// Creates an executor with custom pool sizing and a logger.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn with_logger(config: RequestExecutorConfig, logger: Arc<dyn Logger>) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| Inner {
            maps: Mutex::new(Maps {
                network: IdentifierMap::new(),
                processing: IdentifierMap::new(),
            }),
            network: AuxiliaryExecutor::with_logger(
                config.network,
                Arc::new(NetworkingPoolObserver {
                    inner: weak.clone(),
                }),
                Arc::clone(&logger),
            ),
            processing: AuxiliaryExecutor::with_logger(
                config.processing,
                Arc::new(ProcessingPoolObserver {
                    inner: weak.clone(),
                }),
                Arc::clone(&logger),
            ),
            next_identifier: AtomicU64::new(0),
            submissions: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            executions: AtomicU64::new(0),
            logger,
        });
        Self { inner }
    }

    /// Number of identifiers currently in flight across both phases.
    pub fn request_count(&self) -> usize {
        let maps = self.inner.maps.lock();
        maps.network.len() + maps.processing.len()
    }

    /// True when no request is in flight, queued, or awaiting release.
    pub fn is_idle(&self) -> bool {
        let maps_empty = {
            let maps = self.inner.maps.lock();
            maps.network.is_empty() && maps.processing.is_empty()
        };
        maps_empty && self.inner.network.is_idle() && self.inner.processing.is_idle()
    }

    /// Snapshot of the submission counters.
    pub fn stats(&self) -> CoalescingStats {
        CoalescingStats {
            submissions: self.inner.submissions.load(Ordering::Relaxed),
            coalesced: self.inner.coalesced.load(Ordering::Relaxed),
            executions: self.inner.executions.load(Ordering::Relaxed),
        }
    }

    /// Snapshot of the networking pool counters.
    pub fn network_stats(&self) -> ExecutorStats {
        self.inner.network.stats()
    }

    /// Snapshot of the processing pool counters.
    pub fn processing_stats(&self) -> ExecutorStats {
        self.inner.processing.stats()
    }

    /// Stops both pools. Outcomes not yet delivered are dropped.
    pub fn shutdown(&self) {
        log_debug!(self.inner.logger, "request executor shutting down");
        self.inner.network.shutdown();
        self.inner.processing.shutdown();
    }
}

impl Default for RequestExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestHandler for RequestExecutor {
    fn next_auto_identifier(&self) -> Identifier {
        Identifier::auto(self.inner.next_identifier.fetch_add(1, Ordering::Relaxed))
    }

    fn execute_networking_request(&self, request: NetworkingRequest) {
        self.inner.submit_networking(request);
    }

    fn execute_processing_request(&self, request: ProcessingRequest) {
        self.inner.submit_processing(request);
    }
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("request_count", &self.request_count())
            .field("network", &self.network_stats())
            .field("processing", &self.processing_stats())
            .finish_non_exhaustive()
    }
}
