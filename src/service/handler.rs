//! Request dispatch seam between tasks and executors.

use crate::identifier::Identifier;
use crate::service::phases::{NetworkingRequest, ProcessingRequest};
use futures::executor::block_on;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sink a task submits its phase requests through.
///
/// The pooled implementation is
/// [`RequestExecutor`](crate::service::RequestExecutor); tests and
/// single-threaded callers can use [`SerialRequestExecutor`].
pub trait RequestHandler: Send + Sync {
    /// Reserves a fresh identifier for work submitted without one.
    ///
    /// Returned identifiers live in a namespace of their own, so they never
    /// collide with caller-supplied keys, and are unique per handler.
    fn next_auto_identifier(&self) -> Identifier;

    /// Submits networking-phase work.
    fn execute_networking_request(&self, request: NetworkingRequest);

    /// Submits processing-phase work.
    fn execute_processing_request(&self, request: ProcessingRequest);
}

/// Handler that runs every request inline on the calling thread.
///
/// No queueing, no coalescing, no pools: the request runs to completion
/// inside the submit call and its outcome is delivered to the request's own
/// observer before the call returns. Deterministic ordering makes this the
/// handler of choice in unit tests.
#[derive(Debug, Default)]
pub struct SerialRequestExecutor {
    next_identifier: AtomicU64,
}

impl SerialRequestExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RequestHandler for SerialRequestExecutor {
    fn next_auto_identifier(&self) -> Identifier {
        Identifier::auto(self.next_identifier.fetch_add(1, Ordering::Relaxed))
    }

    fn execute_networking_request(&self, mut request: NetworkingRequest) {
        block_on(request.run());
        let work = request.into_inner();
        let observer = work.observer();
        match work.into_outcome() {
            Ok(data) => observer.on_networking_complete(data),
            Err(error) => observer.on_networking_failure(error),
        }
    }

    fn execute_processing_request(&self, mut request: ProcessingRequest) {
        block_on(request.run());
        let work = request.into_inner();
        let observer = work.observer();
        match work.into_outcome() {
            Ok(()) => observer.on_processing_complete(),
            Err(error) => observer.on_processing_failure(error),
        }
    }
}
