//! Phase work items and their observers.
//!
//! A two-phase request runs as two separately scheduled units: a
//! [`NetworkingPrioritizable`] that produces a [`PhaseData`] payload, and a
//! [`ProcessingPrioritizable`] that consumes it. Each carries the async body
//! supplied by its creator, records its outcome when run, and names the
//! observer to hand that outcome to.

use crate::executor::{Prioritizable, PrioritizableRequest};
use crate::identifier::Identifier;
use crate::service::error::ServiceError;
use futures::future::BoxFuture;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Payload handed from the networking phase to the processing phase.
///
/// Type-erased so unrelated request types can share one scheduler; the
/// consumer downcasts back to the concrete type it produced.
pub type PhaseData = Arc<dyn Any + Send + Sync>;

/// Wraps a value as a [`PhaseData`] payload.
pub fn phase_data<T: Send + Sync + 'static>(value: T) -> PhaseData {
    Arc::new(value)
}

/// Receives the outcome of a networking-phase request.
///
/// Called with no scheduler lock held.
pub trait NetworkingObserver: Send + Sync {
    /// The networking phase produced a payload.
    fn on_networking_complete(&self, data: PhaseData);

    /// The networking phase failed.
    fn on_networking_failure(&self, error: ServiceError);
}

/// Receives the outcome of a processing-phase request.
///
/// Called with no scheduler lock held.
pub trait ProcessingObserver: Send + Sync {
    /// The processing phase finished.
    fn on_processing_complete(&self);

    /// The processing phase failed.
    fn on_processing_failure(&self, error: ServiceError);
}

type NetworkingBody = Box<dyn FnOnce() -> BoxFuture<'static, Result<PhaseData, ServiceError>> + Send>;
type ProcessingBody = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), ServiceError>> + Send>;

/// Networking-phase work item: fetches or produces a payload.
pub struct NetworkingPrioritizable {
    identifier: Identifier,
    body: Option<NetworkingBody>,
    observer: Arc<dyn NetworkingObserver>,
    outcome: Option<Result<PhaseData, ServiceError>>,
}

impl NetworkingPrioritizable {
    /// Creates a work item around an async body.
    ///
    /// The body runs at most once, on a networking worker.
    pub fn new<F, Fut>(
        identifier: Identifier,
        observer: Arc<dyn NetworkingObserver>,
        body: F,
    ) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<PhaseData, ServiceError>> + Send + 'static,
    {
        let body = move || -> BoxFuture<'static, Result<PhaseData, ServiceError>> {
            Box::pin(body())
        };
        Self {
            identifier,
            body: Some(Box::new(body)),
            observer,
            outcome: None,
        }
    }

    /// The observer the creator registered for this work item.
    pub fn observer(&self) -> Arc<dyn NetworkingObserver> {
        Arc::clone(&self.observer)
    }

    /// Consumes the work item, yielding the recorded outcome.
    pub fn into_outcome(self) -> Result<PhaseData, ServiceError> {
        self.outcome
            .unwrap_or_else(|| Err(ServiceError::internal("networking phase never ran")))
    }
}

impl Prioritizable for NetworkingPrioritizable {
    fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    fn execute(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let outcome = match self.body.take() {
                Some(body) => body().await,
                None => Err(ServiceError::internal("networking body already consumed")),
            };
            self.outcome = Some(outcome);
        })
    }

    fn record_failure(&mut self, message: String) {
        self.outcome = Some(Err(ServiceError::internal(message)));
    }
}

impl fmt::Debug for NetworkingPrioritizable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkingPrioritizable")
            .field("identifier", &self.identifier)
            .field("ran", &self.outcome.is_some())
            .finish_non_exhaustive()
    }
}

/// Processing-phase work item: consumes a payload already fetched.
pub struct ProcessingPrioritizable {
    identifier: Identifier,
    body: Option<ProcessingBody>,
    observer: Arc<dyn ProcessingObserver>,
    outcome: Option<Result<(), ServiceError>>,
}

impl ProcessingPrioritizable {
    /// Creates a work item around an async body.
    ///
    /// The body runs at most once, on a processing worker.
    pub fn new<F, Fut>(
        identifier: Identifier,
        observer: Arc<dyn ProcessingObserver>,
        body: F,
    ) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ServiceError>> + Send + 'static,
    {
        let body = move || -> BoxFuture<'static, Result<(), ServiceError>> { Box::pin(body()) };
        Self {
            identifier,
            body: Some(Box::new(body)),
            observer,
            outcome: None,
        }
    }

    /// The observer the creator registered for this work item.
    pub fn observer(&self) -> Arc<dyn ProcessingObserver> {
        Arc::clone(&self.observer)
    }

    /// Consumes the work item, yielding the recorded outcome.
    pub fn into_outcome(self) -> Result<(), ServiceError> {
        self.outcome
            .unwrap_or_else(|| Err(ServiceError::internal("processing phase never ran")))
    }
}

impl Prioritizable for ProcessingPrioritizable {
    fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    fn execute(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let outcome = match self.body.take() {
                Some(body) => body().await,
                None => Err(ServiceError::internal("processing body already consumed")),
            };
            self.outcome = Some(outcome);
        })
    }

    fn record_failure(&mut self, message: String) {
        self.outcome = Some(Err(ServiceError::internal(message)));
    }
}

impl fmt::Debug for ProcessingPrioritizable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingPrioritizable")
            .field("identifier", &self.identifier)
            .field("ran", &self.outcome.is_some())
            .finish_non_exhaustive()
    }
}

/// A networking work item wrapped for queueing.
pub type NetworkingRequest = PrioritizableRequest<NetworkingPrioritizable>;

/// A processing work item wrapped for queueing.
pub type ProcessingRequest = PrioritizableRequest<ProcessingPrioritizable>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Priority;
    use futures::executor::block_on;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct SilentNetworking;

    impl NetworkingObserver for SilentNetworking {
        fn on_networking_complete(&self, _data: PhaseData) {}
        fn on_networking_failure(&self, _error: ServiceError) {}
    }

    #[derive(Default)]
    struct SilentProcessing;

    impl ProcessingObserver for SilentProcessing {
        fn on_processing_complete(&self) {}
        fn on_processing_failure(&self, _error: ServiceError) {}
    }

    #[test]
    fn test_networking_body_outcome_is_recorded() {
        let work = NetworkingPrioritizable::new(
            Identifier::from("fetch"),
            Arc::new(SilentNetworking),
            || async { Ok(phase_data(String::from("payload"))) },
        );
        let mut request = PrioritizableRequest::new(work, Priority::Normal);
        block_on(request.run());

        let data = request
            .into_inner()
            .into_outcome()
            .and_then(|data| {
                data.downcast::<String>()
                    .map_err(|_| ServiceError::payload_mismatch("expected String"))
            })
            .map(|data| data.as_str().to_owned());
        assert_eq!(data.as_deref(), Ok("payload"));
    }

    #[test]
    fn test_networking_failure_is_recorded() {
        let work = NetworkingPrioritizable::new(
            Identifier::from("fetch"),
            Arc::new(SilentNetworking),
            || async { Err(ServiceError::new(502, "upstream refused")) },
        );
        let mut request = PrioritizableRequest::new(work, Priority::Normal);
        block_on(request.run());

        let outcome = request.into_inner().into_outcome().map(|_| ());
        assert_eq!(outcome, Err(ServiceError::new(502, "upstream refused")));
    }

    #[test]
    fn test_record_failure_overrides_outcome() {
        let mut work = NetworkingPrioritizable::new(
            Identifier::from("fetch"),
            Arc::new(SilentNetworking),
            || async { Ok(phase_data(7u32)) },
        );
        work.record_failure(String::from("worker panicked"));

        let outcome = work.into_outcome().map(|_| ());
        assert_eq!(outcome, Err(ServiceError::internal("worker panicked")));
    }

    #[test]
    fn test_unrun_work_reports_internal_failure() {
        let work = ProcessingPrioritizable::new(
            Identifier::from("process"),
            Arc::new(SilentProcessing),
            || async { Ok(()) },
        );
        let outcome = work.into_outcome();
        assert!(outcome.is_err());
        assert_eq!(
            outcome.map_err(|e| e.code()),
            Err(ServiceError::INTERNAL)
        );
    }

    #[test]
    fn test_processing_body_runs_once() {
        let calls = Arc::new(Mutex::new(0u32));
        let seen = Arc::clone(&calls);
        let work = ProcessingPrioritizable::new(
            Identifier::from("process"),
            Arc::new(SilentProcessing),
            move || async move {
                *seen.lock() += 1;
                Ok(())
            },
        );
        let mut request = PrioritizableRequest::new(work, Priority::High);
        block_on(request.run());

        assert_eq!(*calls.lock(), 1);
        assert_eq!(request.into_inner().into_outcome(), Ok(()));
    }

    #[test]
    fn test_observer_handle_is_shared() {
        let observer: Arc<SilentNetworking> = Arc::new(SilentNetworking);
        let work = NetworkingPrioritizable::new(
            Identifier::from("fetch"),
            observer.clone(),
            || async { Ok(phase_data(())) },
        );
        assert!(Arc::ptr_eq(
            &(observer as Arc<dyn NetworkingObserver>),
            &work.observer()
        ));
    }
}
