//! Integration tests for the coalescing request executor.
//!
//! These tests verify the complete request workflow including:
//! - One execution shared by concurrent submissions of an identifier
//! - Outcome fan-out to every registered observer, success and failure
//! - Independent execution of distinct identifiers
//! - Re-execution after an identifier has been fully released
//! - Processing-phase coalescing and counter bookkeeping

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use twostage::executor::PrioritizableRequest;
use twostage::service::{
    phase_data, NetworkingObserver, NetworkingPrioritizable, NetworkingRequest, PhaseData,
    ProcessingObserver, ProcessingPrioritizable, ProcessingRequest, RequestExecutor,
};
use twostage::{Identifier, Priority, RequestHandler, ServiceError};

// =============================================================================
// Test Helpers
// =============================================================================

/// Observer recording every outcome it is handed.
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl NetworkingObserver for Recorder {
    fn on_networking_complete(&self, data: PhaseData) {
        let text = data
            .downcast::<String>()
            .map(|s| s.as_str().to_owned())
            .unwrap_or_else(|_| String::from("<unexpected>"));
        self.events.lock().push(format!("net-ok:{text}"));
    }

    fn on_networking_failure(&self, error: ServiceError) {
        self.events.lock().push(format!("net-err:{}", error.code()));
    }
}

impl ProcessingObserver for Recorder {
    fn on_processing_complete(&self) {
        self.events.lock().push(String::from("proc-ok"));
    }

    fn on_processing_failure(&self, error: ServiceError) {
        self.events.lock().push(format!("proc-err:{}", error.code()));
    }
}

struct Fetch {
    gate: Option<Arc<Notify>>,
    runs: Arc<AtomicUsize>,
    outcome: Result<String, ServiceError>,
}

impl Fetch {
    fn ok(runs: &Arc<AtomicUsize>) -> Self {
        Self {
            gate: None,
            runs: Arc::clone(runs),
            outcome: Ok(String::from("payload")),
        }
    }

    fn failing(runs: &Arc<AtomicUsize>, code: i32) -> Self {
        Self {
            outcome: Err(ServiceError::new(code, "upstream refused")),
            ..Self::ok(runs)
        }
    }

    fn gated(mut self, gate: &Arc<Notify>) -> Self {
        self.gate = Some(Arc::clone(gate));
        self
    }

    fn request(self, name: &str, recorder: &Arc<Recorder>) -> NetworkingRequest {
        let Fetch {
            gate,
            runs,
            outcome,
        } = self;
        let work = NetworkingPrioritizable::new(
            Identifier::from(name),
            Arc::clone(recorder) as Arc<dyn NetworkingObserver>,
            move || async move {
                if let Some(gate) = &gate {
                    gate.notified().await;
                }
                runs.fetch_add(1, Ordering::SeqCst);
                outcome.map(phase_data)
            },
        );
        PrioritizableRequest::new(work, Priority::Normal)
    }
}

fn process(name: &str, recorder: &Arc<Recorder>, runs: &Arc<AtomicUsize>) -> ProcessingRequest {
    let runs = Arc::clone(runs);
    let work = ProcessingPrioritizable::new(
        Identifier::from(name),
        Arc::clone(recorder) as Arc<dyn ProcessingObserver>,
        move || async move {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    );
    PrioritizableRequest::new(work, Priority::Normal)
}

async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

// =============================================================================
// Integration Tests
// =============================================================================

#[tokio::test]
async fn test_concurrent_submissions_share_one_execution() {
    let executor = RequestExecutor::new();
    let runs = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Notify::new());

    let first = Arc::new(Recorder::default());
    let second = Arc::new(Recorder::default());
    let third = Arc::new(Recorder::default());

    executor.execute_networking_request(Fetch::ok(&runs).gated(&gate).request("tile", &first));
    executor.execute_networking_request(Fetch::ok(&runs).request("tile", &second));
    executor.execute_networking_request(Fetch::ok(&runs).request("tile", &third));

    wait_for("execution to start", || {
        executor.network_stats().active == 1
    })
    .await;
    gate.notify_one();

    wait_for("all waiters to hear the outcome", || {
        !first.events().is_empty() && !second.events().is_empty() && !third.events().is_empty()
    })
    .await;

    assert_eq!(first.events(), vec!["net-ok:payload"]);
    assert_eq!(second.events(), vec!["net-ok:payload"]);
    assert_eq!(third.events(), vec!["net-ok:payload"]);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let stats = executor.stats();
    assert_eq!(stats.submissions, 3);
    assert_eq!(stats.coalesced, 2);
    assert_eq!(stats.executions, 1);
}

#[tokio::test]
async fn test_failure_fans_out_to_all_waiters() {
    let executor = RequestExecutor::new();
    let runs = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Notify::new());

    let first = Arc::new(Recorder::default());
    let second = Arc::new(Recorder::default());

    executor.execute_networking_request(
        Fetch::failing(&runs, 502).gated(&gate).request("tile", &first),
    );
    executor.execute_networking_request(Fetch::failing(&runs, 502).request("tile", &second));

    wait_for("execution to start", || {
        executor.network_stats().active == 1
    })
    .await;
    gate.notify_one();

    wait_for("both waiters to hear the failure", || {
        !first.events().is_empty() && !second.events().is_empty()
    })
    .await;

    assert_eq!(first.events(), vec!["net-err:502"]);
    assert_eq!(second.events(), vec!["net-err:502"]);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_distinct_identifiers_run_independently() {
    let executor = RequestExecutor::new();
    let runs = Arc::new(AtomicUsize::new(0));

    let first = Arc::new(Recorder::default());
    let second = Arc::new(Recorder::default());

    executor.execute_networking_request(Fetch::ok(&runs).request("tile/1", &first));
    executor.execute_networking_request(Fetch::ok(&runs).request("tile/2", &second));

    wait_for("both executions to finish", || {
        !first.events().is_empty() && !second.events().is_empty()
    })
    .await;

    assert_eq!(runs.load(Ordering::SeqCst), 2);
    let stats = executor.stats();
    assert_eq!(stats.coalesced, 0);
    assert_eq!(stats.executions, 2);
}

#[tokio::test]
async fn test_resubmission_after_release_runs_again() {
    let executor = RequestExecutor::new();
    let runs = Arc::new(AtomicUsize::new(0));
    let recorder = Arc::new(Recorder::default());

    executor.execute_networking_request(Fetch::ok(&runs).request("tile", &recorder));
    wait_for("first round trip", || recorder.events().len() == 1).await;
    wait_for("identifier to be released", || executor.is_idle()).await;

    executor.execute_networking_request(Fetch::ok(&runs).request("tile", &recorder));
    wait_for("second round trip", || recorder.events().len() == 2).await;

    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(recorder.events(), vec!["net-ok:payload", "net-ok:payload"]);
}

#[tokio::test]
async fn test_processing_submissions_coalesce() {
    let executor = RequestExecutor::new();
    let runs = Arc::new(AtomicUsize::new(0));

    let first = Arc::new(Recorder::default());
    let second = Arc::new(Recorder::default());

    executor.execute_processing_request(process("decode", &first, &runs));
    executor.execute_processing_request(process("decode", &second, &runs));

    wait_for("both observers to hear the outcome", || {
        !first.events().is_empty() && !second.events().is_empty()
    })
    .await;

    assert_eq!(first.events(), vec!["proc-ok"]);
    assert_eq!(second.events(), vec!["proc-ok"]);
    // The second submission either coalesced onto the in-flight run or ran
    // after the release; both deliver to both observers.
    assert!(runs.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_request_count_tracks_in_flight_identifiers() {
    let executor = RequestExecutor::new();
    let runs = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Notify::new());
    let recorder = Arc::new(Recorder::default());

    assert!(executor.is_idle());
    assert_eq!(executor.request_count(), 0);

    executor.execute_networking_request(Fetch::ok(&runs).gated(&gate).request("tile", &recorder));
    assert_eq!(executor.request_count(), 1);
    assert!(!executor.is_idle());

    gate.notify_one();
    wait_for("outcome delivery", || recorder.events().len() == 1).await;
    wait_for("executor to go idle", || executor.is_idle()).await;
    assert_eq!(executor.request_count(), 0);
}

#[tokio::test]
async fn test_auto_identifiers_are_unique() {
    let executor = RequestExecutor::new();
    let a = executor.next_auto_identifier();
    let b = executor.next_auto_identifier();
    assert_ne!(a, b);

    // Auto identifiers never collide with caller-supplied string keys.
    assert_ne!(a, Identifier::from("tile"));
}
