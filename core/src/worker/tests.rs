//! Integration tests for the Worker module

use super::*;
use crate::invocation::{CompletionHandle, InvocationError, InvocationHandle};
use crate::statistics::Statistics;
use crate::traits::{CompletionInvocation, Invocation, StatisticsCalculator};

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

// ============================================================================
// Mock Invocation
// ============================================================================

struct MockInvocation {
    delay: Option<Duration>,
    fail_every: Option<usize>,
    counter: AtomicUsize,
}

impl MockInvocation {
    fn new() -> Self {
        Self {
            delay: None,
            fail_every: None,
            counter: AtomicUsize::new(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn with_fail_every(mut self, n: usize) -> Self {
        self.fail_every = Some(n);
        self
    }
}

#[async_trait]
impl Invocation for MockInvocation {
    async fn invoke(&self) -> Result<(), InvocationError> {
        let count = self.counter.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(fail_every) = self.fail_every {
            if count % fail_every == 0 {
                return Err(InvocationError::failed("Simulated failure"));
            }
        }

        Ok(())
    }
}

/// Completion-style body that holds its handle and never signals
struct NeverCompletes;

#[async_trait]
impl CompletionInvocation for NeverCompletes {
    async fn invoke(&self, completion: CompletionHandle) {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            drop(completion);
        });
    }
}

// ============================================================================
// Mock StatisticsCalculator
// ============================================================================

#[derive(Default)]
struct RecordingStatistics {
    samples: Mutex<Vec<(Duration, bool)>>,
}

impl RecordingStatistics {
    fn samples(&self) -> Vec<(Duration, bool)> {
        self.samples.lock().unwrap().clone()
    }
}

impl StatisticsCalculator for RecordingStatistics {
    fn record(&self, latency: Duration, is_error: bool) {
        self.samples.lock().unwrap().push((latency, is_error));
    }

    fn snapshot(&self, _measured: Duration, _percentiles: &[u8]) -> Statistics {
        Statistics::default()
    }

    fn reset(&self) {
        self.samples.lock().unwrap().clear();
    }
}

// ============================================================================
// Helper functions
// ============================================================================

fn create_test_worker(
    invocation: InvocationHandle,
    statistics: Arc<RecordingStatistics>,
    window: MeasurementWindow,
) -> (Worker, broadcast::Sender<()>) {
    let (shutdown_tx, _) = broadcast::channel(1);

    let worker = WorkerBuilder::new(0)
        .invocation(invocation)
        .statistics(statistics)
        .window(window)
        .build()
        .expect("Failed to build worker");

    (worker, shutdown_tx)
}

fn window_from_now(warm_up_ms: u64, duration_ms: u64) -> MeasurementWindow {
    MeasurementWindow::new(
        Instant::now(),
        Duration::from_millis(warm_up_ms),
        Duration::from_millis(duration_ms),
    )
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_builder_missing_invocation() {
    let result = WorkerBuilder::new(0)
        .statistics(Arc::new(RecordingStatistics::default()))
        .window(window_from_now(0, 10))
        .build();
    assert!(result.is_err());
}

#[test]
fn test_builder_missing_window() {
    let result = WorkerBuilder::new(0)
        .invocation(InvocationHandle::direct(MockInvocation::new()))
        .statistics(Arc::new(RecordingStatistics::default()))
        .build();
    assert!(result.is_err());
}

#[tokio::test]
async fn test_worker_runs_until_deadline() {
    let statistics = Arc::new(RecordingStatistics::default());
    let invocation =
        InvocationHandle::direct(MockInvocation::new().with_delay(Duration::from_millis(10)));
    let (worker, shutdown_tx) =
        create_test_worker(invocation, Arc::clone(&statistics), window_from_now(0, 100));

    let start = Instant::now();
    let stats = worker.run(shutdown_tx.subscribe()).await;
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(400));
    assert!(stats.completed > 0);
    assert_eq!(stats.errors, 0);
    assert_eq!(statistics.samples().len(), stats.measured());
}

#[tokio::test]
async fn test_worker_records_errors_and_keeps_going() {
    let statistics = Arc::new(RecordingStatistics::default());
    let invocation = InvocationHandle::direct(
        MockInvocation::new()
            .with_delay(Duration::from_millis(2))
            .with_fail_every(2),
    );
    let (worker, shutdown_tx) =
        create_test_worker(invocation, Arc::clone(&statistics), window_from_now(0, 100));

    let stats = worker.run(shutdown_tx.subscribe()).await;

    assert!(stats.completed > 0);
    assert!(stats.errors > 0);
    let recorded_errors = statistics.samples().iter().filter(|(_, e)| *e).count();
    assert_eq!(recorded_errors, stats.errors);
}

#[tokio::test]
async fn test_worker_discards_warm_up_samples() {
    let statistics = Arc::new(RecordingStatistics::default());
    let invocation =
        InvocationHandle::direct(MockInvocation::new().with_delay(Duration::from_millis(5)));
    let (worker, shutdown_tx) =
        create_test_worker(invocation, Arc::clone(&statistics), window_from_now(50, 100));

    let stats = worker.run(shutdown_tx.subscribe()).await;

    assert!(stats.warm_up_discarded > 0);
    assert!(stats.completed > 0);
    // only measured samples reach the calculator
    assert_eq!(statistics.samples().len(), stats.measured());
}

#[tokio::test]
async fn test_worker_discards_late_samples() {
    let statistics = Arc::new(RecordingStatistics::default());
    // each invocation overruns the 30ms window
    let invocation =
        InvocationHandle::direct(MockInvocation::new().with_delay(Duration::from_millis(60)));
    let (worker, shutdown_tx) =
        create_test_worker(invocation, Arc::clone(&statistics), window_from_now(0, 30));

    let stats = worker.run(shutdown_tx.subscribe()).await;

    assert_eq!(stats.late_discarded, 1);
    assert_eq!(stats.measured(), 0);
    assert!(statistics.samples().is_empty());
}

#[tokio::test]
async fn test_worker_run_shutdown() {
    let statistics = Arc::new(RecordingStatistics::default());
    let invocation =
        InvocationHandle::direct(MockInvocation::new().with_delay(Duration::from_millis(20)));
    let (worker, shutdown_tx) =
        create_test_worker(invocation, statistics, window_from_now(0, 60_000));

    let shutdown_rx = shutdown_tx.subscribe();
    let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(()).expect("Failed to send shutdown");

    let stats = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("Worker did not stop")
        .expect("Worker task panicked");

    assert!(stats.completed >= 1);
}

#[tokio::test]
async fn test_worker_with_rate_limit() {
    let statistics = Arc::new(RecordingStatistics::default());
    let (shutdown_tx, _) = broadcast::channel(1);

    let worker = WorkerBuilder::new(0)
        .invocation(InvocationHandle::direct(MockInvocation::new()))
        .statistics(statistics.clone())
        .rate_controller(Arc::new(RateController::new(100)))
        .window(window_from_now(0, 200))
        .build()
        .expect("Failed to build worker");

    let stats = worker.run(shutdown_tx.subscribe()).await;

    // 100/s over 200ms = 20, plus a 10-permit burst
    assert!(stats.completed <= 33, "completed {}", stats.completed);
    assert!(stats.completed >= 10, "completed {}", stats.completed);
}

#[tokio::test]
async fn test_worker_invocation_timeout_counts_as_error() {
    let statistics = Arc::new(RecordingStatistics::default());
    let (shutdown_tx, _) = broadcast::channel(1);

    let worker = WorkerBuilder::new(0)
        .invocation(InvocationHandle::direct(
            MockInvocation::new().with_delay(Duration::from_secs(10)),
        ))
        .statistics(statistics.clone())
        .window(window_from_now(0, 200))
        .invocation_timeout(Some(Duration::from_millis(30)))
        .build()
        .expect("Failed to build worker");

    let stats = worker.run(shutdown_tx.subscribe()).await;

    assert_eq!(stats.completed, 0);
    assert!(stats.errors >= 3);
    assert!(statistics.samples().iter().all(|(_, is_error)| *is_error));
}

#[tokio::test]
async fn test_timeout_cut_by_deadline_is_measured_error() {
    let statistics = Arc::new(RecordingStatistics::default());
    let (shutdown_tx, _) = broadcast::channel(1);

    let worker = WorkerBuilder::new(0)
        .invocation(InvocationHandle::completion(NeverCompletes))
        .statistics(statistics.clone())
        .window(window_from_now(0, 60))
        .invocation_timeout(Some(Duration::from_secs(10)))
        .build()
        .expect("Failed to build worker");

    let start = Instant::now();
    let stats = worker.run(shutdown_tx.subscribe()).await;

    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.late_discarded, 0);
    assert_eq!(statistics.samples().len(), 1);
    assert!(statistics.samples()[0].1);
}

#[test]
fn test_worker_debug_format() {
    let (worker, _) = create_test_worker(
        InvocationHandle::blocking(|| Ok(())),
        Arc::new(RecordingStatistics::default()),
        window_from_now(0, 10),
    );
    let debug = format!("{:?}", worker);
    assert!(debug.contains("Worker"));
    assert!(debug.contains("Blocking"));
    assert_eq!(worker.id(), 0);
}
