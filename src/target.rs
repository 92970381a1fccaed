//! Synthetic test bodies with a fixed latency and failure ratio

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Result};
use async_trait::async_trait;
use loadgauge_core::{CompletionHandle, CompletionInvocation, Invocation, InvocationError, InvocationHandle};
use serde::Deserialize;

/// How the body reports completion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMode {
    /// Async body resolving its future
    #[default]
    Direct,
    /// Synchronous body on the blocking pool
    Blocking,
    /// Body signaling through a completion handle from a spawned task
    Completion,
}

/// `[test.target]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetSpec {
    /// Completion style
    #[serde(default)]
    pub mode: TargetMode,

    /// Time each invocation takes
    #[serde(default)]
    pub latency_ms: u64,

    /// Share of invocations that fail (0.0 - 1.0)
    #[serde(default)]
    pub failure_ratio: f64,
}

impl TargetSpec {
    /// Check the failure ratio
    pub fn validate(&self) -> Result<()> {
        ensure!(
            (0.0..=1.0).contains(&self.failure_ratio),
            "failure_ratio must be within 0..=1, got {}",
            self.failure_ratio
        );
        Ok(())
    }

    /// Build the invocation handle for this target
    pub fn handle(&self) -> InvocationHandle {
        let target = SyntheticTarget::new(
            Duration::from_millis(self.latency_ms),
            self.failure_ratio,
        );

        match self.mode {
            TargetMode::Direct => InvocationHandle::direct(target),
            TargetMode::Completion => InvocationHandle::completion(target),
            TargetMode::Blocking => {
                let target = Arc::new(target);
                InvocationHandle::blocking(move || {
                    std::thread::sleep(target.latency);
                    target.outcome()
                })
            }
        }
    }
}

/// Body that sleeps and then fails a fixed share of its calls
///
/// Failures are spread evenly: call `n` fails when `floor(n * ratio)`
/// increments, so any run of calls fails within one of `ratio * calls`.
#[derive(Debug)]
pub struct SyntheticTarget {
    latency: Duration,
    failure_ratio: f64,
    calls: AtomicU64,
}

impl SyntheticTarget {
    /// Create a target
    pub fn new(latency: Duration, failure_ratio: f64) -> Self {
        Self {
            latency,
            failure_ratio: failure_ratio.clamp(0.0, 1.0),
            calls: AtomicU64::new(0),
        }
    }

    /// Decide the next call's outcome
    fn outcome(&self) -> Result<(), InvocationError> {
        let n = self.calls.fetch_add(1, Ordering::Relaxed);
        let before = (n as f64 * self.failure_ratio).floor();
        let after = ((n + 1) as f64 * self.failure_ratio).floor();

        if after > before {
            Err(InvocationError::failed(format!("synthetic failure on call {}", n + 1)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Invocation for SyntheticTarget {
    async fn invoke(&self) -> Result<(), InvocationError> {
        tokio::time::sleep(self.latency).await;
        self.outcome()
    }
}

#[async_trait]
impl CompletionInvocation for SyntheticTarget {
    async fn invoke(&self, completion: CompletionHandle) {
        let latency = self.latency;
        let outcome = self.outcome();

        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            match outcome {
                Ok(()) => completion.complete(),
                Err(e) => completion.fail(e.to_string()),
            }
        });
    }
}
