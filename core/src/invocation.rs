//! Invocation handles and out-of-band completion signaling

use crate::traits::{CompletionInvocation, Invocation};
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Why a single invocation counted as an error sample
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvocationError {
    /// The test body reported a failure
    #[error("invocation failed: {0}")]
    Failed(String),

    /// The invocation did not finish within the per-invocation timeout
    #[error("invocation timed out after {0:?}")]
    TimedOut(Duration),

    /// The test body panicked
    #[error("invocation panicked: {0}")]
    Panicked(String),

    /// The completion handle was dropped without a signal
    #[error("completion handle dropped without a signal")]
    Abandoned,
}

impl InvocationError {
    /// Create a failure from any displayable reason
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        InvocationError::Failed(reason.to_string())
    }
}

/// Completion signal sent through a [`CompletionHandle`]
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// The invocation succeeded, optionally with its own latency measurement
    Success {
        /// Overrides the latency measured by the worker
        latency: Option<Duration>,
    },
    /// The invocation failed
    Failure(String),
}

/// Handle given to a [`CompletionInvocation`] to end the invocation
///
/// Consumed by the first signal. Dropping it unsignaled counts as an error.
#[derive(Debug)]
pub struct CompletionHandle {
    tx: oneshot::Sender<Completion>,
    started: Instant,
}

impl CompletionHandle {
    pub(crate) fn new(tx: oneshot::Sender<Completion>) -> Self {
        Self {
            tx,
            started: Instant::now(),
        }
    }

    /// Create a detached handle and the receiver its signal arrives on
    pub fn channel() -> (Self, oneshot::Receiver<Completion>) {
        let (tx, rx) = oneshot::channel();
        (Self::new(tx), rx)
    }

    /// Time since the invocation started
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Signal success, using the worker's latency measurement
    pub fn complete(self) {
        let _ = self.tx.send(Completion::Success { latency: None });
    }

    /// Signal success with an explicit latency
    pub fn complete_with_latency(self, latency: Duration) {
        let _ = self.tx.send(Completion::Success {
            latency: Some(latency),
        });
    }

    /// Signal failure
    pub fn fail(self, reason: impl Into<String>) {
        let _ = self.tx.send(Completion::Failure(reason.into()));
    }
}

/// Result of running one invocation
#[derive(Debug, Clone)]
pub struct Outcome {
    /// Latency to record for the sample
    pub latency: Duration,
    /// Whether the invocation succeeded
    pub result: Result<(), InvocationError>,
}

impl Outcome {
    /// Whether this outcome is an error sample
    pub fn is_error(&self) -> bool {
        self.result.is_err()
    }
}

type BlockingFn = dyn Fn() -> Result<(), InvocationError> + Send + Sync;

/// The test body handed to the scheduler by the host
#[derive(Clone)]
pub enum InvocationHandle {
    /// Async body; completion = the future resolving
    Direct(Arc<dyn Invocation>),
    /// Synchronous body, run on the blocking pool
    Blocking(Arc<BlockingFn>),
    /// Body that signals completion through a [`CompletionHandle`]
    Completion(Arc<dyn CompletionInvocation>),
}

impl InvocationHandle {
    /// Wrap an [`Invocation`]
    pub fn direct(invocation: impl Invocation + 'static) -> Self {
        InvocationHandle::Direct(Arc::new(invocation))
    }

    /// Wrap an async closure
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), InvocationError>> + Send + 'static,
    {
        InvocationHandle::Direct(Arc::new(FnInvocation(f)))
    }

    /// Wrap a synchronous closure
    pub fn blocking<F>(f: F) -> Self
    where
        F: Fn() -> Result<(), InvocationError> + Send + Sync + 'static,
    {
        InvocationHandle::Blocking(Arc::new(f))
    }

    /// Wrap a [`CompletionInvocation`]
    pub fn completion(invocation: impl CompletionInvocation + 'static) -> Self {
        InvocationHandle::Completion(Arc::new(invocation))
    }

    /// Whether completion is signaled out of band
    pub fn is_async(&self) -> bool {
        matches!(self, InvocationHandle::Completion(_))
    }

    /// Run the body once, swallowing failures, panics and timeouts into the outcome
    pub async fn execute(&self, timeout: Option<Duration>) -> Outcome {
        let start = Instant::now();

        let (result, latency_override) = match self {
            InvocationHandle::Direct(invocation) => {
                let run = AssertUnwindSafe(invocation.invoke())
                    .catch_unwind()
                    .map(|r| r.unwrap_or_else(|panic| Err(panicked(panic))));
                (with_timeout(timeout, run).await, None)
            }
            InvocationHandle::Blocking(f) => {
                let f = Arc::clone(f);
                let run = tokio::task::spawn_blocking(move || f()).map(|joined| match joined {
                    Ok(result) => result,
                    Err(e) if e.is_panic() => Err(panicked(e.into_panic())),
                    Err(e) => Err(InvocationError::failed(e)),
                });
                (with_timeout(timeout, run).await, None)
            }
            InvocationHandle::Completion(invocation) => {
                let (handle, rx) = CompletionHandle::channel();
                let run = async move {
                    if let Err(panic) = AssertUnwindSafe(invocation.invoke(handle))
                        .catch_unwind()
                        .await
                    {
                        return Err(panicked(panic));
                    }
                    match rx.await {
                        Ok(Completion::Success { latency }) => Ok(latency),
                        Ok(Completion::Failure(reason)) => Err(InvocationError::Failed(reason)),
                        Err(_) => Err(InvocationError::Abandoned),
                    }
                };
                match with_timeout(timeout, run).await {
                    Ok(latency) => (Ok(()), latency),
                    Err(e) => (Err(e), None),
                }
            }
        };

        Outcome {
            latency: latency_override.unwrap_or_else(|| start.elapsed()),
            result,
        }
    }
}

impl std::fmt::Debug for InvocationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            InvocationHandle::Direct(_) => "Direct",
            InvocationHandle::Blocking(_) => "Blocking",
            InvocationHandle::Completion(_) => "Completion",
        };
        f.debug_tuple("InvocationHandle").field(&kind).finish()
    }
}

struct FnInvocation<F>(F);

#[async_trait]
impl<F, Fut> Invocation for FnInvocation<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), InvocationError>> + Send + 'static,
{
    async fn invoke(&self) -> Result<(), InvocationError> {
        (self.0)().await
    }
}

async fn with_timeout<T, Fut>(timeout: Option<Duration>, fut: Fut) -> Result<T, InvocationError>
where
    Fut: Future<Output = Result<T, InvocationError>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or(Err(InvocationError::TimedOut(limit))),
        None => fut.await,
    }
}

fn panicked(payload: Box<dyn Any + Send>) -> InvocationError {
    let msg = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    InvocationError::Panicked(msg)
}
