//! Rate limiting for invocation execution

use governor::{
    clock::DefaultClock, state::InMemoryState, state::NotKeyed, Jitter, Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::time::{Duration, Instant};

/// Upper bound of the random delay added to each admission
///
/// Spreads waiters that computed the same ready time so no worker is
/// systematically first.
const ADMISSION_JITTER: Duration = Duration::from_micros(200);

/// Global invocation rate ceiling, GCRA token bucket via the governor crate
///
/// One instance is shared by every worker of an evaluation through `Arc`, so
/// the ceiling applies to the aggregate rate, not per worker. The burst is
/// capped at a tenth of a second's worth of permits, which keeps the count
/// over any window within about 10% of `rate * window`.
pub struct RateController {
    limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    max_per_second: u32,
}

impl RateController {
    /// Create a rate controller
    ///
    /// # Arguments
    /// * `max_per_second` - Aggregate invocations per second. 0 disables rate limiting.
    ///
    /// # Examples
    /// ```
    /// use loadgauge_core::RateController;
    ///
    /// let limited = RateController::new(1_000);
    /// assert!(limited.is_enabled());
    ///
    /// let unlimited = RateController::new(0);
    /// assert!(!unlimited.is_enabled());
    /// ```
    pub fn new(max_per_second: u32) -> Self {
        let limiter = NonZeroU32::new(max_per_second).and_then(|rate| {
            let burst = NonZeroU32::new((max_per_second / 10).max(1))?;
            Some(RateLimiter::direct(Quota::per_second(rate).allow_burst(burst)))
        });

        Self {
            limiter,
            max_per_second,
        }
    }

    /// Create an unlimited controller (never blocks)
    pub fn unlimited() -> Self {
        Self::new(0)
    }

    /// Wait until an invocation is permitted
    pub async fn acquire(&self) {
        if let Some(ref limiter) = self.limiter {
            limiter
                .until_ready_with_jitter(Jitter::up_to(ADMISSION_JITTER))
                .await;
        }
    }

    /// Wait until an invocation is permitted or the deadline passes
    ///
    /// Returns `true` if a permit was obtained before `deadline`, `false`
    /// otherwise. Never blocks past the deadline.
    pub async fn acquire_until(&self, deadline: Instant) -> bool {
        if Instant::now() >= deadline {
            return false;
        }
        if !self.is_enabled() {
            return true;
        }
        tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), self.acquire())
            .await
            .is_ok()
    }

    /// Try to acquire a permit without waiting
    ///
    /// Always returns `true` if no rate limit is configured.
    pub fn try_acquire(&self) -> bool {
        match &self.limiter {
            Some(limiter) => limiter.check().is_ok(),
            None => true,
        }
    }

    /// Check if rate limiting is enabled
    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }

    /// Configured ceiling (0 = unbounded)
    pub fn max_per_second(&self) -> u32 {
        self.max_per_second
    }
}

impl Default for RateController {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl std::fmt::Debug for RateController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateController")
            .field("max_per_second", &self.max_per_second)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_rate_controller_disabled() {
        let controller = RateController::new(0);
        assert!(!controller.is_enabled());
        assert_eq!(controller.max_per_second(), 0);
        assert!(controller.try_acquire());
    }

    #[test]
    fn test_rate_controller_enabled() {
        let controller = RateController::new(100);
        assert!(controller.is_enabled());
        assert_eq!(controller.max_per_second(), 100);
    }

    #[test]
    fn test_rate_controller_default() {
        assert!(!RateController::default().is_enabled());
        assert!(!RateController::unlimited().is_enabled());
    }

    #[test]
    fn test_burst_is_capped() {
        let controller = RateController::new(100);
        let immediate = (0..100).filter(|_| controller.try_acquire()).count();
        // a tenth of a second's worth
        assert!(immediate <= 11, "burst admitted {immediate} permits");
        assert!(immediate >= 1);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_next_permit() {
        // 10/s with a burst of one: the second permit is ~100ms out
        let controller = RateController::new(10);
        controller.acquire().await;

        let start = Instant::now();
        controller.acquire().await;
        let waited = start.elapsed();

        assert!(waited >= Duration::from_millis(80), "waited {waited:?}");
        assert!(waited < Duration::from_millis(500), "waited {waited:?}");
    }

    #[tokio::test]
    async fn test_unlimited_never_blocks() {
        let controller = RateController::unlimited();
        let deadline = Instant::now() + Duration::from_secs(60);
        let start = Instant::now();
        for _ in 0..10_000 {
            assert!(controller.acquire_until(deadline).await);
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_acquire_until_respects_deadline() {
        // one permit per second: the second acquisition cannot happen within 50ms
        let controller = RateController::new(1);
        let deadline = Instant::now() + Duration::from_millis(50);

        assert!(controller.acquire_until(deadline).await);
        let start = Instant::now();
        assert!(!controller.acquire_until(deadline).await);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_acquire_until_past_deadline() {
        let controller = RateController::unlimited();
        assert!(!controller.acquire_until(Instant::now()).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shared_ceiling_across_tasks() {
        let controller = Arc::new(RateController::new(200));
        let admitted = Arc::new(AtomicUsize::new(0));
        let deadline = Instant::now() + Duration::from_millis(500);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let controller = Arc::clone(&controller);
                let admitted = Arc::clone(&admitted);
                tokio::spawn(async move {
                    while controller.acquire_until(deadline).await {
                        admitted.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        // 200/s over 0.5s = 100, plus the 20-permit burst
        let total = admitted.load(Ordering::Relaxed);
        assert!(total <= 125, "admitted {total} permits");
        assert!(total >= 50, "admitted only {total} permits");
    }

    #[test]
    fn test_rate_controller_debug() {
        let debug = format!("{:?}", RateController::new(100));
        assert!(debug.contains("RateController"));
        assert!(debug.contains("100"));
        assert!(debug.contains("true"));
    }
}
