//! Scheduler for the evaluation lifecycle
//!
//! The EvaluationScheduler drives one performance evaluation of a test body:
//! - Spawning `threads` worker tasks that share a rate controller
//! - Waiting out the warm-up and publishing the measurement start
//! - Stopping workers at the deadline via a broadcast channel
//! - Draining in-flight invocations, then aborting stragglers
//! - Snapshotting statistics and checking thresholds
//!
//! # Example
//!
//! ```ignore
//! use loadgauge_core::{EvaluationConfig, InvocationHandle, SchedulerBuilder};
//!
//! let scheduler = SchedulerBuilder::new("checkout")
//!     .group("OrderTests")
//!     .config(EvaluationConfig::new(4).with_duration_ms(5_000))
//!     .build()?;
//!
//! let context = scheduler.evaluate(InvocationHandle::from_fn(|| async { Ok(()) })).await?;
//! context.verdict()?;
//! ```

mod aggregator;
mod builder;
mod executor;

pub use aggregator::{aggregate_worker_stats, RunSummary};
pub use builder::SchedulerBuilder;
pub use executor::EvaluationScheduler;
