//! Worker module for invoking the test body
//!
//! The Worker is the execution unit of an evaluation, responsible for the
//! simple but critical loop: **permit -> invoke -> record -> repeat**.
//!
//! Each Worker is a tokio task that:
//!
//! 1. Acquires a permit from the shared RateController (bounded by the deadline)
//! 2. Invokes the test body, catching failures, panics and timeouts
//! 3. Classifies the sample against the measurement window
//! 4. Records measured samples in the shared StatisticsCalculator
//! 5. Repeats until the deadline or a shutdown signal
//!
//! # Example
//!
//! ```ignore
//! use loadgauge_core::worker::WorkerBuilder;
//!
//! let worker = WorkerBuilder::new(0)
//!     .invocation(invocation)
//!     .statistics(statistics)
//!     .rate_controller(rate_controller)
//!     .window(window)
//!     .build()?;
//!
//! let stats = worker.run(shutdown_rx).await;
//! println!("Completed: {}", stats.completed);
//! ```

mod builder;
mod executor;
mod rate_limiter;
mod stats;
mod window;

pub use builder::WorkerBuilder;
pub use executor::Worker;
pub use rate_limiter::RateController;
pub use stats::WorkerStats;
pub use window::{MeasurementWindow, SamplePhase};

#[cfg(test)]
mod tests;
