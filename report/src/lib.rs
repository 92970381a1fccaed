//! Report sinks for finalized evaluation contexts
//!
//! This crate provides [`ReportSink`](loadgauge_core::ReportSink)
//! implementations for:
//!
//! - Plain-text tables on stdout or any writer
//! - One JSON document per test class

#![warn(missing_docs)]
#![warn(clippy::all)]

mod console;
mod error;
mod json;

pub use console::ConsoleReportSink;
pub use error::{ReportError, ReportResult};
pub use json::{class_report, JsonReportSink};
