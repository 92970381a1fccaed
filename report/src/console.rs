//! Plain-text report: one table per class

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use loadgauge_core::{EvaluationContext, ReportSink};

const WIDTH: usize = 70;

/// Prints a summary table for each class
///
/// Writes to stdout by default; any writer can be plugged in.
pub struct ConsoleReportSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleReportSink {
    /// Sink printing to stdout
    pub fn stdout() -> Self {
        Self::with_writer(io::stdout())
    }

    /// Sink printing to the given writer
    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    /// Render the table for one class
    pub fn render(contexts: &BTreeMap<String, Arc<EvaluationContext>>) -> String {
        let mut out = String::new();
        let group = contexts.values().next().map_or("", |c| c.group());

        // Writing to a String cannot fail
        let _ = writeln!(out, "{}", "=".repeat(WIDTH));
        let _ = writeln!(out, "   {group}");
        let _ = writeln!(out, "{}", "=".repeat(WIDTH));
        let _ = writeln!(
            out,
            "{:<24} {:>8} {:>8} {:>10} {:>8} {:>8}",
            "test", "total", "err %", "tput/s", "p50 ms", "p99 ms"
        );
        let _ = writeln!(out, "{}", "-".repeat(WIDTH));

        for (name, context) in contexts {
            let Some(stats) = context.statistics() else {
                let _ = writeln!(out, "{:<24} (not evaluated)", truncate(name, 24));
                continue;
            };
            let percentile = |p| {
                stats
                    .latency_percentile(p)
                    .map_or_else(|| "-".to_string(), |ms| format!("{ms:.2}"))
            };
            let _ = writeln!(
                out,
                "{:<24} {:>8} {:>8.2} {:>10.1} {:>8} {:>8}  {}",
                truncate(name, 24),
                stats.total_count,
                stats.error_percentage,
                stats.throughput,
                percentile(50),
                percentile(99),
                if context.passed() { "PASS" } else { "FAIL" }
            );
            for violation in context.violations() {
                let _ = writeln!(out, "    ✗ {violation}");
            }
        }

        let _ = writeln!(out, "{}", "=".repeat(WIDTH));
        out
    }
}

impl Default for ConsoleReportSink {
    fn default() -> Self {
        Self::stdout()
    }
}

impl ReportSink for ConsoleReportSink {
    fn name(&self) -> &str {
        "console"
    }

    fn generate_report(
        &self,
        contexts: &BTreeMap<String, Arc<EvaluationContext>>,
    ) -> loadgauge_core::Result<()> {
        let table = Self::render(contexts);
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(table.as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for ConsoleReportSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleReportSink").finish_non_exhaustive()
    }
}

fn truncate(name: &str, max: usize) -> String {
    if name.chars().count() <= max {
        name.to_string()
    } else {
        let kept: String = name.chars().take(max - 1).collect();
        format!("{kept}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadgauge_core::EvaluationConfig;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn unfinalized(name: &str) -> BTreeMap<String, Arc<EvaluationContext>> {
        let context = EvaluationContext::new(name, "OrderTests", EvaluationConfig::default(), false);
        BTreeMap::from([(name.to_string(), Arc::new(context))])
    }

    #[test]
    fn test_render_lists_every_test() {
        let table = ConsoleReportSink::render(&unfinalized("create_order"));
        assert!(table.contains("OrderTests"));
        assert!(table.contains("create_order"));
        assert!(table.contains("(not evaluated)"));
    }

    #[test]
    fn test_writes_to_custom_writer() {
        let buffer = SharedBuffer::default();
        let sink = ConsoleReportSink::with_writer(buffer.clone());

        sink.generate_report(&unfinalized("cancel_order")).unwrap();

        let written = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(written.contains("cancel_order"));
        assert_eq!(sink.name(), "console");
    }

    #[test]
    fn test_truncate_long_names() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a_very_long_test_name", 8).chars().count(), 8);
    }
}
