//! JSON export: one document per test class

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use loadgauge_core::{EvaluationContext, ReportSink};
use serde_json::{json, Value};

use crate::error::{ReportError, ReportResult};

/// Writes `<dir>/<group>.json` for every reported class
#[derive(Debug, Clone)]
pub struct JsonReportSink {
    output_dir: PathBuf,
}

impl JsonReportSink {
    /// Create a sink writing into `output_dir` (created on first report)
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Directory reports are written to
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path of the report for a class
    pub fn report_path(&self, group: &str) -> PathBuf {
        let file_name: String = group
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
            .collect();
        self.output_dir.join(format!("{file_name}.json"))
    }

    fn write(&self, contexts: &BTreeMap<String, Arc<EvaluationContext>>) -> ReportResult<PathBuf> {
        let group = single_group(contexts)?;
        let path = self.report_path(group);

        fs::create_dir_all(&self.output_dir)?;
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(writer, &class_report(group, contexts))?;

        Ok(path)
    }
}

impl ReportSink for JsonReportSink {
    fn name(&self) -> &str {
        "json"
    }

    fn generate_report(
        &self,
        contexts: &BTreeMap<String, Arc<EvaluationContext>>,
    ) -> loadgauge_core::Result<()> {
        let path = self.write(contexts)?;
        tracing::info!(path = %path.display(), tests = contexts.len(), "JSON report written");
        Ok(())
    }
}

/// JSON document for one class
pub fn class_report(group: &str, contexts: &BTreeMap<String, Arc<EvaluationContext>>) -> Value {
    let tests: Vec<Value> = contexts
        .iter()
        .map(|(name, context)| test_report(name, context))
        .collect();
    let passed = contexts.values().all(|c| c.passed());

    json!({
        "group": group,
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "passed": passed,
        "tests": tests,
    })
}

fn test_report(name: &str, context: &EvaluationContext) -> Value {
    json!({
        "name": name,
        "created_at": context.created_at().to_rfc3339(),
        "measurements_start_time_ms": context.measurements_start_time_ms(),
        "is_async_evaluation": context.is_async_evaluation(),
        "passed": context.passed(),
        "config": context.config(),
        "statistics": context.statistics(),
        "run_summary": context.run_summary(),
        "violations": context.violations(),
    })
}

fn single_group(contexts: &BTreeMap<String, Arc<EvaluationContext>>) -> ReportResult<&str> {
    let mut groups = contexts.values().map(|c| c.group());
    let first = groups
        .next()
        .ok_or_else(|| ReportError::InvalidInput("no contexts to report".into()))?;

    if let Some(other) = groups.find(|g| *g != first) {
        return Err(ReportError::InvalidInput(format!(
            "contexts from more than one class: '{first}' and '{other}'"
        )));
    }
    Ok(first)
}
