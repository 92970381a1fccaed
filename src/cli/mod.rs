//! CLI argument parsing and command dispatch

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loadgauge_core::{ActiveContextRegistry, ReportSink, ReportingConfig, TestClassHarness};
use loadgauge_report::{ConsoleReportSink, JsonReportSink};

use crate::plan::{Plan, ReportingSpec};

/// loadgauge - Concurrent performance checks for individual test bodies
#[derive(Parser, Debug)]
#[command(name = "loadgauge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every test of a plan and report the verdicts
    Run {
        /// Path to the plan file
        #[arg(short, long)]
        config: PathBuf,

        /// Write a JSON report into this directory (overrides the plan)
        #[arg(long)]
        json_dir: Option<PathBuf>,
    },
    /// Validate a plan file without running it
    Validate {
        /// Path to the plan file
        #[arg(short, long)]
        config: PathBuf,
    },
}

impl Cli {
    /// Dispatch the selected command
    pub async fn run(self) -> Result<ExitCode> {
        match self.command {
            Commands::Run { config, json_dir } => {
                let failed = run_plan(&config, json_dir).await?;
                Ok(if failed == 0 {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::FAILURE
                })
            }
            Commands::Validate { config } => {
                let plan = Plan::load(&config)?;
                println!(
                    "✓ {}: {} test(s) in '{}'",
                    config.display(),
                    plan.tests.len(),
                    plan.group
                );
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

/// Run a plan, returning how many tests failed
async fn run_plan(path: &Path, json_dir: Option<PathBuf>) -> Result<usize> {
    let plan = Plan::load(path)?;
    let reporting = reporting_candidates(plan.reporting.as_ref(), json_dir);

    tracing::info!(group = %plan.group, tests = plan.tests.len(), "Running plan");

    let registry = Arc::new(ActiveContextRegistry::new());
    let harness = TestClassHarness::new(plan.group.clone(), Arc::clone(&registry), &reporting)?
        .with_signal_handling(true);

    let mut failed = 0;
    for test in &plan.tests {
        let config = test.evaluation_config()?;
        let outcome = harness
            .run_test(&test.name, config.as_ref(), test.target.handle())
            .await;

        match outcome {
            Ok(Some(context)) => {
                if let Err(e) = context.verdict() {
                    failed += 1;
                    tracing::warn!(test = %test.name, error = %e, "Test failed");
                }
            }
            Ok(None) => tracing::info!(test = %test.name, "Test passed (single execution)"),
            Err(loadgauge_core::Error::Invocation(e)) => {
                failed += 1;
                tracing::warn!(test = %test.name, error = %e, "Test failed");
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to run test '{}'", test.name));
            }
        }
    }

    harness.finish().context("Failed to publish reports")?;

    tracing::info!(
        group = %plan.group,
        failed,
        passed = plan.tests.len() - failed,
        "Plan finished"
    );

    Ok(failed)
}

/// Sinks from the plan's `[reporting]` section and the CLI override
///
/// No section and no override means no candidate, i.e. the built-in log sink.
fn reporting_candidates(
    spec: Option<&ReportingSpec>,
    json_dir: Option<PathBuf>,
) -> Vec<ReportingConfig> {
    let console = spec.map_or(false, |s| s.console);
    let json_dir = json_dir.or_else(|| spec.and_then(|s| s.json_dir.clone()));

    if spec.is_none() && json_dir.is_none() {
        return Vec::new();
    }

    let mut sinks: Vec<Arc<dyn ReportSink>> = Vec::new();
    if console {
        sinks.push(Arc::new(ConsoleReportSink::stdout()));
    }
    if let Some(dir) = json_dir {
        sinks.push(Arc::new(JsonReportSink::new(dir)));
    }

    let config = sinks
        .into_iter()
        .fold(ReportingConfig::new().active(true), ReportingConfig::report_sink);
    vec![config]
}
