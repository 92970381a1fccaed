//! TOML test plans: one class, its reporting setup and its tests

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use loadgauge_core::{parse_percentiles, EvaluationConfig, Thresholds};
use serde::Deserialize;

use crate::target::TargetSpec;

/// A whole plan file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Plan {
    /// Class identity every test reports under
    pub group: String,

    /// Report sinks; the built-in log sink when absent
    #[serde(default)]
    pub reporting: Option<ReportingSpec>,

    /// Tests, run in file order
    #[serde(default, rename = "test")]
    pub tests: Vec<TestPlan>,
}

/// `[reporting]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportingSpec {
    /// Print a table to stdout
    #[serde(default = "default_true")]
    pub console: bool,

    /// Write `<group>.json` into this directory
    #[serde(default)]
    pub json_dir: Option<PathBuf>,
}

/// One `[[test]]` entry
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestPlan {
    /// Test name, unique within the plan
    pub name: String,

    /// Run once without measuring when false
    #[serde(default = "default_true")]
    pub evaluate: bool,

    #[serde(default)]
    threads: Option<usize>,
    #[serde(default)]
    duration_ms: Option<u64>,
    #[serde(default)]
    warm_up_ms: Option<u64>,
    #[serde(default)]
    max_executions_per_second: Option<u32>,
    #[serde(default)]
    invocation_timeout_ms: Option<u64>,
    #[serde(default)]
    drain_grace_ms: Option<u64>,

    /// Synthetic body to run
    #[serde(default)]
    pub target: TargetSpec,

    #[serde(default)]
    thresholds: ThresholdSpec,
}

/// `[test.thresholds]`; percentiles use the `"90:7,99:12.5"` form
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ThresholdSpec {
    max_error_percentage: Option<f64>,
    min_throughput: Option<f64>,
    min_latency_ms: Option<f64>,
    max_latency_ms: Option<f64>,
    mean_latency_ms: Option<f64>,
    percentiles: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Plan {
    /// Read and parse a plan file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid plan {}", path.display()))
    }

    /// Parse a plan from TOML text
    pub fn parse(raw: &str) -> Result<Self> {
        let plan: Plan = toml::from_str(raw)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Check names and every test's configuration
    pub fn validate(&self) -> Result<()> {
        if self.group.trim().is_empty() {
            bail!("group must not be empty");
        }
        if self.tests.is_empty() {
            bail!("plan has no [[test]] entries");
        }

        let mut seen = HashSet::new();
        for test in &self.tests {
            if !seen.insert(test.name.as_str()) {
                bail!("duplicate test name '{}'", test.name);
            }
            test.target
                .validate()
                .with_context(|| format!("test '{}'", test.name))?;
            test.evaluation_config()
                .with_context(|| format!("test '{}'", test.name))?;
        }
        Ok(())
    }
}

impl TestPlan {
    /// Resolved evaluation configuration, `None` for a single execution
    pub fn evaluation_config(&self) -> Result<Option<EvaluationConfig>> {
        if !self.evaluate {
            return Ok(None);
        }

        let defaults = EvaluationConfig::default();
        let mut config = EvaluationConfig::new(self.threads.unwrap_or(defaults.threads))
            .with_duration_ms(self.duration_ms.unwrap_or(defaults.duration_ms))
            .with_warm_up_ms(self.warm_up_ms.unwrap_or(defaults.warm_up_ms))
            .with_max_executions_per_second(self.max_executions_per_second.unwrap_or(0))
            .with_drain_grace_ms(self.drain_grace_ms.unwrap_or(defaults.drain_grace_ms))
            .with_thresholds(self.thresholds.to_thresholds()?);
        if let Some(timeout) = self.invocation_timeout_ms {
            config = config.with_invocation_timeout_ms(timeout);
        }

        config.validate()?;
        Ok(Some(config))
    }
}

impl ThresholdSpec {
    fn to_thresholds(&self) -> Result<Thresholds> {
        let mut thresholds = Thresholds::new();
        if let Some(v) = self.max_error_percentage {
            thresholds = thresholds.with_max_error_percentage(v);
        }
        if let Some(v) = self.min_throughput {
            thresholds = thresholds.with_min_throughput(v);
        }
        if let Some(v) = self.min_latency_ms {
            thresholds = thresholds.with_min_latency_ms(v);
        }
        if let Some(v) = self.max_latency_ms {
            thresholds = thresholds.with_max_latency_ms(v);
        }
        if let Some(v) = self.mean_latency_ms {
            thresholds = thresholds.with_mean_latency_ms(v);
        }
        if let Some(spec) = &self.percentiles {
            for (percentile, ms) in parse_percentiles(spec)? {
                thresholds = thresholds.with_max_latency_percentile(percentile, ms);
            }
        }
        Ok(thresholds)
    }
}
