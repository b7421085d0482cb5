//! Prometheus exposition of the latest inspection run.

use anyhow::{Context, Result};
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::report::RunReport;
use crate::types::Severity;

/// Run duration buckets in seconds; a run usually takes one to several minutes.
const RUN_DURATION_BUCKETS: &[f64] = &[30.0, 45.0, 60.0, 75.0, 90.0, 120.0, 135.0, 150.0, 165.0, 180.0, 240.0, 300.0];

/// Metrics handle. Clones share the same registry and collectors.
#[derive(Clone)]
pub struct InspectionMetrics {
    registry: Registry,
    observed_checks: IntGaugeVec,
    total_checks: IntGauge,
    runs: IntCounter,
    run_duration: Histogram,
}

impl InspectionMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let observed_checks = IntGaugeVec::new(
            Opts::new("fleet_inspector_observed_checks", "Checks of the latest run by severity"),
            &["type"],
        )?;
        let total_checks = IntGauge::new(
            "fleet_inspector_total_checks",
            "Checks of the latest run counting towards health (info excluded)",
        )?;
        let runs = IntCounter::new("fleet_inspector_runs_total", "Completed inspection runs")?;
        let run_duration = Histogram::with_opts(
            HistogramOpts::new("fleet_inspector_run_duration_seconds", "Wall time of an inspection run")
                .buckets(RUN_DURATION_BUCKETS.to_vec()),
        )?;

        registry.register(Box::new(observed_checks.clone()))?;
        registry.register(Box::new(total_checks.clone()))?;
        registry.register(Box::new(runs.clone()))?;
        registry.register(Box::new(run_duration.clone()))?;

        Ok(Self {
            registry,
            observed_checks,
            total_checks,
            runs,
            run_duration,
        })
    }

    /// Replace the gauges with the counts of `report` and account for the run.
    pub fn record(&self, report: &RunReport) {
        for severity in Severity::ALL {
            self.observed_checks
                .with_label_values(&[severity.as_str()])
                .set(report.outcomes(severity).len() as i64);
        }
        self.total_checks.set(report.total() as i64);
        self.runs.inc();
        self.run_duration.observe(report.duration_seconds());
    }

    /// Text exposition format.
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .context("Failed to encode metrics")?;
        String::from_utf8(buffer).context("Metrics are not valid UTF-8")
    }
}
