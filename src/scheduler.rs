use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::management::ClusterSource;
use crate::metrics::InspectionMetrics;
use crate::pipeline::InspectionPipeline;
use crate::report::render::summary_table;
use crate::report::{LatestReport, ReportSummary};
use crate::types::ClusterDescriptor;

/// Drives one inspection run per interval and publishes the results.
pub struct Scheduler {
    source: Arc<dyn ClusterSource>,
    pipeline: InspectionPipeline,
    latest: LatestReport,
    metrics: InspectionMetrics,
    interval: Duration,
}

impl Scheduler {
    pub fn new(
        source: Arc<dyn ClusterSource>,
        pipeline: InspectionPipeline,
        latest: LatestReport,
        metrics: InspectionMetrics,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            pipeline,
            latest,
            metrics,
            interval,
        }
    }

    /// Discover, inspect, publish. A discovery failure leaves the previous report in place.
    pub async fn run_cycle(&self) -> Result<ReportSummary> {
        info!("Starting new inspection cycle");
        let clusters = self.source.discover().await.context("Cluster discovery failed")?;
        Ok(self.inspect(&clusters).await)
    }

    /// Inspect an already discovered fleet and publish the report.
    pub async fn inspect(&self, clusters: &[ClusterDescriptor]) -> ReportSummary {
        let report = self.pipeline.run_inspection(clusters).await;
        let summary = report.summary();
        info!("\n{}", summary_table(&report));

        self.metrics.record(&report);
        self.latest.publish(report).await;
        summary
    }

    /// Run forever, starting with the fleet discovered at startup. A run starts only once the
    /// interval since the previous start has elapsed; a run taking longer than the interval
    /// delays the next one instead of overlapping it.
    pub async fn run_forever(&self, initial: Vec<ClusterDescriptor>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;
        self.inspect(&initial).await;
        loop {
            ticker.tick().await;
            if let Err(e) = self.run_cycle().await {
                warn!("Skipping inspection cycle, keeping previous report: {:#}", e);
            }
        }
    }
}
