use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{error, info, warn};

use crate::checks::{
    self, check_istiod, check_monitoring_deployments, check_node_health, check_resource_limits, check_scaling,
    RESOURCE_SELECTORS, SCALING_TARGETS,
};
use crate::limits::ResourceLimitTable;
use crate::management::{Fetch, ManagementApi};
use crate::probe::ObservabilityProbe;
use crate::report::{ResultClassifier, RunReport};
use crate::types::{CheckOutcome, ClusterDescriptor, OutcomeDetail};

/// Per-cluster stages, executed in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    NodeCheck,
    ScalingChecks,
    DeploymentCheck,
    ResourceChecks,
    LogCheck,
    ObservabilityProbe,
    MonitoringIngress,
}

impl Stage {
    pub const ORDER: [Stage; 7] = [
        Stage::NodeCheck,
        Stage::ScalingChecks,
        Stage::DeploymentCheck,
        Stage::ResourceChecks,
        Stage::LogCheck,
        Stage::ObservabilityProbe,
        Stage::MonitoringIngress,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::NodeCheck => "node-check",
            Stage::ScalingChecks => "scaling-checks",
            Stage::DeploymentCheck => "deployment-check",
            Stage::ResourceChecks => "resource-checks",
            Stage::LogCheck => "log-check",
            Stage::ObservabilityProbe => "observability-probe",
            Stage::MonitoringIngress => "monitoring-ingress",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Failure outcome for a check that could not run to completion.
fn check_error(cluster: &ClusterDescriptor, check: &str, err: &anyhow::Error) -> CheckOutcome {
    error!("Cluster {}: {} failed: {:#}", cluster.name, check, err);
    CheckOutcome::failure(
        &cluster.name,
        check,
        format!("Cluster {} check {} failed: {:#}", cluster.name, check, err),
    )
    .with_detail(OutcomeDetail::CheckError { error: format!("{:#}", err) })
}

fn absorb(cluster: &ClusterDescriptor, check: &str, result: Result<Vec<CheckOutcome>>) -> Vec<CheckOutcome> {
    result.unwrap_or_else(|e| vec![check_error(cluster, check, &e)])
}

/// Runs every check against every cluster and classifies the outcomes.
#[derive(Clone)]
pub struct InspectionPipeline {
    api: Arc<dyn ManagementApi>,
    probe: Arc<ObservabilityProbe>,
    limits: Arc<ResourceLimitTable>,
    concurrency: usize,
}

impl InspectionPipeline {
    pub fn new(
        api: Arc<dyn ManagementApi>,
        probe: Arc<ObservabilityProbe>,
        limits: Arc<ResourceLimitTable>,
        concurrency: usize,
    ) -> Self {
        Self {
            api,
            probe,
            limits,
            concurrency: concurrency.max(1),
        }
    }

    /// One complete run. Never fails: every problem ends up as a classified outcome.
    pub async fn run_inspection(&self, clusters: &[ClusterDescriptor]) -> RunReport {
        let classifier = Arc::new(ResultClassifier::new());
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        let mut handles = Vec::with_capacity(clusters.len());
        for cluster in clusters.iter().cloned() {
            let pipeline = self.clone();
            let classifier = Arc::clone(&classifier);
            let semaphore = Arc::clone(&semaphore);
            let name = cluster.name.clone();
            let handle = tokio::spawn(async move {
                // the semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                pipeline.inspect_cluster(&cluster, &classifier).await;
            });
            handles.push((name, handle));
        }

        for (name, handle) in handles {
            if let Err(e) = handle.await {
                error!("Inspection task for cluster {} aborted: {}", name, e);
                classifier.ingest(
                    CheckOutcome::failure(&name, "inspection", format!("Inspection of cluster {} aborted", name))
                        .with_detail(OutcomeDetail::CheckError { error: e.to_string() }),
                );
            }
        }

        let report = classifier.summarize();
        info!(
            "Inspection of {} clusters finished: {} checks, {} failures, {} warnings",
            clusters.len(),
            report.total(),
            report.failures.len(),
            report.warnings.len()
        );
        report
    }

    pub async fn inspect_cluster(&self, cluster: &ClusterDescriptor, classifier: &ResultClassifier) {
        if !cluster.is_active() {
            warn!("Cluster {} is {}, skipping inspection", cluster.name, cluster.state);
            classifier.ingest(CheckOutcome::info(
                &cluster.name,
                "cluster-state",
                format!("Cluster {} has failed active state ({})", cluster.name, cluster.state),
            ));
            return;
        }

        info!("Inspecting cluster {}", cluster.name);
        let project = match self.api.system_project(cluster).await {
            Fetch::Fetched(id) => Ok(id),
            other => {
                let reason = other.reason().unwrap_or_default().to_string();
                warn!("Cluster {}: System project unavailable: {}", cluster.name, reason);
                Err(reason)
            }
        };

        let project = Arc::new(project);
        for stage in Stage::ORDER {
            let outcomes = match self.spawn_stage(stage, cluster, &project).await {
                Ok(result) => absorb(cluster, stage.name(), result),
                Err(e) => vec![check_error(cluster, stage.name(), &anyhow!("stage aborted: {}", e))],
            };
            classifier.ingest_all(outcomes);
        }
    }

    /// Runs one stage on its own task so a panic stays inside that stage.
    async fn spawn_stage(
        &self,
        stage: Stage,
        cluster: &ClusterDescriptor,
        project: &Arc<Result<String, String>>,
    ) -> Result<Result<Vec<CheckOutcome>>, JoinError> {
        let pipeline = self.clone();
        let cluster = cluster.clone();
        let project = Arc::clone(project);
        tokio::spawn(async move { pipeline.run_stage(stage, &cluster, &project).await }).await
    }

    async fn run_stage(
        &self,
        stage: Stage,
        cluster: &ClusterDescriptor,
        project: &Result<String, String>,
    ) -> Result<Vec<CheckOutcome>> {
        let api = self.api.as_ref();
        match stage {
            Stage::NodeCheck => check_node_health(api, cluster).await,
            Stage::ScalingChecks => {
                let mut outcomes = Vec::new();
                for target in &SCALING_TARGETS {
                    outcomes.extend(match project {
                        Ok(id) => absorb(cluster, target.check, check_scaling(api, cluster, id, target).await),
                        Err(reason) => vec![checks::not_reachable(cluster, target.check, reason)],
                    });
                }
                Ok(outcomes)
            }
            Stage::DeploymentCheck => match project {
                Ok(id) => check_monitoring_deployments(api, cluster, id).await,
                Err(reason) => Ok(vec![checks::not_reachable(cluster, checks::workloads::CHECK, reason)]),
            },
            Stage::ResourceChecks => {
                let mut outcomes = Vec::new();
                for selector in &RESOURCE_SELECTORS {
                    let check = selector.check_name();
                    outcomes.extend(match project {
                        Ok(_) => absorb(cluster, &check, check_resource_limits(api, &self.limits, cluster, selector).await),
                        Err(reason) => vec![checks::not_reachable(cluster, &check, reason)],
                    });
                }
                Ok(outcomes)
            }
            Stage::LogCheck => match project {
                Ok(_) => check_istiod(api, cluster).await,
                Err(reason) => Ok(vec![checks::not_reachable(cluster, checks::istiod::REVISION_CHECK, reason)]),
            },
            Stage::ObservabilityProbe => self.probe.probe_cluster(cluster).await,
            Stage::MonitoringIngress => self.probe.probe_monitoring_ingress(cluster).await,
        }
    }
}
