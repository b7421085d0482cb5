use anyhow::Result;

use super::not_reachable;
use crate::management::{Fetch, ManagementApi, WorkloadRecord};
use crate::types::{CheckOutcome, ClusterDescriptor, OutcomeDetail};

pub const CHECK: &str = "monitoring-deployments";
pub const MONITORING_NAMESPACE: &str = "cattle-monitoring-system";

pub fn evaluate_workloads(cluster: &ClusterDescriptor, workloads: &[WorkloadRecord]) -> CheckOutcome {
    if workloads.is_empty() {
        return CheckOutcome::failure(
            &cluster.name,
            CHECK,
            format!(
                "Cluster {} has failed monitoring deployments. No deployments with active status",
                cluster.name
            ),
        );
    }

    let inactive: Vec<String> = workloads
        .iter()
        .filter(|w| w.state != "active")
        .map(|w| w.name.clone())
        .collect();

    if inactive.is_empty() {
        CheckOutcome::success(
            &cluster.name,
            CHECK,
            format!("Cluster {} has all monitoring deployments", cluster.name),
        )
    } else {
        CheckOutcome::failure(
            &cluster.name,
            CHECK,
            format!(
                "Cluster {} has failed monitoring deployments: {}",
                cluster.name,
                inactive.join(", ")
            ),
        )
        .with_detail(OutcomeDetail::WorkloadStates { inactive })
    }
}

pub async fn check_monitoring_deployments(
    api: &dyn ManagementApi,
    cluster: &ClusterDescriptor,
    project_id: &str,
) -> Result<Vec<CheckOutcome>> {
    let outcome = match api.workloads(project_id, MONITORING_NAMESPACE).await {
        Fetch::Fetched(workloads) => evaluate_workloads(cluster, &workloads),
        other => not_reachable(cluster, CHECK, other.reason().unwrap_or_default()),
    };
    Ok(vec![outcome])
}
