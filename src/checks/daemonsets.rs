use anyhow::Result;

use super::not_reachable;
use crate::management::{DaemonSetRecord, Fetch, ManagementApi};
use crate::types::{CheckOutcome, ClusterDescriptor, OutcomeDetail, ScalingObservation};

/// A DaemonSet in the System project that must run on every node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingTarget {
    pub check: &'static str,
    pub display: &'static str,
    pub daemon_set: &'static str,
}

pub const SCALING_TARGETS: [ScalingTarget; 3] = [
    ScalingTarget {
        check: "node-exporter-scaling",
        display: "Prometheus",
        daemon_set: "rancher-monitoring-prometheus-node-exporter",
    },
    ScalingTarget {
        check: "canal-scaling",
        display: "Canal",
        daemon_set: "canal",
    },
    ScalingTarget {
        check: "istio-cni-scaling",
        display: "Istio CNI",
        daemon_set: "istio-cni-node",
    },
];

pub fn evaluate_scaling(
    cluster: &ClusterDescriptor,
    target: &ScalingTarget,
    records: &[DaemonSetRecord],
) -> CheckOutcome {
    let expected = cluster.node_count as i64;
    let Some(status) = records.first().and_then(|r| r.daemon_set_status.as_ref()) else {
        return CheckOutcome::failure(
            &cluster.name,
            target.check,
            format!(
                "Cluster {} {} scaling. Desired: {} | Available: NONE",
                cluster.name, target.display, expected
            ),
        );
    };

    let observation = ScalingObservation {
        daemon_set: target.daemon_set.to_string(),
        expected_nodes: expected,
        current_scheduled: status.current_number_scheduled,
        desired_scheduled: status.desired_number_scheduled,
        available: status.number_available,
    };

    if observation.in_parity() {
        CheckOutcome::success(
            &cluster.name,
            target.check,
            format!("Cluster {} passed {} scaling", cluster.name, target.display),
        )
    } else {
        CheckOutcome::failure(
            &cluster.name,
            target.check,
            format!(
                "Cluster {} {} scaling. Desired: {} | Available: {}",
                cluster.name, target.display, expected, observation.available
            ),
        )
        .with_detail(OutcomeDetail::ScalingDiff(observation))
    }
}

pub async fn check_scaling(
    api: &dyn ManagementApi,
    cluster: &ClusterDescriptor,
    project_id: &str,
    target: &ScalingTarget,
) -> Result<Vec<CheckOutcome>> {
    let outcome = match api.daemon_sets(project_id, target.daemon_set).await {
        Fetch::Fetched(records) => evaluate_scaling(cluster, target, &records),
        other => not_reachable(cluster, target.check, other.reason().unwrap_or_default()),
    };
    Ok(vec![outcome])
}
