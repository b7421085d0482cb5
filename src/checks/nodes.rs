use anyhow::Result;

use super::not_reachable;
use crate::management::{Fetch, ManagedNode, ManagementApi, NodeConditionEntry};
use crate::types::{CheckOutcome, ClusterDescriptor, ConditionMismatch, FailingNode, OutcomeDetail};

pub const CHECK: &str = "node-health";

/// Condition type -> required status. Condition types not listed here are ignored.
pub const EXPECTED_CONDITIONS: [(&str, &str); 8] = [
    ("Initialized", "True"),
    ("Registered", "True"),
    ("Provisioned", "True"),
    ("NetworkUnavailable", "False"),
    ("MemoryPressure", "False"),
    ("DiskPressure", "False"),
    ("PIDPressure", "False"),
    ("Ready", "True"),
];

fn unmet_conditions(conditions: &[NodeConditionEntry]) -> Vec<ConditionMismatch> {
    let mut unmet = Vec::new();
    for (condition, expected) in EXPECTED_CONDITIONS {
        for entry in conditions.iter().filter(|c| c.type_ == condition) {
            if entry.status != expected {
                unmet.push(ConditionMismatch {
                    condition: condition.to_string(),
                    expected: expected.to_string(),
                    observed: entry.status.clone(),
                });
            }
        }
    }
    unmet
}

pub fn evaluate_nodes(cluster: &ClusterDescriptor, nodes: &[ManagedNode]) -> CheckOutcome {
    if nodes.is_empty() {
        return CheckOutcome::failure(
            &cluster.name,
            CHECK,
            format!("Cluster {} returned no nodes", cluster.name),
        );
    }

    let failing: Vec<FailingNode> = nodes
        .iter()
        .filter_map(|node| {
            let mismatches = unmet_conditions(&node.conditions);
            (!mismatches.is_empty()).then(|| FailingNode {
                node: node.node_name.clone(),
                mismatches,
            })
        })
        .collect();

    if failing.is_empty() {
        return CheckOutcome::success(
            &cluster.name,
            CHECK,
            format!("Cluster {} passed node inspection", cluster.name),
        );
    }

    let listing = failing
        .iter()
        .map(|n| {
            let conditions = n
                .mismatches
                .iter()
                .map(|m| format!("{}={}", m.condition, m.observed))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{} ({})", n.node, conditions)
        })
        .collect::<Vec<_>>()
        .join("; ");
    CheckOutcome::failure(
        &cluster.name,
        CHECK,
        format!("Cluster {} failed with nodes: {}", cluster.name, listing),
    )
    .with_detail(OutcomeDetail::NodeDiff { nodes: failing })
}

pub async fn check_node_health(api: &dyn ManagementApi, cluster: &ClusterDescriptor) -> Result<Vec<CheckOutcome>> {
    let outcome = match api.nodes(cluster).await {
        Fetch::Fetched(nodes) => evaluate_nodes(cluster, &nodes),
        other => not_reachable(cluster, CHECK, other.reason().unwrap_or_default()),
    };
    Ok(vec![outcome])
}
