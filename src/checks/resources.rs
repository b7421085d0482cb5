use anyhow::Result;
use tracing::error;

use super::not_reachable;
use crate::kubernetes::first_container_limits;
use crate::limits::ResourceLimitTable;
use crate::management::{Fetch, ManagementApi};
use crate::parsing::compare_resources;
use crate::types::{CheckOutcome, ClusterDescriptor, OutcomeDetail, ResourcePair};

/// Pods selected by `key=value` in `namespace`; `value` is also the limit table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadSelector {
    pub namespace: &'static str,
    pub key: &'static str,
    pub value: &'static str,
}

impl WorkloadSelector {
    pub fn label_selector(&self) -> String {
        format!("{}={}", self.key, self.value)
    }

    pub fn check_name(&self) -> String {
        format!("resource-limits:{}", self.value)
    }
}

pub const RESOURCE_SELECTORS: [WorkloadSelector; 2] = [
    WorkloadSelector {
        namespace: "istio-system",
        key: "app",
        value: "istio-ingressgateway",
    },
    WorkloadSelector {
        namespace: "cattle-monitoring-system",
        key: "prometheus",
        value: "rancher-monitoring-prometheus",
    },
];

/// Outcome for one pod's declared limits, `None` when they satisfy the table entry.
pub fn evaluate_pod_limits(
    cluster: &ClusterDescriptor,
    selector: &WorkloadSelector,
    pod: &str,
    limit: &ResourcePair,
    observed: Option<ResourcePair>,
) -> Option<CheckOutcome> {
    let check = selector.check_name();
    let Some(observed) = observed else {
        return Some(CheckOutcome::failure(
            &cluster.name,
            check,
            format!("Cluster {} pod {} declares no cpu/memory limits", cluster.name, pod),
        ));
    };

    match compare_resources(limit, &observed) {
        Ok(comparison) if comparison.passed => None,
        Ok(comparison) => Some(
            CheckOutcome::failure(
                &cluster.name,
                check,
                format!(
                    "Cluster {} has failed resource check {} on {}: cpu {} (limit {}, ok: {}), memory {} (limit {}, ok: {})",
                    cluster.name,
                    selector.value,
                    pod,
                    observed.cpu,
                    limit.cpu,
                    comparison.cpu_ok,
                    observed.memory,
                    limit.memory,
                    comparison.memory_ok
                ),
            )
            .with_detail(OutcomeDetail::ResourceDiff { pod: pod.to_string(), comparison }),
        ),
        Err(e) => {
            error!("Cluster {} pod {}: {}", cluster.name, pod, e);
            Some(
                CheckOutcome::failure(
                    &cluster.name,
                    check,
                    format!("Cluster {} pod {} has unreadable limits: {}", cluster.name, pod, e),
                )
                .with_detail(OutcomeDetail::CheckError { error: e.to_string() }),
            )
        }
    }
}

pub async fn check_resource_limits(
    api: &dyn ManagementApi,
    limits: &ResourceLimitTable,
    cluster: &ClusterDescriptor,
    selector: &WorkloadSelector,
) -> Result<Vec<CheckOutcome>> {
    let limit = limits.get(selector.value)?;
    let check = selector.check_name();

    let pods = match api.pods(cluster, selector.namespace, &selector.label_selector()).await {
        Fetch::Fetched(pods) => pods,
        other => return Ok(vec![not_reachable(cluster, &check, other.reason().unwrap_or_default())]),
    };
    if pods.is_empty() {
        return Ok(vec![CheckOutcome::failure(
            &cluster.name,
            check,
            format!(
                "Cluster {} has no resources with {}:{} in namespace {}",
                cluster.name, selector.key, selector.value, selector.namespace
            ),
        )]);
    }

    let mut failures = Vec::new();
    for name in pods.iter().filter_map(|p| p.metadata.name.as_deref()) {
        let pod = match api.pod(cluster, selector.namespace, name).await {
            Fetch::Fetched(pod) => pod,
            other => {
                failures.push(not_reachable(cluster, &check, other.reason().unwrap_or_default()));
                continue;
            }
        };
        let observed = match first_container_limits(&pod) {
            Some((Some(cpu), Some(memory))) => Some(ResourcePair::new(cpu, memory)),
            _ => None,
        };
        if let Some(outcome) = evaluate_pod_limits(cluster, selector, name, limit, observed) {
            failures.push(outcome);
        }
    }

    if failures.is_empty() {
        Ok(vec![CheckOutcome::success(
            &cluster.name,
            check,
            format!("Cluster {} passed resource check {}", cluster.name, selector.value),
        )])
    } else {
        Ok(failures)
    }
}
