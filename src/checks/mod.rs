//! Per-cluster inspection checks.
//!
//! Each check splits into a pure `evaluate_*` function over already-fetched records and an async
//! `check_*` wrapper that queries the [`ManagementApi`](crate::management::ManagementApi). Checks
//! return every outcome they produce; an `Err` means the check itself could not run.

pub mod daemonsets;
pub mod istiod;
pub mod nodes;
pub mod resources;
pub mod workloads;

use crate::types::{CheckOutcome, ClusterDescriptor, OutcomeDetail};

pub use daemonsets::{check_scaling, ScalingTarget, SCALING_TARGETS};
pub use istiod::check_istiod;
pub use nodes::check_node_health;
pub use resources::{check_resource_limits, WorkloadSelector, RESOURCE_SELECTORS};
pub use workloads::check_monitoring_deployments;

/// Failure for an upstream that could not be queried at all.
pub fn not_reachable(cluster: &ClusterDescriptor, check: &str, reason: &str) -> CheckOutcome {
    CheckOutcome::failure(&cluster.name, check, format!("Cluster {} not reachable...", cluster.name))
        .with_detail(OutcomeDetail::CheckError { error: reason.to_string() })
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{BTreeMap, HashMap};

    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, ResourceRequirements};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use crate::management::{DaemonSetRecord, Fetch, ManagedNode, ManagementApi, WorkloadRecord};
    use crate::types::ClusterDescriptor;

    pub fn cluster(name: &str, node_count: usize) -> ClusterDescriptor {
        ClusterDescriptor {
            name: name.to_string(),
            id: format!("c-{}", name),
            state: "active".to_string(),
            node_count,
            ingress_base: "http://127.0.0.1:1".to_string(),
            environment: BTreeMap::new(),
        }
    }

    pub fn pod(name: &str, labels: &[(&str, &str)], image: &str, limits: Option<(&str, &str)>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "main".to_string(),
                    image: Some(image.to_string()),
                    resources: limits.map(|(cpu, memory)| ResourceRequirements {
                        limits: Some(BTreeMap::from([
                            ("cpu".to_string(), Quantity(cpu.to_string())),
                            ("memory".to_string(), Quantity(memory.to_string())),
                        ])),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn down<T>() -> Fetch<T> {
        Fetch::Unreachable("connection refused".to_string())
    }

    /// In-memory management plane. Anything not configured is unreachable.
    #[derive(Default)]
    pub struct FakeApi {
        pub nodes: Option<Fetch<Vec<ManagedNode>>>,
        pub project: Option<Fetch<String>>,
        pub daemon_sets: HashMap<String, Fetch<Vec<DaemonSetRecord>>>,
        pub workloads: Option<Fetch<Vec<WorkloadRecord>>>,
        /// keyed by `namespace/selector`
        pub pods: HashMap<String, Fetch<Vec<Pod>>>,
        /// keyed by pod name
        pub logs: HashMap<String, Fetch<Vec<String>>>,
    }

    impl FakeApi {
        pub fn with_pods(mut self, namespace: &str, selector: &str, pods: Vec<Pod>) -> Self {
            self.pods.insert(format!("{}/{}", namespace, selector), Fetch::Fetched(pods));
            self
        }

        pub fn with_logs(mut self, pod: &str, lines: &[&str]) -> Self {
            self.logs
                .insert(pod.to_string(), Fetch::Fetched(lines.iter().map(|l| l.to_string()).collect()));
            self
        }
    }

    #[async_trait]
    impl ManagementApi for FakeApi {
        async fn nodes(&self, _cluster: &ClusterDescriptor) -> Fetch<Vec<ManagedNode>> {
            self.nodes.clone().unwrap_or_else(down)
        }

        async fn system_project(&self, _cluster: &ClusterDescriptor) -> Fetch<String> {
            self.project.clone().unwrap_or_else(down)
        }

        async fn daemon_sets(&self, _project_id: &str, name: &str) -> Fetch<Vec<DaemonSetRecord>> {
            self.daemon_sets.get(name).cloned().unwrap_or_else(down)
        }

        async fn workloads(&self, _project_id: &str, _namespace: &str) -> Fetch<Vec<WorkloadRecord>> {
            self.workloads.clone().unwrap_or_else(down)
        }

        async fn pods(&self, _cluster: &ClusterDescriptor, namespace: &str, label_selector: &str) -> Fetch<Vec<Pod>> {
            self.pods
                .get(&format!("{}/{}", namespace, label_selector))
                .cloned()
                .unwrap_or_else(down)
        }

        async fn pod(&self, _cluster: &ClusterDescriptor, namespace: &str, name: &str) -> Fetch<Pod> {
            self.pods
                .iter()
                .filter(|(key, _)| key.starts_with(&format!("{}/", namespace)))
                .filter_map(|(_, fetch)| fetch.clone().ok())
                .flatten()
                .find(|p| p.metadata.name.as_deref() == Some(name))
                .map(Fetch::Fetched)
                .unwrap_or_else(down)
        }

        async fn pod_logs(
            &self,
            _cluster: &ClusterDescriptor,
            _namespace: &str,
            name: &str,
            _since_seconds: i64,
        ) -> Fetch<Vec<String>> {
            self.logs.get(name).cloned().unwrap_or_else(down)
        }
    }
}
