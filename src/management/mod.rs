//! Access to the cluster-management control plane.
//!
//! Every call resolves to a [`Fetch`]; checks pattern-match on it instead of relying on errors
//! bubbling out of the transport.

pub mod discovery;
pub mod rancher;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use serde::Deserialize;

use crate::types::ClusterDescriptor;

pub use discovery::{ClusterSource, RancherDiscovery};
pub use rancher::RancherClient;

/// Result of a single management-plane query.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetch<T> {
    Fetched(T),
    /// Transport failure, timeout or a non-success status.
    Unreachable(String),
    /// The endpoint answered but the payload could not be decoded.
    Malformed(String),
}

impl<T> Fetch<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Fetch::Fetched(value) => Some(value),
            Fetch::Unreachable(_) | Fetch::Malformed(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetch<U> {
        match self {
            Fetch::Fetched(value) => Fetch::Fetched(f(value)),
            Fetch::Unreachable(reason) => Fetch::Unreachable(reason),
            Fetch::Malformed(reason) => Fetch::Malformed(reason),
        }
    }

    /// Why nothing was fetched, if nothing was.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Fetch::Fetched(_) => None,
            Fetch::Unreachable(reason) | Fetch::Malformed(reason) => Some(reason),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct NodeConditionEntry {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
}

/// Node record of the management API (not the Kubernetes `Node`).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedNode {
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub conditions: Vec<NodeConditionEntry>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DaemonSetStatusRecord {
    #[serde(default)]
    pub current_number_scheduled: i64,
    #[serde(default)]
    pub desired_number_scheduled: i64,
    #[serde(default)]
    pub number_available: i64,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DaemonSetRecord {
    #[serde(default)]
    pub name: String,
    pub daemon_set_status: Option<DaemonSetStatusRecord>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct WorkloadRecord {
    pub name: String,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProjectRecord {
    pub id: String,
}

/// Queries the inspection checks issue against the control plane.
#[async_trait]
pub trait ManagementApi: Send + Sync {
    async fn nodes(&self, cluster: &ClusterDescriptor) -> Fetch<Vec<ManagedNode>>;

    /// Id of the cluster's `System` project.
    async fn system_project(&self, cluster: &ClusterDescriptor) -> Fetch<String>;

    async fn daemon_sets(&self, project_id: &str, name: &str) -> Fetch<Vec<DaemonSetRecord>>;

    async fn workloads(&self, project_id: &str, namespace: &str) -> Fetch<Vec<WorkloadRecord>>;

    async fn pods(&self, cluster: &ClusterDescriptor, namespace: &str, label_selector: &str) -> Fetch<Vec<Pod>>;

    async fn pod(&self, cluster: &ClusterDescriptor, namespace: &str, name: &str) -> Fetch<Pod>;

    /// Log lines of the pod's default container over the last `since_seconds`.
    async fn pod_logs(
        &self,
        cluster: &ClusterDescriptor,
        namespace: &str,
        name: &str,
        since_seconds: i64,
    ) -> Fetch<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_helpers() {
        let fetched: Fetch<u32> = Fetch::Fetched(3);
        assert_eq!(fetched.reason(), None);
        assert_eq!(fetched.clone().map(|v| v * 2), Fetch::Fetched(6));
        assert_eq!(fetched.ok(), Some(3));

        let down: Fetch<u32> = Fetch::Unreachable("timed out".to_string());
        assert_eq!(down.reason(), Some("timed out"));
        assert_eq!(down.clone().map(|v| v * 2), Fetch::Unreachable("timed out".to_string()));
        assert_eq!(down.ok(), None);

        let bad: Fetch<u32> = Fetch::Malformed("expected list".to_string());
        assert_eq!(bad.ok(), None);
    }

    #[test]
    fn test_records_deserialize() {
        let node: ManagedNode = serde_json::from_value(serde_json::json!({
            "nodeName": "worker-1",
            "conditions": [{"type": "Ready", "status": "True", "reason": "KubeletReady"}],
            "state": "active"
        }))
        .unwrap();
        assert_eq!(node.node_name, "worker-1");
        assert_eq!(node.conditions[0].type_, "Ready");

        let ds: DaemonSetRecord = serde_json::from_value(serde_json::json!({
            "name": "canal",
            "daemonSetStatus": {"currentNumberScheduled": 3, "desiredNumberScheduled": 3, "numberAvailable": 2}
        }))
        .unwrap();
        assert_eq!(ds.daemon_set_status.unwrap().number_available, 2);
    }
}
