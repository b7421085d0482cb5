use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{Fetch, ManagedNode, RancherClient};
use crate::types::ClusterDescriptor;

/// Produces the clusters to inspect for one run.
#[async_trait]
pub trait ClusterSource: Send + Sync {
    async fn discover(&self) -> Result<Vec<ClusterDescriptor>>;
}

#[derive(Debug, Deserialize)]
struct ClusterRecord {
    id: String,
    name: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

/// Discovery against the management plane's `/clusters` collection, restricted to a configured
/// selection of cluster names.
pub struct RancherDiscovery {
    client: Arc<RancherClient>,
    /// Cluster name -> direct ingress base
    selection: BTreeMap<String, String>,
}

impl RancherDiscovery {
    pub fn new(client: Arc<RancherClient>, selection: BTreeMap<String, String>) -> Self {
        Self { client, selection }
    }
}

#[async_trait]
impl ClusterSource for RancherDiscovery {
    async fn discover(&self) -> Result<Vec<ClusterDescriptor>> {
        let records: Vec<ClusterRecord> = match self.client.get_collection("/clusters", &[]).await {
            Fetch::Fetched(records) => records,
            Fetch::Unreachable(reason) | Fetch::Malformed(reason) => {
                return Err(anyhow!("Cluster endpoint {} not available: {}", self.client.base_url(), reason));
            }
        };
        debug!("Management plane lists {} clusters", records.len());

        let mut clusters = Vec::new();
        for record in records {
            let Some(ingress_base) = self.selection.get(&record.name) else {
                continue;
            };

            let nodes: Fetch<Vec<ManagedNode>> = self
                .client
                .get_collection(&format!("/clusters/{}/nodes", record.id), &[])
                .await;
            let node_count = match nodes {
                Fetch::Fetched(nodes) => nodes.len(),
                other => {
                    warn!(
                        "Node inventory of {} unavailable ({}), expecting 0 nodes",
                        record.name,
                        other.reason().unwrap_or_default()
                    );
                    0
                }
            };

            clusters.push(ClusterDescriptor {
                name: record.name,
                id: record.id,
                state: record.state,
                node_count,
                ingress_base: ingress_base.clone(),
                environment: record.labels,
            });
        }

        for name in self.selection.keys() {
            if !clusters.iter().any(|c| &c.name == name) {
                warn!("Configured cluster {} is not known to the management plane", name);
            }
        }
        info!("Discovered {} of {} configured clusters", clusters.len(), self.selection.len());
        Ok(clusters)
    }
}
