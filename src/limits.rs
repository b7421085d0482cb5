use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::error::InspectError;
use crate::types::ResourcePair;

/// Expected `{cpu, memory}` limits per workload, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceLimitTable {
    limits: BTreeMap<String, ResourcePair>,
}

impl Default for ResourceLimitTable {
    fn default() -> Self {
        let prometheus = ResourcePair::new("2", "50000Mi");
        let limits = BTreeMap::from([
            ("istio-ingressgateway".to_string(), ResourcePair::new("6", "24Gi")),
            ("kube-prometheus-stack-prometheus".to_string(), prometheus.clone()),
            ("prometheus".to_string(), prometheus.clone()),
            ("rancher-monitoring-prometheus".to_string(), prometheus),
        ]);
        Self { limits }
    }
}

impl ResourceLimitTable {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let limits: BTreeMap<String, ResourcePair> =
            serde_yaml::from_str(text).context("Invalid resource limit table")?;
        Ok(Self { limits })
    }

    /// Load from `path`, falling back to the built-in table when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("No limit table at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let table = Self::from_yaml(&text)?;
        info!("Loaded {} resource limits from {}", table.len(), path.display());
        Ok(table)
    }

    pub fn get(&self, workload: &str) -> Result<&ResourcePair, InspectError> {
        self.limits
            .get(workload)
            .ok_or_else(|| InspectError::MissingLimit(workload.to_string()))
    }

    pub fn len(&self) -> usize {
        self.limits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }
}
