use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::InspectError;

#[derive(Debug, Clone)]
pub struct Config {
    pub management_url: String,
    pub management_token: String,
    /// Selected cluster name -> direct ingress base URL
    pub clusters: BTreeMap<String, String>,
    pub limits_path: PathBuf,
    pub interval: Duration,
    pub request_timeout: Duration,
    pub verify_tls: bool,
    pub probe_via_proxy: bool,
    pub utilization_threshold_percent: f64,
    pub cluster_concurrency: usize,
    pub listen_addr: String,
    pub required_dashboards: Vec<String>,
    pub run_once: bool,
    pub environment_name: Option<String>,
}

impl Config {
    /// Management-plane root without the `/v3` API suffix; proxy paths hang off it.
    pub fn management_root(&self) -> String {
        management_root(&self.management_url)
    }
}

pub fn management_root(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    trimmed.strip_suffix("/v3").unwrap_or(trimmed).to_string()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClusterDescriptor {
    pub name: String,
    pub id: String,
    pub state: String,
    pub node_count: usize,
    pub ingress_base: String,
    pub environment: BTreeMap<String, String>,
}

impl ClusterDescriptor {
    pub fn is_active(&self) -> bool {
        self.state == "active"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Warning,
    Failure,
    Info,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Severity::Failure, Severity::Warning, Severity::Success, Severity::Info];

    /// Info entries are diagnostic and stay out of the health total.
    pub fn counts_toward_total(&self) -> bool {
        !matches!(self, Severity::Info)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Failure => "failure",
            Severity::Info => "info",
        }
    }

    /// Fixed-width console tag
    pub fn tag(&self) -> &'static str {
        match self {
            Severity::Success => "[  OK  ]",
            Severity::Warning => "[ WARN ]",
            Severity::Failure => "[FAILED]",
            Severity::Info => "[ INFO ]",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = InspectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" | "ok" => Ok(Severity::Success),
            "warning" | "warn" => Ok(Severity::Warning),
            "failure" | "failed" | "fail" => Ok(Severity::Failure),
            "info" => Ok(Severity::Info),
            _ => Err(InspectError::UnrecognizedSeverity(s.to_string())),
        }
    }
}

/// The atomic unit every check emits.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CheckOutcome {
    pub cluster: String,
    pub check: String,
    pub severity: Severity,
    pub message: String,
    pub detail: OutcomeDetail,
}

impl CheckOutcome {
    pub fn new(
        cluster: impl Into<String>,
        check: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            check: check.into(),
            severity,
            message: message.into(),
            detail: OutcomeDetail::None,
        }
    }

    pub fn success(cluster: impl Into<String>, check: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(cluster, check, Severity::Success, message)
    }

    pub fn warning(cluster: impl Into<String>, check: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(cluster, check, Severity::Warning, message)
    }

    pub fn failure(cluster: impl Into<String>, check: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(cluster, check, Severity::Failure, message)
    }

    pub fn info(cluster: impl Into<String>, check: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(cluster, check, Severity::Info, message)
    }

    pub fn with_detail(mut self, detail: OutcomeDetail) -> Self {
        self.detail = detail;
        self
    }
}

/// Structured payload per check family.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeDetail {
    None,
    NodeDiff { nodes: Vec<FailingNode> },
    ScalingDiff(ScalingObservation),
    WorkloadStates { inactive: Vec<String> },
    ResourceDiff { pod: String, comparison: ResourceComparison },
    LogAnomaly { distinct_traces: Vec<String>, records: Vec<PodAnomaly> },
    IstiodRevision(RevisionSummary),
    Probe { url: String, route: Route, status: Option<u16> },
    Utilization(UtilizationReading),
    CheckError { error: String },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConditionMismatch {
    pub condition: String,
    pub expected: String,
    pub observed: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailingNode {
    pub node: String,
    pub mismatches: Vec<ConditionMismatch>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScalingObservation {
    pub daemon_set: String,
    pub expected_nodes: i64,
    pub current_scheduled: i64,
    pub desired_scheduled: i64,
    pub available: i64,
}

impl ScalingObservation {
    pub fn in_parity(&self) -> bool {
        self.current_scheduled == self.expected_nodes
            && self.desired_scheduled == self.expected_nodes
            && self.available == self.expected_nodes
    }
}

/// A `{cpu, memory}` quantity pair kept in string form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourcePair {
    #[serde(deserialize_with = "quantity_string")]
    pub cpu: String,
    #[serde(deserialize_with = "quantity_string")]
    pub memory: String,
}

impl ResourcePair {
    pub fn new(cpu: impl Into<String>, memory: impl Into<String>) -> Self {
        Self { cpu: cpu.into(), memory: memory.into() }
    }
}

// YAML writes `cpu: 2` as a number; limits are compared in string form.
fn quantity_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawQuantity {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match RawQuantity::deserialize(deserializer)? {
        RawQuantity::Text(s) => s,
        RawQuantity::Int(i) => i.to_string(),
        RawQuantity::Float(f) => f.to_string(),
    })
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResourceComparison {
    pub passed: bool,
    pub cpu_ok: bool,
    pub memory_ok: bool,
    pub limit: ResourcePair,
    pub observed: ResourcePair,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WordCount {
    pub word: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AnomalyRecord {
    pub trace: String,
    pub most_frequent_words: Vec<WordCount>,
    pub timestamp: String,
    pub level: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PodAnomaly {
    pub pod: String,
    #[serde(flatten)]
    pub record: AnomalyRecord,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RevisionSummary {
    pub revision: String,
    pub pods: usize,
    pub image_tags: Vec<String>,
}

/// Which network path answered a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Direct,
    Proxy,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UtilizationReading {
    pub cpu_pct: Option<f64>,
    pub memory_pct: Option<f64>,
    pub storage_pct: Option<f64>,
    pub routes: Vec<Route>,
}
