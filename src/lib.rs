// Public modules
pub mod anomaly;
pub mod checks;
pub mod config;
pub mod error;
pub mod kubernetes;
pub mod limits;
pub mod management;
pub mod metrics;
pub mod parsing;
pub mod pipeline;
pub mod probe;
pub mod report;
pub mod scheduler;
pub mod server;
pub mod types;

// Re-export commonly used items
pub use types::*;
pub use error::InspectError;
pub use config::{load_config, load_config_with_env, EnvironmentProvider, SystemEnvironment, MockEnvironment};
pub use parsing::{parse_cpu_to_millicores, parse_memory_quantity, compare_resources};
pub use anomaly::analyze_lines;
pub use limits::ResourceLimitTable;
pub use management::{ClusterSource, Fetch, ManagementApi, RancherClient, RancherDiscovery};
pub use probe::{ObservabilityProbe, ProbeSettings};
pub use pipeline::{InspectionPipeline, Stage};
pub use report::{LatestReport, ReportSummary, ResultClassifier, RunReport};
pub use metrics::InspectionMetrics;
pub use scheduler::Scheduler;
