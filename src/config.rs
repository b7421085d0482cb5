use anyhow::{anyhow, Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;
use crate::types::Config;

/// Trait for abstracting environment variable access
pub trait EnvironmentProvider {
    fn get_var(&self, key: &str) -> Option<String>;
}

/// Production implementation using std::env
pub struct SystemEnvironment;

impl EnvironmentProvider for SystemEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Mock implementation for testing
#[derive(Debug, Default)]
pub struct MockEnvironment {
    vars: HashMap<String, String>,
}

impl MockEnvironment {
    pub fn new() -> Self {
        Self {
            vars: HashMap::new(),
        }
    }

    pub fn set_var<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_var<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.set_var(key, value);
        self
    }
}

impl EnvironmentProvider for MockEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn load_config() -> Result<Config> {
    load_config_with_env(&SystemEnvironment)
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    value
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// `prod=https://prod.example.com, dev=https://dev.example.com`
fn parse_cluster_selection(raw: &str) -> Result<BTreeMap<String, String>> {
    let mut clusters = BTreeMap::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (name, base) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid CLUSTERS entry `{}` (expected name=ingressBase)", entry))?;
        let (name, base) = (name.trim(), base.trim().trim_end_matches('/'));
        if name.is_empty() || base.is_empty() {
            return Err(anyhow!("Invalid CLUSTERS entry `{}` (expected name=ingressBase)", entry));
        }
        clusters.insert(name.to_string(), base.to_string());
    }
    Ok(clusters)
}

pub fn load_config_with_env<E: EnvironmentProvider>(env: &E) -> Result<Config> {
    let management_url = env.get_var("MANAGEMENT_URL")
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("MANAGEMENT_URL env var must be set (e.g. https://rancher.example.com/v3)"))?;

    let management_token = env.get_var("MANAGEMENT_TOKEN")
        .ok_or_else(|| anyhow!("MANAGEMENT_TOKEN must be provided via Secret env"))?;

    let clusters = parse_cluster_selection(&env.get_var("CLUSTERS").unwrap_or_default())?;
    if clusters.is_empty() {
        return Err(anyhow!("CLUSTERS env var must be set (comma-separated name=ingressBase)"));
    }

    let utilization_threshold_percent: f64 = env.get_var("UTILIZATION_THRESHOLD_PERCENT")
        .unwrap_or_else(|| "65".to_string())
        .parse()
        .context("Invalid UTILIZATION_THRESHOLD_PERCENT")?;

    let limits_path = env.get_var("LIMITS_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/config/limits.yaml"));

    let interval = Duration::from_secs(parse_or(env.get_var("INSPECTION_INTERVAL_SECONDS"), 60u64).max(1));
    let request_timeout = Duration::from_secs(parse_or(env.get_var("REQUEST_TIMEOUT_SECONDS"), 5u64).max(1));
    let cluster_concurrency = parse_or(env.get_var("CLUSTER_CONCURRENCY"), 1usize).max(1);

    let required_dashboards = env.get_var("REQUIRED_DASHBOARDS")
        .unwrap_or_else(|| "Rancher / Node".to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    Ok(Config {
        management_url,
        management_token,
        clusters,
        limits_path,
        interval,
        request_timeout,
        verify_tls: parse_bool(env.get_var("VERIFY_TLS"), false),
        probe_via_proxy: parse_bool(env.get_var("PROBE_VIA_PROXY"), false),
        utilization_threshold_percent,
        cluster_concurrency,
        listen_addr: env.get_var("LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        required_dashboards,
        run_once: parse_bool(env.get_var("RUN_ONCE"), false),
        environment_name: env.get_var("ENVIRONMENT_NAME"),
    })
}
