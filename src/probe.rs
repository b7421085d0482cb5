//! Reachability and content checks against a cluster's observability stack.
//!
//! JSON surfaces are tried on the direct ingress first, without credentials, and retried through
//! the management-plane proxy with the bearer token when the direct answer is not a JSON object.
//! HTML surfaces only fall back when the direct request cannot be completed at all.

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

use crate::kubernetes::proxy_base;
use crate::types::{CheckOutcome, ClusterDescriptor, Config, OutcomeDetail, Route, Severity, UtilizationReading};

pub const PROMETHEUS_SERVICE_PATH: &str =
    "api/v1/namespaces/cattle-monitoring-system/services/http:rancher-monitoring-prometheus:9090/proxy";
pub const TRACING_SEARCH_PATH: &str = "api/v1/namespaces/istio-system/services/http:tracing:16686/proxy/jaeger/search";

pub const UTILIZATION_CHECK: &str = "prometheus-utilization";
pub const TARGETS_CHECK: &str = "prometheus-targets";
pub const GRAPH_CHECK: &str = "prometheus-graph";
pub const TRACING_CHECK: &str = "tracing-search";
pub const INGRESS_CHECK: &str = "monitoring-ingress";

pub const CPU_QUERY: &str = r#"(1 - (avg(irate({__name__=~"node_cpu_seconds_total|windows_cpu_time_total",mode="idle"}[5m])))) * 100"#;
pub const MEMORY_QUERY: &str = r#"(1 - sum({__name__=~"node_memory_MemAvailable_bytes|windows_os_physical_memory_free_bytes"}) / sum({__name__=~"node_memory_MemTotal_bytes|windows_cs_physical_memory_bytes"})) * 100"#;
pub const STORAGE_QUERY: &str = r#"(1 - (((sum(node_filesystem_free_bytes{device!~"rootfs|HarddiskVolume.+"}) OR on() vector(0)) + (sum(windows_logical_disk_free_bytes{volume!~"(HarddiskVolume.+|[A-Z]:.+)"}) OR on() vector(0))) / ((sum(node_filesystem_size_bytes{device!~"rootfs|HarddiskVolume.+"}) OR on() vector(0)) + (sum(windows_logical_disk_size_bytes{volume!~"(HarddiskVolume.+|[A-Z]:.+)"}) OR on() vector(0))))) * 100"#;

const UTILIZATION_QUERIES: [(&str, &str); 3] = [("cpu", CPU_QUERY), ("memory", MEMORY_QUERY), ("storage", STORAGE_QUERY)];

/// 2xx succeeds, the gateway class (`status % 400 > 99`, so 3xx and 5xx) warns, anything else fails.
pub fn classify_status(status: u16) -> Severity {
    if (200..300).contains(&status) {
        Severity::Success
    } else if status % 400 > 99 {
        Severity::Warning
    } else {
        Severity::Failure
    }
}

/// `data.result[0].value[1]` of a Prometheus instant query, rounded to two decimals.
pub fn extract_scalar(body: &Value) -> Option<f64> {
    let raw = body
        .get("data")?
        .get("result")?
        .get(0)?
        .get("value")?
        .get(1)?;
    let value = match raw {
        Value::String(s) => s.parse::<f64>().ok()?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    Some((value * 100.0).round() / 100.0)
}

#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub management_root: String,
    pub token: String,
    pub timeout: std::time::Duration,
    pub verify_tls: bool,
    pub probe_via_proxy: bool,
    pub utilization_threshold_percent: f64,
    pub required_dashboards: Vec<String>,
}

impl ProbeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            management_root: config.management_root(),
            token: config.management_token.clone(),
            timeout: config.request_timeout,
            verify_tls: config.verify_tls,
            probe_via_proxy: config.probe_via_proxy,
            utilization_threshold_percent: config.utilization_threshold_percent,
            required_dashboards: config.required_dashboards.clone(),
        }
    }
}

#[derive(Debug)]
enum Answer {
    Transport(String),
    Status { status: u16, json: Option<Value> },
}

impl Answer {
    /// The body when the endpoint answered 2xx with a JSON object.
    fn structured(self) -> Option<Value> {
        match self {
            Answer::Status { status, json } if (200..300).contains(&status) => json,
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            Answer::Transport(e) => e.clone(),
            Answer::Status { status, json: None } => format!("HTTP {} without JSON body", status),
            Answer::Status { status, .. } => format!("HTTP {}", status),
        }
    }
}

pub struct ObservabilityProbe {
    http: reqwest::Client,
    settings: ProbeSettings,
}

impl ObservabilityProbe {
    pub fn new(settings: ProbeSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .danger_accept_invalid_certs(!settings.verify_tls)
            .build()
            .context("Failed to build probe HTTP client")?;
        Ok(Self { http, settings })
    }

    fn prometheus_direct(&self, cluster: &ClusterDescriptor, path: &str) -> String {
        format!("{}/monitoring/prometheus/{}", cluster.ingress_base, path)
    }

    fn prometheus_proxy(&self, cluster: &ClusterDescriptor, path: &str) -> String {
        format!(
            "{}/{}/{}",
            proxy_base(&self.settings.management_root, &cluster.id),
            PROMETHEUS_SERVICE_PATH,
            path
        )
    }

    async fn get(&self, url: &str, query: &[(&str, &str)], route: Route) -> Answer {
        debug!("GET {} [{:?}]", url, route);
        let mut request = self.http.get(url).query(query);
        if route == Route::Proxy {
            request = request.bearer_auth(&self.settings.token);
        }
        match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let json = response.json::<Value>().await.ok().filter(Value::is_object);
                Answer::Status { status, json }
            }
            Err(e) => Answer::Transport(e.to_string()),
        }
    }

    /// JSON from the direct URL, or from the proxy when the direct answer is unusable.
    async fn fetch_json(&self, direct: &str, proxy: &str, query: &[(&str, &str)]) -> Result<(Value, Route), String> {
        let direct_answer = self.get(direct, query, Route::Direct).await;
        let direct_reason = direct_answer.describe();
        if let Some(body) = direct_answer.structured() {
            return Ok((body, Route::Direct));
        }
        let proxy_answer = self.get(proxy, query, Route::Proxy).await;
        let proxy_reason = proxy_answer.describe();
        match proxy_answer.structured() {
            Some(body) => Ok((body, Route::Proxy)),
            None => Err(format!("direct: {}; proxy: {}", direct_reason, proxy_reason)),
        }
    }

    pub async fn probe_utilization(&self, cluster: &ClusterDescriptor) -> CheckOutcome {
        let direct = self.prometheus_direct(cluster, "api/v1/query");
        let proxy = self.prometheus_proxy(cluster, "api/v1/query");

        let mut values: Vec<Option<f64>> = Vec::new();
        let mut routes = Vec::new();
        let mut errors = Vec::new();
        let mut over = Vec::new();

        for (resource, query) in UTILIZATION_QUERIES {
            match self.fetch_json(&direct, &proxy, &[("query", query)]).await {
                Ok((body, route)) => {
                    routes.push(route);
                    match extract_scalar(&body) {
                        Some(value) => {
                            if value > self.settings.utilization_threshold_percent {
                                over.push(resource);
                            }
                            values.push(Some(value));
                        }
                        None => {
                            errors.push(format!("{}: no scalar in query result", resource));
                            values.push(None);
                        }
                    }
                }
                Err(reason) => {
                    errors.push(format!("{}: {}", resource, reason));
                    values.push(None);
                }
            }
        }

        let shown = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_else(|| "xx".to_string());
        let via = if routes.contains(&Route::Proxy) { " [used management proxy]" } else { "" };
        let reading = UtilizationReading {
            cpu_pct: values[0],
            memory_pct: values[1],
            storage_pct: values[2],
            routes,
        };
        let mut message = format!(
            "Cluster {}: | CPU: {}% | RAM: {}% | Storage: {}%{}",
            cluster.name,
            shown(reading.cpu_pct),
            shown(reading.memory_pct),
            shown(reading.storage_pct),
            via
        );

        let severity = if !errors.is_empty() {
            message.push_str(&format!(" ({})", errors.join("; ")));
            Severity::Failure
        } else if !over.is_empty() {
            message.push_str(&format!(
                " - {} above {}%",
                over.join(", "),
                self.settings.utilization_threshold_percent
            ));
            Severity::Warning
        } else {
            Severity::Success
        };

        CheckOutcome::new(&cluster.name, UTILIZATION_CHECK, severity, message)
            .with_detail(OutcomeDetail::Utilization(reading))
    }

    fn status_outcome(&self, cluster: &ClusterDescriptor, check: &str, label: &str, url: &str, route: Route, answer: &Answer) -> CheckOutcome {
        let (severity, status, shown) = match answer {
            Answer::Status { status, .. } => (classify_status(*status), Some(*status), status.to_string()),
            Answer::Transport(_) => (Severity::Failure, None, "ConnectionError".to_string()),
        };
        CheckOutcome::new(
            &cluster.name,
            check,
            severity,
            format!("Cluster {}: {} returned HTTP | {}", cluster.name, label, shown),
        )
        .with_detail(OutcomeDetail::Probe { url: url.to_string(), route, status })
    }

    /// HTML surface of Prometheus (`targets`, `graph`).
    pub async fn probe_prometheus_ui(&self, cluster: &ClusterDescriptor, check: &str, path: &str) -> Vec<CheckOutcome> {
        let label = format!("Prometheus {}", path);
        let direct = self.prometheus_direct(cluster, path);
        let proxy = self.prometheus_proxy(cluster, path);

        let answer = self.get(&direct, &[], Route::Direct).await;
        let mut outcomes = Vec::new();
        match answer {
            Answer::Transport(ref e) => {
                debug!("Direct {} unreachable ({}), trying proxy", direct, e);
                let proxied = self.get(&proxy, &[], Route::Proxy).await;
                outcomes.push(self.status_outcome(cluster, check, &label, &proxy, Route::Proxy, &proxied));
            }
            ref answered => {
                outcomes.push(self.status_outcome(cluster, check, &label, &direct, Route::Direct, answered));
                if self.settings.probe_via_proxy {
                    let proxied = self.get(&proxy, &[], Route::Proxy).await;
                    outcomes.push(self.status_outcome(
                        cluster,
                        &format!("{}-proxy", check),
                        &format!("{} (proxy)", label),
                        &proxy,
                        Route::Proxy,
                        &proxied,
                    ));
                }
            }
        }
        outcomes
    }

    /// Tracing search UI, only exposed through the management proxy.
    pub async fn probe_tracing(&self, cluster: &ClusterDescriptor) -> CheckOutcome {
        let url = format!("{}/{}", proxy_base(&self.settings.management_root, &cluster.id), TRACING_SEARCH_PATH);
        let answer = self.get(&url, &[], Route::Proxy).await;
        self.status_outcome(cluster, TRACING_CHECK, "Jaeger", &url, Route::Proxy, &answer)
    }

    /// Utilization, targets, graph and tracing, in that order.
    pub async fn probe_cluster(&self, cluster: &ClusterDescriptor) -> Result<Vec<CheckOutcome>> {
        let mut outcomes = vec![self.probe_utilization(cluster).await];
        outcomes.extend(self.probe_prometheus_ui(cluster, TARGETS_CHECK, "targets").await);
        outcomes.extend(self.probe_prometheus_ui(cluster, GRAPH_CHECK, "graph").await);
        outcomes.push(self.probe_tracing(cluster).await);
        Ok(outcomes)
    }

    /// True when every required dashboard title is listed by Grafana's search API.
    async fn dashboards_present(&self, search_url: &str) -> bool {
        let response = match self.http.get(search_url).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!("Dashboard search {} failed: {}", search_url, e);
                return false;
            }
        };
        let Ok(Value::Array(entries)) = response.json::<Value>().await else {
            return false;
        };
        let titles: Vec<&str> = entries
            .iter()
            .filter_map(|e| e.get("title").and_then(Value::as_str))
            .collect();
        self.settings
            .required_dashboards
            .iter()
            .all(|required| titles.contains(&required.as_str()))
    }

    /// Direct ingress of Prometheus, Alertmanager and Grafana, plus Grafana's dashboards.
    pub async fn probe_monitoring_ingress(&self, cluster: &ClusterDescriptor) -> Result<Vec<CheckOutcome>> {
        let base = format!("{}/monitoring/", cluster.ingress_base);
        let mut outcomes = Vec::new();

        for component in ["prometheus", "alertmanager", "grafana"] {
            let url = format!("{}{}/", base, component);
            let answer = self.get(&url, &[], Route::Direct).await;
            let status = match answer {
                Answer::Status { status, .. } => Some(status),
                Answer::Transport(_) => None,
            };
            let detail = OutcomeDetail::Probe { url: url.clone(), route: Route::Direct, status };
            let dashboards_missing = component == "grafana"
                && status == Some(200)
                && !self.dashboards_present(&format!("{}api/search", url)).await;

            let outcome = match status {
                None => CheckOutcome::failure(&cluster.name, INGRESS_CHECK, format!("URL {} not found", url)),
                Some(_) if dashboards_missing => {
                    CheckOutcome::warning(&cluster.name, INGRESS_CHECK, format!("{} dashboards missing", url))
                }
                Some(status) => CheckOutcome::new(
                    &cluster.name,
                    INGRESS_CHECK,
                    classify_status(status),
                    format!("{} returned HTTP {}", url, status),
                ),
            };
            outcomes.push(outcome.with_detail(detail));
        }

        Ok(outcomes)
    }
}
