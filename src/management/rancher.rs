use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{DaemonSetRecord, Fetch, ManagedNode, ManagementApi, ProjectRecord, WorkloadRecord};
use crate::kubernetes::{self, DownstreamSettings};
use crate::types::{management_root, ClusterDescriptor, Config};

/// Management client: v3 REST calls over reqwest, in-cluster resources over kube.
pub struct RancherClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    downstream: DownstreamSettings,
    clients: Mutex<HashMap<String, kube::Client>>,
}

impl RancherClient {
    pub fn new(config: &Config) -> Result<Self> {
        Self::from_parts(
            &config.management_url,
            &config.management_token,
            config.request_timeout,
            config.verify_tls,
        )
    }

    pub fn from_parts(base_url: &str, token: &str, timeout: Duration, verify_tls: bool) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .context("Failed to build management HTTP client")?;
        let base_url = base_url.trim_end_matches('/').to_string();
        Ok(Self {
            http,
            downstream: DownstreamSettings {
                management_root: management_root(&base_url),
                token: token.to_string(),
                timeout,
                verify_tls,
            },
            base_url,
            token: token.to_string(),
            clients: Mutex::new(HashMap::new()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET a v3 collection and unwrap its `data` envelope.
    pub async fn get_collection<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Fetch<Vec<T>> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {} {:?}", url, query);

        let response = match self.http.get(&url).bearer_auth(&self.token).query(query).send().await {
            Ok(r) => r,
            Err(e) => return Fetch::Unreachable(format!("GET {} failed: {}", url, e)),
        };
        let status = response.status();
        if !status.is_success() {
            return Fetch::Unreachable(format!("GET {} returned HTTP {}", url, status.as_u16()));
        }
        let mut body: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) => return Fetch::Malformed(format!("GET {} returned non-JSON body: {}", url, e)),
        };
        let items = match body.get_mut("data") {
            Some(data) => data.take(),
            None => body,
        };
        match serde_json::from_value(items) {
            Ok(items) => Fetch::Fetched(items),
            Err(e) => Fetch::Malformed(format!("GET {} returned an unexpected collection: {}", url, e)),
        }
    }

    fn downstream(&self, cluster_id: &str) -> Result<kube::Client> {
        let mut clients = self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(client) = clients.get(cluster_id) {
            return Ok(client.clone());
        }
        let client = kubernetes::downstream_client(&self.downstream, cluster_id)?;
        clients.insert(cluster_id.to_string(), client.clone());
        Ok(client)
    }
}

fn from_kube<T>(result: kube::Result<T>, what: &str) -> Fetch<T> {
    match result {
        Ok(value) => Fetch::Fetched(value),
        Err(kube::Error::SerdeError(e)) => Fetch::Malformed(format!("{}: {}", what, e)),
        Err(e) => Fetch::Unreachable(format!("{}: {}", what, e)),
    }
}

#[async_trait]
impl ManagementApi for RancherClient {
    async fn nodes(&self, cluster: &ClusterDescriptor) -> Fetch<Vec<ManagedNode>> {
        self.get_collection(&format!("/clusters/{}/nodes", cluster.id), &[]).await
    }

    async fn system_project(&self, cluster: &ClusterDescriptor) -> Fetch<String> {
        let projects: Fetch<Vec<ProjectRecord>> = self
            .get_collection(&format!("/clusters/{}/projects", cluster.id), &[("name", "System")])
            .await;
        match projects {
            Fetch::Fetched(projects) => match projects.into_iter().next() {
                Some(project) => Fetch::Fetched(project.id),
                None => Fetch::Unreachable(format!("cluster {} has no System project", cluster.name)),
            },
            Fetch::Unreachable(reason) => Fetch::Unreachable(reason),
            Fetch::Malformed(reason) => Fetch::Malformed(reason),
        }
    }

    async fn daemon_sets(&self, project_id: &str, name: &str) -> Fetch<Vec<DaemonSetRecord>> {
        self.get_collection(&format!("/projects/{}/daemonsets", project_id), &[("name", name)])
            .await
    }

    async fn workloads(&self, project_id: &str, namespace: &str) -> Fetch<Vec<WorkloadRecord>> {
        self.get_collection(&format!("/projects/{}/workloads", project_id), &[("namespaceId", namespace)])
            .await
    }

    async fn pods(&self, cluster: &ClusterDescriptor, namespace: &str, label_selector: &str) -> Fetch<Vec<Pod>> {
        let client = match self.downstream(&cluster.id) {
            Ok(c) => c,
            Err(e) => return Fetch::Unreachable(format!("{:#}", e)),
        };
        from_kube(
            kubernetes::list_labelled_pods(&client, namespace, label_selector).await,
            &format!("list pods {} in {}", label_selector, namespace),
        )
    }

    async fn pod(&self, cluster: &ClusterDescriptor, namespace: &str, name: &str) -> Fetch<Pod> {
        let client = match self.downstream(&cluster.id) {
            Ok(c) => c,
            Err(e) => return Fetch::Unreachable(format!("{:#}", e)),
        };
        from_kube(
            kubernetes::get_pod(&client, namespace, name).await,
            &format!("get pod {}/{}", namespace, name),
        )
    }

    async fn pod_logs(
        &self,
        cluster: &ClusterDescriptor,
        namespace: &str,
        name: &str,
        since_seconds: i64,
    ) -> Fetch<Vec<String>> {
        let client = match self.downstream(&cluster.id) {
            Ok(c) => c,
            Err(e) => return Fetch::Unreachable(format!("{:#}", e)),
        };
        from_kube(
            kubernetes::recent_pod_logs(&client, namespace, name, since_seconds).await,
            &format!("logs of {}/{}", namespace, name),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::collections::BTreeMap;

    fn cluster() -> ClusterDescriptor {
        ClusterDescriptor {
            name: "prod".to_string(),
            id: "c-abc".to_string(),
            state: "active".to_string(),
            node_count: 3,
            ingress_base: "https://prod.example.com".to_string(),
            environment: BTreeMap::new(),
        }
    }

    fn client(server: &mockito::Server) -> RancherClient {
        RancherClient::from_parts(&format!("{}/v3", server.url()), "token-x", Duration::from_secs(2), false).unwrap()
    }

    #[tokio::test]
    async fn test_nodes_unwraps_data_envelope() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v3/clusters/c-abc/nodes")
            .match_header("authorization", "Bearer token-x")
            .with_status(200)
            .with_body(r#"{"type":"collection","data":[{"nodeName":"w1","conditions":[{"type":"Ready","status":"True"}]}]}"#)
            .create_async()
            .await;

        let nodes = client(&server).nodes(&cluster()).await.ok().unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].node_name, "w1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_system_project_and_query_params() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v3/clusters/c-abc/projects")
            .match_query(Matcher::UrlEncoded("name".into(), "System".into()))
            .with_status(200)
            .with_body(r#"{"data":[{"id":"c-abc:p-sys"}]}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/v3/projects/c-abc:p-sys/daemonsets")
            .match_query(Matcher::UrlEncoded("name".into(), "canal".into()))
            .with_status(200)
            .with_body(r#"{"data":[]}"#)
            .create_async()
            .await;

        let api = client(&server);
        let project = api.system_project(&cluster()).await;
        assert_eq!(project, Fetch::Fetched("c-abc:p-sys".to_string()));
        assert_eq!(api.daemon_sets("c-abc:p-sys", "canal").await, Fetch::Fetched(vec![]));
    }

    #[tokio::test]
    async fn test_error_statuses_and_bodies() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v3/clusters/c-abc/nodes")
            .with_status(503)
            .create_async()
            .await;
        server
            .mock("GET", "/v3/projects/p1/workloads")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>login</html>")
            .create_async()
            .await;

        let api = client(&server);
        assert!(matches!(api.nodes(&cluster()).await, Fetch::Unreachable(r) if r.contains("503")));
        assert!(matches!(api.workloads("p1", "cattle-monitoring-system").await, Fetch::Malformed(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let api = RancherClient::from_parts("http://127.0.0.1:1/v3", "t", Duration::from_secs(1), false).unwrap();
        assert!(matches!(api.nodes(&cluster()).await, Fetch::Unreachable(_)));
    }
}
