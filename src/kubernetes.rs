use std::time::Duration;

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{ListParams, LogParams},
    Api, Client, Config,
};
use secrecy::SecretString;

/// Settings for reaching a downstream cluster's API server through the management plane.
#[derive(Debug, Clone)]
pub struct DownstreamSettings {
    pub management_root: String,
    pub token: String,
    pub timeout: Duration,
    pub verify_tls: bool,
}

pub fn proxy_base(management_root: &str, cluster_id: &str) -> String {
    format!("{}/k8s/clusters/{}", management_root, cluster_id)
}

/// kube client whose API server is `{root}/k8s/clusters/{id}`.
pub fn downstream_client(settings: &DownstreamSettings, cluster_id: &str) -> Result<Client> {
    let url = proxy_base(&settings.management_root, cluster_id);
    let mut config = Config::new(url.parse().with_context(|| format!("Invalid cluster proxy URL {}", url))?);
    config.auth_info.token = Some(SecretString::new(settings.token.clone()));
    config.accept_invalid_certs = !settings.verify_tls;
    config.connect_timeout = Some(settings.timeout);
    config.read_timeout = Some(settings.timeout);
    config.write_timeout = Some(settings.timeout);
    Client::try_from(config).with_context(|| format!("Failed to build client for cluster {}", cluster_id))
}

pub async fn list_labelled_pods(client: &Client, namespace: &str, label_selector: &str) -> kube::Result<Vec<Pod>> {
    let pod_api: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let pods = pod_api.list(&ListParams::default().labels(label_selector)).await?;
    Ok(pods.items)
}

pub async fn get_pod(client: &Client, namespace: &str, name: &str) -> kube::Result<Pod> {
    let pod_api: Api<Pod> = Api::namespaced(client.clone(), namespace);
    pod_api.get(name).await
}

pub async fn recent_pod_logs(client: &Client, namespace: &str, name: &str, since_seconds: i64) -> kube::Result<Vec<String>> {
    let pod_api: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let lp = LogParams {
        since_seconds: Some(since_seconds),
        ..LogParams::default()
    };
    let text = pod_api.logs(name, &lp).await?;
    Ok(text.lines().map(str::to_string).collect())
}

/// First container's declared `limits`, as plain strings.
pub fn first_container_limits(pod: &Pod) -> Option<(Option<String>, Option<String>)> {
    let limits = pod
        .spec
        .as_ref()?
        .containers
        .first()?
        .resources
        .as_ref()?
        .limits
        .as_ref()?;
    Some((
        limits.get("cpu").map(|q| q.0.clone()),
        limits.get("memory").map(|q| q.0.clone()),
    ))
}

/// Tag part of the first container's image (`docker.io/istio/pilot:1.20.3` -> `1.20.3`).
pub fn first_container_image_tag(pod: &Pod) -> Option<String> {
    let image = pod.spec.as_ref()?.containers.first()?.image.as_ref()?;
    image.rsplit(':').next().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, PodSpec, ResourceRequirements};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use std::collections::BTreeMap;

    fn pod_with(image: Option<&str>, limits: Option<BTreeMap<String, Quantity>>) -> Pod {
        Pod {
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "main".to_string(),
                    image: image.map(str::to_string),
                    resources: Some(ResourceRequirements {
                        limits,
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_proxy_base() {
        assert_eq!(
            proxy_base("https://rancher.example.com", "c-m-abc"),
            "https://rancher.example.com/k8s/clusters/c-m-abc"
        );
    }

    #[test]
    fn test_first_container_limits() {
        let mut limits = BTreeMap::new();
        limits.insert("cpu".to_string(), Quantity("2".to_string()));
        limits.insert("memory".to_string(), Quantity("50000Mi".to_string()));

        let pod = pod_with(None, Some(limits));
        assert_eq!(
            first_container_limits(&pod),
            Some((Some("2".to_string()), Some("50000Mi".to_string())))
        );

        assert_eq!(first_container_limits(&pod_with(None, None)), None);
        assert_eq!(first_container_limits(&Pod::default()), None);
    }

    #[test]
    fn test_first_container_image_tag() {
        let pod = pod_with(Some("docker.io/istio/pilot:1.20.3"), None);
        assert_eq!(first_container_image_tag(&pod), Some("1.20.3".to_string()));

        let pod = pod_with(Some("pilot"), None);
        assert_eq!(first_container_image_tag(&pod), Some("pilot".to_string()));

        assert_eq!(first_container_image_tag(&pod_with(None, None)), None);
    }
}
