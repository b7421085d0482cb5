use anyhow::Result;
use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, warn};

use super::not_reachable;
use crate::anomaly::analyze_lines;
use crate::kubernetes::first_container_image_tag;
use crate::management::{Fetch, ManagementApi};
use crate::types::{CheckOutcome, ClusterDescriptor, OutcomeDetail, PodAnomaly, RevisionSummary};

pub const REVISION_CHECK: &str = "istiod-revisions";
pub const LOG_CHECK: &str = "istiod-logs";
pub const ISTIO_NAMESPACE: &str = "istio-system";
pub const ISTIOD_SELECTOR: &str = "app=istiod";
pub const REVISION_LABEL: &str = "istio.io/rev";
pub const LOG_WINDOW_SECONDS: i64 = 70;

const UNLABELLED_REVISION: &str = "none";

/// Pods grouped by revision label, in first-seen order.
pub fn revision_distribution(pods: &[Pod]) -> Vec<RevisionSummary> {
    let mut revisions: Vec<RevisionSummary> = Vec::new();

    for pod in pods {
        let revision = pod
            .metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(REVISION_LABEL))
            .map(String::as_str)
            .unwrap_or(UNLABELLED_REVISION);
        let tag = first_container_image_tag(pod);

        let idx = match revisions.iter().position(|r| r.revision == revision) {
            Some(idx) => idx,
            None => {
                revisions.push(RevisionSummary {
                    revision: revision.to_string(),
                    pods: 0,
                    image_tags: Vec::new(),
                });
                revisions.len() - 1
            }
        };
        let entry = &mut revisions[idx];
        entry.pods += 1;
        if let Some(tag) = tag {
            if !entry.image_tags.contains(&tag) {
                entry.image_tags.push(tag);
            }
        }
    }

    revisions
}

/// Distinct trace messages across all pods, first occurrence wins.
pub fn distinct_traces(records: &[PodAnomaly]) -> Vec<String> {
    let mut traces: Vec<String> = Vec::new();
    for record in records {
        if !traces.contains(&record.record.trace) {
            traces.push(record.record.trace.clone());
        }
    }
    traces
}

pub fn evaluate_log_anomalies(cluster: &ClusterDescriptor, records: Vec<PodAnomaly>) -> CheckOutcome {
    if records.is_empty() {
        return CheckOutcome::success(
            &cluster.name,
            LOG_CHECK,
            format!("Cluster {} passed istiod logs", cluster.name),
        );
    }

    let distinct = distinct_traces(&records);
    CheckOutcome::warning(
        &cluster.name,
        LOG_CHECK,
        format!("Cluster {} has failed istiod logs {:?}", cluster.name, distinct),
    )
    .with_detail(OutcomeDetail::LogAnomaly { distinct_traces: distinct, records })
}

pub async fn check_istiod(api: &dyn ManagementApi, cluster: &ClusterDescriptor) -> Result<Vec<CheckOutcome>> {
    let pods = match api.pods(cluster, ISTIO_NAMESPACE, ISTIOD_SELECTOR).await {
        Fetch::Fetched(pods) => pods,
        other => return Ok(vec![not_reachable(cluster, REVISION_CHECK, other.reason().unwrap_or_default())]),
    };
    if pods.is_empty() {
        return Ok(vec![CheckOutcome::failure(
            &cluster.name,
            REVISION_CHECK,
            format!("Cluster {} deployed too few istiod pods", cluster.name),
        )]);
    }

    let mut outcomes: Vec<CheckOutcome> = revision_distribution(&pods)
        .into_iter()
        .map(|summary| {
            CheckOutcome::success(
                &cluster.name,
                REVISION_CHECK,
                format!(
                    "Cluster {} deployed {} {}-istiod pods with image tags {:?}",
                    cluster.name, summary.pods, summary.revision, summary.image_tags
                ),
            )
            .with_detail(OutcomeDetail::IstiodRevision(summary))
        })
        .collect();

    let mut anomalies = Vec::new();
    let mut unreadable = Vec::new();
    for name in pods.iter().filter_map(|p| p.metadata.name.as_deref()) {
        match api.pod_logs(cluster, ISTIO_NAMESPACE, name, LOG_WINDOW_SECONDS).await {
            Fetch::Fetched(lines) => {
                debug!("Analyzing {} log lines of {}", lines.len(), name);
                anomalies.extend(analyze_lines(&lines).into_iter().map(|record| PodAnomaly {
                    pod: name.to_string(),
                    record,
                }));
            }
            other => {
                let reason = other.reason().unwrap_or_default();
                warn!("Cluster {}: no logs for {} ({})", cluster.name, name, reason);
                unreadable.push(format!("{}: {}", name, reason));
            }
        }
    }

    // a clean verdict needs every pod's logs
    if unreadable.is_empty() || !anomalies.is_empty() {
        outcomes.push(evaluate_log_anomalies(cluster, anomalies));
    }
    if !unreadable.is_empty() {
        outcomes.push(not_reachable(cluster, LOG_CHECK, &unreadable.join(", ")));
    }

    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testing::{cluster, pod, FakeApi};
    use crate::types::Severity;

    fn istiod(name: &str, rev: Option<&str>, image: &str) -> Pod {
        let labels: Vec<(&str, &str)> = match rev {
            Some(rev) => vec![("app", "istiod"), (REVISION_LABEL, rev)],
            None => vec![("app", "istiod")],
        };
        pod(name, &labels, image, None)
    }

    #[test]
    fn test_revision_distribution() {
        let pods = vec![
            istiod("istiod-1-20-a", Some("1-20"), "docker.io/istio/pilot:1.20.3"),
            istiod("istiod-1-19-a", Some("1-19"), "docker.io/istio/pilot:1.19.7"),
            istiod("istiod-1-20-b", Some("1-20"), "docker.io/istio/pilot:1.20.3"),
            istiod("istiod-1-20-c", Some("1-20"), "docker.io/istio/pilot:1.20.4"),
            istiod("istiod-x", None, "docker.io/istio/pilot:1.18.0"),
        ];

        let revisions = revision_distribution(&pods);
        assert_eq!(revisions.len(), 3);
        assert_eq!(revisions[0].revision, "1-20");
        assert_eq!(revisions[0].pods, 3);
        assert_eq!(revisions[0].image_tags, vec!["1.20.3", "1.20.4"]);
        assert_eq!(revisions[1].revision, "1-19");
        assert_eq!(revisions[2].revision, "none");
    }

    #[tokio::test]
    async fn test_too_few_pods() {
        let api = FakeApi::default().with_pods(ISTIO_NAMESPACE, ISTIOD_SELECTOR, vec![]);
        let outcomes = check_istiod(&api, &cluster("prod", 3)).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].severity, Severity::Failure);
        assert!(outcomes[0].message.contains("too few istiod pods"));
    }

    #[tokio::test]
    async fn test_log_anomalies_aggregate_distinct_traces() {
        let api = FakeApi::default()
            .with_pods(
                ISTIO_NAMESPACE,
                ISTIOD_SELECTOR,
                vec![
                    istiod("istiod-a", Some("1-20"), "pilot:1.20.3"),
                    istiod("istiod-b", Some("1-20"), "pilot:1.20.3"),
                ],
            )
            .with_logs(
                "istiod-a",
                &[
                    "2024-05-01T10:00:00Z\tinfo\tads\tPush debounce stable",
                    "2024-05-01T10:00:01Z\twarn\tads\tcertificate expiring",
                ],
            )
            .with_logs(
                "istiod-b",
                &[
                    "2024-05-01T10:00:02Z\terror\tads\tconnection reset",
                    "2024-05-01T10:00:03Z\tWARN\tads\tcertificate expiring",
                ],
            );

        let outcomes = check_istiod(&api, &cluster("prod", 3)).await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].severity, Severity::Success);
        assert!(outcomes[0].message.contains("deployed 2 1-20-istiod pods"));

        let logs = &outcomes[1];
        assert_eq!(logs.severity, Severity::Warning);
        match &logs.detail {
            OutcomeDetail::LogAnomaly { distinct_traces, records } => {
                assert_eq!(distinct_traces, &vec!["certificate expiring".to_string(), "connection reset".to_string()]);
                assert_eq!(records.len(), 3);
                assert_eq!(records[0].pod, "istiod-a");
                assert_eq!(records[2].record.level, "warn");
            }
            other => panic!("unexpected detail {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_clean_logs_pass() {
        let api = FakeApi::default()
            .with_pods(ISTIO_NAMESPACE, ISTIOD_SELECTOR, vec![istiod("istiod-a", Some("default"), "pilot:1.20.3")])
            .with_logs("istiod-a", &["2024-05-01T10:00:00Z\tinfo\tads\tPush debounce stable"]);

        let outcomes = check_istiod(&api, &cluster("prod", 3)).await.unwrap();
        assert_eq!(outcomes.last().unwrap().severity, Severity::Success);
        assert_eq!(outcomes.last().unwrap().check, LOG_CHECK);
    }

    #[tokio::test]
    async fn test_unreadable_logs_fail_instead_of_passing() {
        let api = FakeApi::default().with_pods(
            ISTIO_NAMESPACE,
            ISTIOD_SELECTOR,
            vec![istiod("istiod-a", Some("default"), "pilot:1.20.3")],
        );

        let outcomes = check_istiod(&api, &cluster("prod", 3)).await.unwrap();
        let logs: Vec<&CheckOutcome> = outcomes.iter().filter(|o| o.check == LOG_CHECK).collect();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].severity, Severity::Failure);
        assert!(logs[0].message.contains("not reachable"));
        match &logs[0].detail {
            OutcomeDetail::CheckError { error } => assert!(error.contains("istiod-a")),
            other => panic!("unexpected detail {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_partial_logs_keep_anomalies_and_fail_missing_pod() {
        let api = FakeApi::default()
            .with_pods(
                ISTIO_NAMESPACE,
                ISTIOD_SELECTOR,
                vec![
                    istiod("istiod-a", Some("default"), "pilot:1.20.3"),
                    istiod("istiod-b", Some("default"), "pilot:1.20.3"),
                ],
            )
            .with_logs("istiod-a", &["2024-05-01T10:00:01Z\twarn\tads\tcertificate expiring"]);

        let outcomes = check_istiod(&api, &cluster("prod", 3)).await.unwrap();
        let severities: Vec<Severity> = outcomes.iter().filter(|o| o.check == LOG_CHECK).map(|o| o.severity).collect();
        assert_eq!(severities, vec![Severity::Warning, Severity::Failure]);
        assert!(outcomes.iter().all(|o| o.check != LOG_CHECK || o.severity != Severity::Success));
    }
}
