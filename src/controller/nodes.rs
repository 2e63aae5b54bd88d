//! Node inventory summary
//!
//! Lists every node in a single call and reduces the list to the
//! architecture / OS / role buckets and ready count shown in status. The
//! summary is all-or-nothing: a list failure yields no partial summary.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Node;
use tracing::debug;

use super::cluster_client::ClusterReader;
use super::vendor::cloud_vendor;
use crate::crd::{CloudVendor, NodeCapacity, NodeDetail, NodeSummary};
use crate::error::Result;

/// Upper bound on the per-node detail list kept in status
pub const MAX_NODE_DETAILS: usize = 200;

pub const LABEL_ARCH: &str = "kubernetes.io/arch";
pub const LABEL_ARCH_BETA: &str = "beta.kubernetes.io/arch";
pub const LABEL_OS: &str = "kubernetes.io/os";
pub const LABEL_OS_BETA: &str = "beta.kubernetes.io/os";
pub const LABEL_ROLE_PREFIX: &str = "node-role.kubernetes.io/";
pub const LABEL_WORKER_ROLE: &str = "node-role.kubernetes.io/worker";

const DETAIL_LABELS: &[&str] = &[
    LABEL_ARCH,
    LABEL_OS,
    "node.kubernetes.io/instance-type",
    "topology.kubernetes.io/region",
    "topology.kubernetes.io/zone",
];

fn label<'a>(labels: &'a BTreeMap<String, String>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| labels.get(*k))
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

fn is_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| {
            conds
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

fn detail(node: &Node, labels: &BTreeMap<String, String>, ready: bool) -> NodeDetail {
    let capacity = node.status.as_ref().and_then(|s| s.capacity.as_ref());
    NodeDetail {
        name: node.metadata.name.clone().unwrap_or_default(),
        labels: labels
            .iter()
            .filter(|(k, _)| DETAIL_LABELS.contains(&k.as_str()) || k.starts_with(LABEL_ROLE_PREFIX))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        capacity: NodeCapacity {
            cpu: capacity.and_then(|c| c.get("cpu")).map(|q| q.0.clone()),
            memory: capacity.and_then(|c| c.get("memory")).map(|q| q.0.clone()),
        },
        ready,
    }
}

/// Reduce a node list to its summary
pub fn summarize_nodes(nodes: &[Node]) -> NodeSummary {
    let empty = BTreeMap::new();
    let mut summary = NodeSummary::default();

    for node in nodes {
        let labels = node.metadata.labels.as_ref().unwrap_or(&empty);
        let ready = is_ready(node);

        summary.count += 1;
        if ready {
            summary.ready_count += 1;
        }
        if let Some(arch) = label(labels, &[LABEL_ARCH, LABEL_ARCH_BETA]) {
            summary.architectures.insert(arch.to_string());
        }
        if let Some(os) = label(labels, &[LABEL_OS, LABEL_OS_BETA]) {
            summary.operating_systems.insert(os.to_string());
        }
        for role in labels
            .keys()
            .filter_map(|k| k.strip_prefix(LABEL_ROLE_PREFIX))
            .filter(|r| !r.is_empty())
        {
            summary.roles.insert(role.to_string());
        }
        summary.worker_label_present |= labels.contains_key(LABEL_WORKER_ROLE);

        if summary.nodes.len() < MAX_NODE_DETAILS {
            summary.nodes.push(detail(node, labels, ready));
        }
    }

    summary
}

/// Everything derived from one node listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeInventory {
    pub summary: NodeSummary,
    pub cloud_vendor: CloudVendor,
}

/// List the cluster's nodes and summarize them
pub async fn summarize(cluster: &dyn ClusterReader) -> Result<NodeInventory> {
    let nodes = cluster.list_nodes().await?;
    let summary = summarize_nodes(&nodes);
    debug!(
        "Summarized {} nodes ({} ready, roles {:?})",
        summary.count, summary.ready_count, summary.roles
    );
    Ok(NodeInventory {
        summary,
        cloud_vendor: cloud_vendor(&nodes),
    })
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::{NodeCondition, NodeStatus};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use kube::api::ObjectMeta;

    use super::*;
    use crate::controller::cluster_client::MockClusterReader;
    use crate::error::Error;

    fn node(name: &str, labels: &[(&str, &str)], ready: Option<&str>) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            status: Some(NodeStatus {
                capacity: Some(BTreeMap::from([
                    ("cpu".to_string(), Quantity("4".to_string())),
                    ("memory".to_string(), Quantity("16Gi".to_string())),
                ])),
                conditions: ready.map(|status| {
                    vec![NodeCondition {
                        type_: "Ready".to_string(),
                        status: status.to_string(),
                        ..Default::default()
                    }]
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_summarize_mixed_fleet() {
        let nodes = vec![
            node(
                "node1",
                &[
                    (LABEL_ARCH, "amd64"),
                    (LABEL_OS, "linux"),
                    (LABEL_WORKER_ROLE, ""),
                    ("node.openshift.io/os_id", "rhcos"),
                ],
                Some("True"),
            ),
            node(
                "node2",
                &[
                    (LABEL_ARCH_BETA, "arm64"),
                    (LABEL_OS, "linux"),
                    ("node-role.kubernetes.io/master", ""),
                ],
                Some("False"),
            ),
            node("node3", &[], None),
        ];

        let summary = summarize_nodes(&nodes);
        assert_eq!(summary.count, 3);
        assert_eq!(summary.ready_count, 1);
        assert_eq!(
            summary.architectures.iter().collect::<Vec<_>>(),
            vec!["amd64", "arm64"]
        );
        assert_eq!(summary.operating_systems.len(), 1);
        assert!(summary.roles.contains("worker"));
        assert!(summary.roles.contains("master"));
        assert!(summary.worker_label_present);

        let first = &summary.nodes[0];
        assert_eq!(first.name, "node1");
        assert!(first.ready);
        assert_eq!(first.capacity.cpu.as_deref(), Some("4"));
        assert_eq!(first.capacity.memory.as_deref(), Some("16Gi"));
        assert!(first.labels.contains_key(LABEL_WORKER_ROLE));
        assert!(!first.labels.contains_key("node.openshift.io/os_id"));
    }

    #[test]
    fn test_ready_condition_without_status_is_not_ready() {
        let mut n = node("node1", &[], None);
        n.status.as_mut().unwrap().conditions = Some(vec![NodeCondition {
            type_: "Ready".to_string(),
            ..Default::default()
        }]);
        assert_eq!(summarize_nodes(&[n]).ready_count, 0);
    }

    #[test]
    fn test_empty_cluster() {
        let summary = summarize_nodes(&[]);
        assert_eq!(summary.count, 0);
        assert!(!summary.worker_label_present);
        assert!(summary.nodes.is_empty());
    }

    #[test]
    fn test_node_details_are_capped() {
        let nodes: Vec<Node> = (0..MAX_NODE_DETAILS + 5)
            .map(|i| node(&format!("node{i}"), &[], Some("True")))
            .collect();
        let summary = summarize_nodes(&nodes);
        assert_eq!(summary.count as usize, MAX_NODE_DETAILS + 5);
        assert_eq!(summary.nodes.len(), MAX_NODE_DETAILS);
    }

    #[tokio::test]
    async fn test_summarize_lists_once() {
        let mut cluster = MockClusterReader::new();
        cluster
            .expect_list_nodes()
            .times(1)
            .returning(|| Ok(vec![node("node1", &[(LABEL_ARCH, "amd64")], Some("True"))]));

        let inventory = summarize(&cluster).await.unwrap();
        assert_eq!(inventory.summary.count, 1);
        assert_eq!(inventory.summary.ready_count, 1);
        assert_eq!(inventory.cloud_vendor, CloudVendor::Other);
    }

    #[tokio::test]
    async fn test_list_failure_yields_no_summary() {
        let mut cluster = MockClusterReader::new();
        cluster
            .expect_list_nodes()
            .returning(|| Err(Error::DecodeError("connection refused".to_string())));
        assert!(summarize(&cluster).await.is_err());
    }
}
