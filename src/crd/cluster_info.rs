//! ManagedClusterInfo Custom Resource Definition
//!
//! One ManagedClusterInfo exists per managed cluster. The hub owns the
//! object; this agent only ever writes its status subresource.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    ApiServerAddress, CloudVendor, Condition, DistributionInfo, KubeVendor, MasterEndpoint,
    NodeSummary,
};

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "internal.open-cluster-management.io",
    version = "v1beta1",
    kind = "ManagedClusterInfo",
    namespaced,
    status = "ManagedClusterInfoStatus",
    shortname = "mci",
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".status.kubernetesVersion"}"#,
    printcolumn = r#"{"name":"Distribution","type":"string","jsonPath":".status.distribution.type"}"#,
    printcolumn = r#"{"name":"Synced","type":"string","jsonPath":".status.conditions[?(@.type=='Synced')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterInfoSpec {
    /// CA bundle the hub uses when talking to the agent endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging_ca: Option<String>,
}

/// Observed facts about the managed cluster
///
/// Every field is optional so that a probe that has never succeeded leaves
/// no trace, and a probe that fails later keeps its last known value.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterInfoStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_endpoint: Option<MasterEndpoint>,

    /// Advisory API server address for display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_server: Option<ApiServerAddress>,

    #[serde(rename = "consoleURL", skip_serializing_if = "Option::is_none")]
    pub console_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubernetes_version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kube_vendor: Option<KubeVendor>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_vendor: Option<CloudVendor>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution: Option<DistributionInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_summary: Option<NodeSummary>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Holds exactly one `Synced` entry once the first pass completed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
