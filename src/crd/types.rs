//! Shared types for the ManagedClusterInfo status
//!
//! These types describe the facts the agent observes on a managed cluster:
//! where its API is reachable, which distribution it runs, and what its node
//! fleet looks like.
//!
//! # Type Hierarchy
//!
//! - [`MasterEndpoint`] - externally reachable agent/API endpoint and where it came from
//! - [`ApiServerAddress`] - advisory API server address for display
//! - [`DistributionInfo`] - distribution type, version, channel and upgrade metadata
//! - [`NodeSummary`] - reduced node inventory
//! - [`Condition`] - Kubernetes-style condition entries

use std::collections::{BTreeMap, BTreeSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Which resolver strategy produced the master endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum EndpointSource {
    /// Preconfigured agent address
    Static,
    /// External ingress point of a LoadBalancer service
    LoadBalancerService,
    /// Single host rule of an Ingress
    Ingress,
    /// Host of an OpenShift Route
    Route,
}

impl std::fmt::Display for EndpointSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointSource::Static => write!(f, "Static"),
            EndpointSource::LoadBalancerService => write!(f, "LoadBalancerService"),
            EndpointSource::Ingress => write!(f, "Ingress"),
            EndpointSource::Route => write!(f, "Route"),
        }
    }
}

/// Network location at which the cluster is reachable from outside
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MasterEndpoint {
    pub address: String,
    pub port: i32,
    pub source: EndpointSource,
    /// `https://address:port`
    pub url: String,
}

/// API server address as reported by the console config or the
/// `default/kubernetes` endpoints
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiServerAddress {
    pub address: String,
    pub port: i32,
}

/// Kubernetes distribution family
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum DistributionType {
    /// Any cluster without a ClusterVersion object
    #[default]
    Generic,
    /// OpenShift 4.x, detected through `config.openshift.io/v1` ClusterVersion
    EnterprisePlatform,
}

impl std::fmt::Display for DistributionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistributionType::Generic => write!(f, "Generic"),
            DistributionType::EnterprisePlatform => write!(f, "EnterprisePlatform"),
        }
    }
}

/// A release the cluster is, or could be, upgraded to
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRef {
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DistributionInfo {
    #[serde(rename = "type")]
    pub type_: DistributionType,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired_update: Option<UpdateRef>,
    /// Most-recent-first, deduplicated by version, bounded length
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_updates: Vec<UpdateRef>,
    #[serde(default, rename = "clusterID")]
    pub cluster_id: String,
    /// True while the platform reports a `Failing=True` upgrade condition
    #[serde(default)]
    pub upgrade_failed: bool,
}

impl DistributionInfo {
    pub fn generic() -> Self {
        Self::default()
    }
}

/// Kubernetes vendor derived from the version string and distribution
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[allow(clippy::upper_case_acronyms)]
pub enum KubeVendor {
    OpenShift,
    EKS,
    GKE,
    IKS,
    AKS,
    Other,
}

/// Infrastructure vendor derived from node provider ids
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[allow(clippy::upper_case_acronyms)]
pub enum CloudVendor {
    Amazon,
    Google,
    Azure,
    IBM,
    VSphere,
    OpenStack,
    BareMetal,
    Other,
}

/// Capacity of a single node, as raw Kubernetes quantities
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeCapacity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeDetail {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub capacity: NodeCapacity,
    pub ready: bool,
}

/// Reduced view of the cluster's nodes
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeSummary {
    pub count: i32,
    pub ready_count: i32,
    #[serde(default)]
    pub architectures: BTreeSet<String>,
    #[serde(default)]
    pub operating_systems: BTreeSet<String>,
    /// Roles taken from `node-role.kubernetes.io/<role>` labels
    #[serde(default)]
    pub roles: BTreeSet<String>,
    /// Whether any node carries `node-role.kubernetes.io/worker`
    #[serde(default)]
    pub worker_label_present: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<NodeDetail>,
}

/// Condition for status reporting (Kubernetes convention)
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., "Synced")
    #[serde(rename = "type")]
    pub type_: String,
    /// Status of the condition: "True", "False", or "Unknown"
    pub status: String,
    /// Last time the condition's status changed
    pub last_transition_time: String,
    /// Machine-readable reason for the condition
    pub reason: String,
    /// Human-readable message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
