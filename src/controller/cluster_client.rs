//! Kubernetes access used by the cluster info controller
//!
//! Two seams are exposed as traits so reconciliation can be exercised
//! without an API server:
//!
//! - [`ClusterInfoStore`] reads and writes `ManagedClusterInfo` objects
//! - [`ClusterReader`] reads the facts of the managed cluster itself
//!
//! Lookups that may legitimately find nothing return `Ok(None)`; only
//! transport and server failures are errors.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Endpoints, Node, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::{
    api::{Api, ApiResource, DynamicObject, GroupVersionKind, PostParams},
    Client, ResourceExt,
};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::config::NamespacedName;
use crate::crd::{ManagedClusterInfo, ManagedClusterInfoStatus};
use crate::error::{Error, Result};

const FIELD_MANAGER: &str = "clusterinfo-agent";

pub const CLUSTER_VERSION_GROUP: &str = "config.openshift.io";
pub const CLUSTER_VERSION_VERSION: &str = "v1";
pub const CLUSTER_VERSION_KIND: &str = "ClusterVersion";
pub const CLUSTER_VERSION_NAME: &str = "version";

const ROUTE_GROUP: &str = "route.openshift.io";
const ROUTE_VERSION: &str = "v1";
const ROUTE_KIND: &str = "Route";

/// Store for the reconciled `ManagedClusterInfo` objects
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterInfoStore: Send + Sync {
    /// Fetch the object, `None` when it no longer exists
    async fn get(&self, key: &NamespacedName) -> Result<Option<ManagedClusterInfo>>;

    /// Write `status` guarded by the object's resourceVersion
    ///
    /// Fails with [`Error::Conflict`] when the stored object has moved on.
    async fn update_status(
        &self,
        info: &ManagedClusterInfo,
        status: &ManagedClusterInfoStatus,
    ) -> Result<()>;
}

/// Read-only view of the managed cluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterReader: Send + Sync {
    async fn get_service(&self, key: &NamespacedName) -> Result<Option<Service>>;

    async fn get_ingress(&self, key: &NamespacedName) -> Result<Option<Ingress>>;

    /// OpenShift Route as an untyped object
    async fn get_route(&self, key: &NamespacedName) -> Result<Option<serde_json::Value>>;

    async fn get_config_map(&self, key: &NamespacedName) -> Result<Option<ConfigMap>>;

    async fn get_endpoints(&self, key: &NamespacedName) -> Result<Option<Endpoints>>;

    /// All nodes, in one unpaginated list call
    async fn list_nodes(&self) -> Result<Vec<Node>>;

    /// `gitVersion` reported by the API server's version endpoint
    async fn server_version(&self) -> Result<String>;

    /// The singleton ClusterVersion object, `None` when the object or its
    /// API group is absent
    async fn get_cluster_version(&self) -> Result<Option<serde_json::Value>>;
}

/// [`ClusterInfoStore`] backed by the hub API server
pub struct KubeClusterInfoStore {
    client: Client,
}

impl KubeClusterInfoStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterInfoStore for KubeClusterInfoStore {
    async fn get(&self, key: &NamespacedName) -> Result<Option<ManagedClusterInfo>> {
        let api: Api<ManagedClusterInfo> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get_opt(&key.name).await?)
    }

    async fn update_status(
        &self,
        info: &ManagedClusterInfo,
        status: &ManagedClusterInfoStatus,
    ) -> Result<()> {
        let namespace = info
            .namespace()
            .ok_or_else(|| Error::InvalidKey(format!("{} has no namespace", info.name_any())))?;
        let api: Api<ManagedClusterInfo> = Api::namespaced(self.client.clone(), &namespace);

        let body = status_replacement(info, status)?;
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };

        match api.replace_status(&info.name_any(), &params, body).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Err(Error::Conflict(format!(
                "{}/{}: {}",
                namespace,
                info.name_any(),
                ae.message
            ))),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                Err(Error::NotFound(format!("{}/{}", namespace, info.name_any())))
            }
            Err(e) => Err(Error::KubeError(e)),
        }
    }
}

/// Body of a status replace: the fetched object with `status` swapped in
///
/// The whole status is sent, so facts missing from `status` are removed
/// from the stored object. The fetched resourceVersion rides along in the
/// metadata and makes the write conditional.
fn status_replacement(
    info: &ManagedClusterInfo,
    status: &ManagedClusterInfoStatus,
) -> Result<Vec<u8>> {
    let mut obj = info.clone();
    obj.metadata.managed_fields = None;
    obj.status = Some(status.clone());
    Ok(serde_json::to_vec(&obj)?)
}

/// [`ClusterReader`] backed by the managed cluster's API server
pub struct KubeClusterReader {
    client: Client,
}

impl KubeClusterReader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api_resource(group: &str, version: &str, kind: &str) -> ApiResource {
        ApiResource::from_gvk(&GroupVersionKind {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
        })
    }
}

#[async_trait]
impl ClusterReader for KubeClusterReader {
    async fn get_service(&self, key: &NamespacedName) -> Result<Option<Service>> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get_opt(&key.name).await?)
    }

    async fn get_ingress(&self, key: &NamespacedName) -> Result<Option<Ingress>> {
        let api: Api<Ingress> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get_opt(&key.name).await?)
    }

    async fn get_route(&self, key: &NamespacedName) -> Result<Option<serde_json::Value>> {
        let ar = Self::api_resource(ROUTE_GROUP, ROUTE_VERSION, ROUTE_KIND);
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), &key.namespace, &ar);
        match api.get_opt(&key.name).await? {
            Some(obj) => Ok(Some(serde_json::to_value(obj)?)),
            None => Ok(None),
        }
    }

    async fn get_config_map(&self, key: &NamespacedName) -> Result<Option<ConfigMap>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get_opt(&key.name).await?)
    }

    async fn get_endpoints(&self, key: &NamespacedName) -> Result<Option<Endpoints>> {
        let api: Api<Endpoints> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get_opt(&key.name).await?)
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let nodes = api.list(&Default::default()).await?;
        Ok(nodes.items)
    }

    async fn server_version(&self) -> Result<String> {
        let info = self.client.apiserver_version().await?;
        Ok(info.git_version)
    }

    async fn get_cluster_version(&self) -> Result<Option<serde_json::Value>> {
        let ar = Self::api_resource(
            CLUSTER_VERSION_GROUP,
            CLUSTER_VERSION_VERSION,
            CLUSTER_VERSION_KIND,
        );
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &ar);

        // An unknown API group also answers 404, which get_opt folds into None
        match api.get_opt(CLUSTER_VERSION_NAME).await {
            Ok(Some(obj)) => Ok(Some(serde_json::to_value(obj)?)),
            Ok(None) => {
                debug!("ClusterVersion {} not present", CLUSTER_VERSION_NAME);
                Ok(None)
            }
            Err(e) => Err(Error::KubeError(e)),
        }
    }
}
