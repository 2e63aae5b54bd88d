//! Kubernetes version probe

use super::cluster_client::ClusterReader;
use crate::error::Result;

/// Read the `gitVersion` reported by the API server
///
/// One call, no retries; the error is returned as is.
pub async fn probe_version(cluster: &dyn ClusterReader) -> Result<String> {
    cluster.server_version().await
}
