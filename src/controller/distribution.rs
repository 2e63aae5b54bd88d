//! Distribution detection
//!
//! OpenShift 4.x clusters expose a singleton `config.openshift.io/v1`
//! ClusterVersion named `version`. Its absence is the normal signal for a
//! generic Kubernetes distribution, not a failure.
//!
//! The object is read untyped and decoded field by field: a missing field
//! reads as empty, only a transport error fails detection.

use serde_json::Value;
use tracing::{debug, info};

use super::cluster_client::ClusterReader;
use super::unstructured::{nested, nested_slice, nested_str, nested_string};
use crate::crd::{DistributionInfo, DistributionType, UpdateRef};
use crate::error::Result;

/// Upper bound on `availableUpdates` kept in status
pub const MAX_AVAILABLE_UPDATES: usize = 10;

const HISTORY_STATE_COMPLETED: &str = "Completed";

fn update_ref(entry: &Value) -> Option<UpdateRef> {
    let version = nested_str(entry, &["version"]).filter(|v| !v.is_empty())?;
    Some(UpdateRef {
        version: version.to_string(),
        image: nested_string(entry, &["image"]),
    })
}

/// Version of the newest completed history entry
///
/// `status.history` is ordered newest first.
fn current_version(cluster_version: &Value) -> Option<String> {
    nested_slice(cluster_version, &["status", "history"])
        .iter()
        .filter(|h| nested_str(h, &["state"]) == Some(HISTORY_STATE_COMPLETED))
        .find_map(|h| nested_str(h, &["version"]).filter(|v| !v.is_empty()))
        .map(str::to_string)
}

/// Available updates in source order, deduplicated by version and capped
fn available_updates(cluster_version: &Value) -> Vec<UpdateRef> {
    let mut updates: Vec<UpdateRef> = Vec::new();
    for update in nested_slice(cluster_version, &["status", "availableUpdates"])
        .iter()
        .filter_map(update_ref)
    {
        if updates.len() == MAX_AVAILABLE_UPDATES {
            break;
        }
        if !updates.iter().any(|u| u.version == update.version) {
            updates.push(update);
        }
    }
    updates
}

fn upgrade_failed(cluster_version: &Value) -> bool {
    nested_slice(cluster_version, &["status", "conditions"])
        .iter()
        .any(|c| {
            nested_str(c, &["type"]) == Some("Failing") && nested_str(c, &["status"]) == Some("True")
        })
}

/// Decode a ClusterVersion object into distribution info
///
/// The distribution is only `EnterprisePlatform` when a non-empty version
/// could be read.
pub fn decode_cluster_version(cluster_version: &Value) -> DistributionInfo {
    let desired = nested(cluster_version, &["status", "desired"]).and_then(update_ref);

    let version = current_version(cluster_version)
        .or_else(|| desired.as_ref().map(|d| d.version.clone()))
        .unwrap_or_default();

    if version.is_empty() {
        debug!("ClusterVersion carries no version, treating distribution as generic");
    }

    DistributionInfo {
        type_: if version.is_empty() {
            DistributionType::Generic
        } else {
            DistributionType::EnterprisePlatform
        },
        version,
        channel: nested_string(cluster_version, &["spec", "channel"]),
        desired_update: desired,
        available_updates: available_updates(cluster_version),
        cluster_id: nested_string(cluster_version, &["spec", "clusterID"]),
        upgrade_failed: upgrade_failed(cluster_version),
    }
}

/// Determine the distribution of the managed cluster
///
/// Absence of the ClusterVersion object (or of its API group) yields a
/// generic distribution and no error.
pub async fn detect(cluster: &dyn ClusterReader) -> Result<DistributionInfo> {
    match cluster.get_cluster_version().await? {
        Some(cluster_version) => {
            let info = decode_cluster_version(&cluster_version);
            info!(
                "Detected {} distribution version {:?} (channel {:?})",
                info.type_, info.version, info.channel
            );
            Ok(info)
        }
        None => Ok(DistributionInfo::generic()),
    }
}
