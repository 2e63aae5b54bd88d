//! Main reconciler for ManagedClusterInfo resources
//!
//! Implements the controller pattern using kube-rs runtime. One pass walks
//! the phases Fetching, Probing, Merging and Persisting and ends in Done or
//! Failed. Probe failures are folded into the Synced condition; only fetch
//! and persist failures fail the pass.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::{
    api::Api,
    client::Client,
    runtime::{
        controller::{Action, Controller},
        watcher::Config,
    },
    ResourceExt,
};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{AgentConfig, NamespacedName};
use crate::crd::{
    DistributionInfo, ManagedClusterInfo, ManagedClusterInfoStatus, MasterEndpoint,
};
use crate::error::{Error, Result};

use super::address::{master_addresses, AddressResolver, MasterAddresses};
use super::cluster_client::{ClusterInfoStore, ClusterReader};
use super::conditions::{aggregate, set_synced, ProbeOutcome};
use super::distribution;
use super::nodes::{self, NodeInventory};
use super::vendor::kube_vendor;
use super::version::probe_version;

pub const PROBE_ADDRESS: &str = "address";
pub const PROBE_VERSION: &str = "version";
pub const PROBE_DISTRIBUTION: &str = "distribution";
pub const PROBE_NODES: &str = "nodes";

/// Requeue delay while another replica holds the lease
const NOT_LEADER_REQUEUE: Duration = Duration::from_secs(10);

/// Shared state for the controller
pub struct ControllerState {
    pub store: Arc<dyn ClusterInfoStore>,
    pub cluster: Arc<dyn ClusterReader>,
    pub resolver: AddressResolver,
    pub resync_interval: Duration,
    pub is_leader: Arc<AtomicBool>,
}

impl ControllerState {
    pub fn new(
        config: &AgentConfig,
        store: Arc<dyn ClusterInfoStore>,
        cluster: Arc<dyn ClusterReader>,
    ) -> Self {
        Self {
            store,
            cluster,
            resolver: AddressResolver::from_config(config),
            resync_interval: config.resync_interval,
            is_leader: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Share a leadership flag maintained by leader election
    pub fn with_leader_flag(mut self, is_leader: Arc<AtomicBool>) -> Self {
        self.is_leader = is_leader;
        self
    }
}

/// Phases of one reconciliation pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcilePhase {
    Fetching,
    Probing,
    Merging,
    Persisting,
    Done,
    Failed,
}

impl fmt::Display for ReconcilePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            ReconcilePhase::Fetching => "Fetching",
            ReconcilePhase::Probing => "Probing",
            ReconcilePhase::Merging => "Merging",
            ReconcilePhase::Persisting => "Persisting",
            ReconcilePhase::Done => "Done",
            ReconcilePhase::Failed => "Failed",
        };
        write!(f, "{phase}")
    }
}

/// How a successful pass ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The object is gone; nothing to do
    Missing,
    /// The merged status equals the stored one; no write issued
    Unchanged,
    /// A new status was written
    Updated,
}

/// Main entry point to start the controller
///
/// Watches the ManagedClusterInfo named after the managed cluster, in
/// `namespace` or in all namespaces.
pub async fn run_controller(
    client: Client,
    namespace: Option<&str>,
    cluster_name: &str,
    state: Arc<ControllerState>,
) -> Result<()> {
    let infos: Api<ManagedClusterInfo> = match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };

    info!(
        "Starting ManagedClusterInfo controller for cluster {} (endpoint sources: {:?})",
        cluster_name,
        state.resolver.strategy_names()
    );

    // Verify CRD exists
    match infos.list(&Default::default()).await {
        Ok(_) => info!("ManagedClusterInfo CRD is available"),
        Err(e) => {
            error!(
                "ManagedClusterInfo CRD not found. Please install the CRD first: {:?}",
                e
            );
            return Err(Error::ConfigError(
                "ManagedClusterInfo CRD not installed".to_string(),
            ));
        }
    }

    let watcher_config = Config::default().fields(&format!("metadata.name={cluster_name}"));

    Controller::new(infos, watcher_config)
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok(obj) => debug!("Reconciled: {:?}", obj),
                Err(e) => error!("Reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

/// Derive the store key of an object
pub fn object_key(obj: &ManagedClusterInfo) -> Result<NamespacedName> {
    let name = obj
        .metadata
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::InvalidKey("object has no name".to_string()))?;
    let namespace = obj
        .metadata
        .namespace
        .as_deref()
        .filter(|ns| !ns.is_empty())
        .ok_or_else(|| Error::InvalidKey(format!("{name} has no namespace")))?;
    Ok(NamespacedName::new(namespace, name))
}

/// The main reconciliation function
///
/// Called whenever the watched ManagedClusterInfo changes and whenever the
/// resync timer expires.
#[instrument(skip(obj, ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
pub async fn reconcile(obj: Arc<ManagedClusterInfo>, ctx: Arc<ControllerState>) -> Result<Action> {
    if !ctx.is_leader.load(Ordering::Relaxed) {
        debug!("Not the leader, skipping reconciliation");
        return Ok(Action::requeue(NOT_LEADER_REQUEUE));
    }

    let key = match object_key(&obj) {
        Ok(key) => key,
        Err(e) => {
            warn!("{}: {}", ReconcilePhase::Failed, e);
            return Err(e);
        }
    };

    match sync_cluster_info(&ctx, &key).await {
        Ok(outcome) => {
            debug!("{} {}: {:?}", ReconcilePhase::Done, key, outcome);
            Ok(Action::requeue(ctx.resync_interval))
        }
        Err(e) => {
            warn!("{} {}: {}", ReconcilePhase::Failed, key, e);
            Err(e)
        }
    }
}

/// Run one pass against the object stored under `key`
pub async fn sync_cluster_info(ctx: &ControllerState, key: &NamespacedName) -> Result<SyncOutcome> {
    debug!("{} {}", ReconcilePhase::Fetching, key);
    let Some(mut info) = ctx.store.get(key).await? else {
        info!("ManagedClusterInfo {} not found, nothing to do", key);
        return Ok(SyncOutcome::Missing);
    };

    debug!("{} {}", ReconcilePhase::Probing, key);
    let probes = run_probes(ctx).await;

    let mut retried = false;
    loop {
        debug!("{} {}", ReconcilePhase::Merging, key);
        let previous = info.status.clone().unwrap_or_default();
        let status = merge_status(&previous, &probes, info.metadata.generation);

        if status == previous {
            debug!("Status of {} unchanged, skipping write", key);
            return Ok(SyncOutcome::Unchanged);
        }

        debug!("{} {}", ReconcilePhase::Persisting, key);
        match ctx.store.update_status(&info, &status).await {
            Ok(()) => {
                info!("Updated status of ManagedClusterInfo {}", key);
                return Ok(SyncOutcome::Updated);
            }
            Err(Error::NotFound(_)) => {
                info!("ManagedClusterInfo {} deleted during reconciliation", key);
                return Ok(SyncOutcome::Missing);
            }
            Err(e) if e.is_conflict() && !retried => {
                warn!("Conflict writing status of {}, re-fetching once", key);
                retried = true;
                info = match ctx.store.get(key).await? {
                    Some(latest) => latest,
                    None => return Ok(SyncOutcome::Missing),
                };
            }
            Err(e) => return Err(e),
        }
    }
}

/// Raw outcome of every probe of one pass
pub struct ProbeResults {
    pub endpoint: Result<MasterEndpoint>,
    pub version: Result<String>,
    pub distribution: Result<DistributionInfo>,
    pub nodes: Result<NodeInventory>,
    pub master: MasterAddresses,
}

/// Invoke every probe; one failing probe does not stop the others
///
/// The probes only read, so they run concurrently.
pub async fn run_probes(ctx: &ControllerState) -> ProbeResults {
    let cluster = ctx.cluster.as_ref();
    let (endpoint, version, distribution, nodes, master) = futures::join!(
        ctx.resolver.resolve(cluster),
        probe_version(cluster),
        distribution::detect(cluster),
        nodes::summarize(cluster),
        master_addresses(cluster),
    );
    ProbeResults {
        endpoint,
        version,
        distribution,
        nodes,
        master,
    }
}

fn record<T>(outcomes: &mut Vec<ProbeOutcome>, probe: &'static str, result: &Result<T>) -> bool {
    match result {
        Ok(_) => {
            outcomes.push(ProbeOutcome::ok(probe));
            true
        }
        Err(e) => {
            warn!("Probe {} failed: {}", probe, e);
            outcomes.push(ProbeOutcome::failed(probe, e));
            false
        }
    }
}

/// Patch the previous status with whatever the probes found
///
/// Starts from a copy of `previous` so that a failed probe keeps the last
/// known value of the fields it supplies.
pub fn merge_status(
    previous: &ManagedClusterInfoStatus,
    probes: &ProbeResults,
    generation: Option<i64>,
) -> ManagedClusterInfoStatus {
    let mut status = previous.clone();
    let mut outcomes = Vec::with_capacity(4);

    if record(&mut outcomes, PROBE_ADDRESS, &probes.endpoint) {
        status.master_endpoint = probes.endpoint.as_ref().ok().cloned();
    }

    record(&mut outcomes, PROBE_VERSION, &probes.version);
    record(&mut outcomes, PROBE_DISTRIBUTION, &probes.distribution);
    record(&mut outcomes, PROBE_NODES, &probes.nodes);

    if let Ok(distribution) = &probes.distribution {
        status.distribution = Some(distribution.clone());
    }
    if let Ok(inventory) = &probes.nodes {
        status.node_summary = Some(inventory.summary.clone());
        status.cloud_vendor = Some(inventory.cloud_vendor);
    }
    if let Ok(version) = &probes.version {
        status.kubernetes_version = Some(version.clone());
        status.kube_vendor = Some(kube_vendor(
            version,
            status.distribution.as_ref().map(|d| d.type_),
            status.cloud_vendor,
        ));
    }

    if let Some(api_server) = probes.master.api_server() {
        status.api_server = Some(api_server);
    }
    if !probes.master.cluster_url.is_empty() {
        status.console_url = Some(probes.master.cluster_url.clone());
    }

    status.observed_generation = generation;
    set_synced(&mut status.conditions, &aggregate(&outcomes), generation);

    status
}

/// Error policy determines how to handle reconciliation errors
fn error_policy(info: Arc<ManagedClusterInfo>, error: &Error, _ctx: Arc<ControllerState>) -> Action {
    error!("Reconciliation error for {}: {:?}", info.name_any(), error);

    // Use shorter retry for retriable errors
    let retry_duration = if error.is_retriable() {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(60)
    };

    Action::requeue(retry_duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    #[test]
    fn test_object_key() {
        let mut info = ManagedClusterInfo::new("cluster1", Default::default());
        assert!(matches!(object_key(&info), Err(Error::InvalidKey(_))));

        info.metadata.namespace = Some("cluster1".to_string());
        let key = object_key(&info).unwrap();
        assert_eq!(key, NamespacedName::new("cluster1", "cluster1"));

        let unnamed = ManagedClusterInfo {
            metadata: ObjectMeta {
                namespace: Some("cluster1".to_string()),
                ..Default::default()
            },
            spec: Default::default(),
            status: None,
        };
        assert!(matches!(object_key(&unnamed), Err(Error::InvalidKey(_))));
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(ReconcilePhase::Fetching.to_string(), "Fetching");
        assert_eq!(ReconcilePhase::Failed.to_string(), "Failed");
    }
}
