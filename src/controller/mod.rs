//! Controller module for ManagedClusterInfo reconciliation
//! This module contains the controller loop, the probes that observe the
//! managed cluster and the merge of their results into status.

pub mod address;
pub mod cluster_client;
pub mod conditions;
pub mod distribution;
pub mod nodes;
mod reconciler;
mod unstructured;
pub mod vendor;
pub mod version;

pub use address::{master_addresses, AddressResolver, EndpointStrategy, MasterAddresses};
pub use cluster_client::{ClusterInfoStore, ClusterReader, KubeClusterInfoStore, KubeClusterReader};
pub use reconciler::{
    merge_status, reconcile, run_controller, run_probes, sync_cluster_info, ControllerState,
    ProbeResults, ReconcilePhase, SyncOutcome,
};
