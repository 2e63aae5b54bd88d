//! Custom Resource Definitions for the cluster info agent

mod cluster_info;
pub mod types;


pub use cluster_info::{ManagedClusterInfo, ManagedClusterInfoSpec, ManagedClusterInfoStatus};
pub use types::*;
