//! clusterinfo-agent: reports observed facts of a managed cluster
//!
//! This crate reconciles the status of a `ManagedClusterInfo` resource with
//! the managed cluster's API endpoint, Kubernetes version, distribution and
//! node inventory.

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod leader;

pub use crate::error::{Error, Result};
