//! Agent configuration
//!
//! Values come from CLI flags / environment variables (see `main.rs`) and
//! are validated once at start-up so that reconciliation never has to deal
//! with malformed configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(60);

/// `namespace/name` reference to a namespaced object
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl FromStr for NamespacedName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(ns, name))
            }
            _ => Err(Error::ConfigError(format!(
                "expected namespace/name, got {:?}",
                s
            ))),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Preconfigured agent address, used verbatim by the resolver
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticEndpoint {
    pub address: String,
    pub port: i32,
}

impl FromStr for StaticEndpoint {
    type Err = Error;

    /// Parses `host:port`; IPv6 hosts must be bracketed (`[::1]:8000`)
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::ConfigError(format!("expected host:port, got {:?}", s));

        let (host, port) = s.rsplit_once(':').ok_or_else(invalid)?;
        let host = match host.strip_prefix('[') {
            Some(inner) => inner.strip_suffix(']').ok_or_else(invalid)?,
            None if host.contains(':') => return Err(invalid()),
            None => host,
        };
        if host.is_empty() {
            return Err(invalid());
        }

        let port: u16 = port.parse().map_err(|_| invalid())?;
        if port == 0 {
            return Err(invalid());
        }

        Ok(Self {
            address: host.to_string(),
            port: i32::from(port),
        })
    }
}

/// Runtime configuration of the agent
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Name of the managed cluster this agent reports for
    pub cluster_name: String,
    pub agent_address: Option<StaticEndpoint>,
    pub agent_service: Option<NamespacedName>,
    pub agent_ingress: Option<NamespacedName>,
    pub agent_route: Option<NamespacedName>,
    pub resync_interval: Duration,
}

impl AgentConfig {
    /// Build and validate a configuration from raw flag values
    pub fn from_parts(
        cluster_name: &str,
        agent_address: Option<&str>,
        agent_service: Option<&str>,
        agent_ingress: Option<&str>,
        agent_route: Option<&str>,
        resync_interval_secs: u64,
    ) -> Result<Self> {
        if cluster_name.trim().is_empty() {
            return Err(Error::ConfigError("cluster name must not be empty".to_string()));
        }
        if resync_interval_secs == 0 {
            return Err(Error::ConfigError(
                "resync interval must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            cluster_name: cluster_name.to_string(),
            agent_address: non_empty(agent_address).map(str::parse::<StaticEndpoint>).transpose()?,
            agent_service: non_empty(agent_service).map(str::parse::<NamespacedName>).transpose()?,
            agent_ingress: non_empty(agent_ingress).map(str::parse::<NamespacedName>).transpose()?,
            agent_route: non_empty(agent_route).map(str::parse::<NamespacedName>).transpose()?,
            resync_interval: Duration::from_secs(resync_interval_secs),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
