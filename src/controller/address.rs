//! Master endpoint resolution
//!
//! The externally reachable endpoint is resolved through an ordered chain
//! of strategies, first success wins:
//!
//! 1. static agent address from configuration
//! 2. external ingress point of a LoadBalancer service
//! 3. the single host rule of an Ingress
//! 4. the host of an OpenShift Route
//!
//! A failing step only moves the chain on; the error of the last step that
//! was attempted is what the caller sees.
//!
//! [`master_addresses`] is a separate, advisory lookup of the API server
//! address and console URL used for display. It never fails.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use serde_yaml::Value as YamlValue;
use tracing::{debug, warn};
use url::Url;

use super::cluster_client::ClusterReader;
use super::unstructured::{nested_slice, nested_str};
use crate::config::{AgentConfig, NamespacedName, StaticEndpoint};
use crate::crd::{ApiServerAddress, EndpointSource, MasterEndpoint};
use crate::error::{Error, Result};

pub const DEFAULT_HTTPS_PORT: i32 = 443;

const CONSOLE_CONFIG_NAMESPACE: &str = "openshift-console";
const CONSOLE_CONFIG_NAME: &str = "console-config";
const CONSOLE_CONFIG_KEY: &str = "console-config.yaml";

/// One link of the resolution chain
#[async_trait]
pub trait EndpointStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` skips the step (nothing configured for it)
    async fn attempt(&self, cluster: &dyn ClusterReader) -> Result<Option<MasterEndpoint>>;
}

pub fn endpoint(address: &str, port: i32, source: EndpointSource) -> MasterEndpoint {
    let host = if address.contains(':') {
        format!("[{}]", address)
    } else {
        address.to_string()
    };
    MasterEndpoint {
        address: address.to_string(),
        port,
        source,
        url: format!("https://{}:{}", host, port),
    }
}

pub struct StaticAddress(pub Option<StaticEndpoint>);

#[async_trait]
impl EndpointStrategy for StaticAddress {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn attempt(&self, _cluster: &dyn ClusterReader) -> Result<Option<MasterEndpoint>> {
        Ok(self
            .0
            .as_ref()
            .map(|s| endpoint(&s.address, s.port, EndpointSource::Static)))
    }
}

pub struct LoadBalancerService(pub Option<NamespacedName>);

impl LoadBalancerService {
    fn endpoint_from(key: &NamespacedName, service: &Service) -> Result<MasterEndpoint> {
        let spec = service.spec.as_ref();
        let type_ = spec.and_then(|s| s.type_.as_deref()).unwrap_or("ClusterIP");
        if type_ != "LoadBalancer" {
            return Err(Error::ConfigError(format!(
                "service {} is of type {}, expected LoadBalancer",
                key, type_
            )));
        }

        let port = spec
            .and_then(|s| s.ports.as_ref())
            .and_then(|ports| ports.first())
            .map(|p| p.port)
            .ok_or_else(|| Error::DecodeError(format!("service {} declares no ports", key)))?;

        let address = service
            .status
            .as_ref()
            .and_then(|s| s.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref())
            .and_then(|ingress| {
                ingress.iter().find_map(|i| {
                    i.ip
                        .as_deref()
                        .filter(|ip| !ip.is_empty())
                        .or_else(|| i.hostname.as_deref().filter(|h| !h.is_empty()))
                })
            })
            .ok_or_else(|| {
                Error::EndpointPending(format!(
                    "load balancer of service {} has no ingress assigned yet",
                    key
                ))
            })?;

        Ok(endpoint(address, port, EndpointSource::LoadBalancerService))
    }
}

#[async_trait]
impl EndpointStrategy for LoadBalancerService {
    fn name(&self) -> &'static str {
        "service"
    }

    async fn attempt(&self, cluster: &dyn ClusterReader) -> Result<Option<MasterEndpoint>> {
        let Some(key) = &self.0 else {
            return Ok(None);
        };
        let service = cluster
            .get_service(key)
            .await?
            .ok_or_else(|| Error::NotFound(format!("service {}", key)))?;
        Self::endpoint_from(key, &service).map(Some)
    }
}

pub struct IngressRule(pub Option<NamespacedName>);

impl IngressRule {
    fn endpoint_from(key: &NamespacedName, ingress: &Ingress) -> Result<MasterEndpoint> {
        let rules = ingress
            .spec
            .as_ref()
            .and_then(|s| s.rules.as_ref())
            .map(Vec::as_slice)
            .unwrap_or_default();

        match rules {
            [rule] => match rule.host.as_deref().filter(|h| !h.is_empty()) {
                Some(host) => Ok(endpoint(host, DEFAULT_HTTPS_PORT, EndpointSource::Ingress)),
                None => Err(Error::AmbiguousEndpoint(format!(
                    "ingress {} rule has no host",
                    key
                ))),
            },
            _ => Err(Error::AmbiguousEndpoint(format!(
                "ingress {} has {} host rules, expected exactly one",
                key,
                rules.len()
            ))),
        }
    }
}

#[async_trait]
impl EndpointStrategy for IngressRule {
    fn name(&self) -> &'static str {
        "ingress"
    }

    async fn attempt(&self, cluster: &dyn ClusterReader) -> Result<Option<MasterEndpoint>> {
        let Some(key) = &self.0 else {
            return Ok(None);
        };
        let ingress = cluster
            .get_ingress(key)
            .await?
            .ok_or_else(|| Error::NotFound(format!("ingress {}", key)))?;
        Self::endpoint_from(key, &ingress).map(Some)
    }
}

pub struct RouteHost(pub Option<NamespacedName>);

impl RouteHost {
    /// Hosts of a route: `spec.host`, or the admitted hosts in
    /// `status.ingress[].host` when the spec leaves it to the router
    fn hosts(route: &serde_json::Value) -> Vec<String> {
        if let Some(host) = nested_str(route, &["spec", "host"]).filter(|h| !h.is_empty()) {
            return vec![host.to_string()];
        }
        let mut hosts: Vec<String> = Vec::new();
        for ingress in nested_slice(route, &["status", "ingress"]) {
            if let Some(host) = nested_str(ingress, &["host"]).filter(|h| !h.is_empty()) {
                if !hosts.iter().any(|h| h == host) {
                    hosts.push(host.to_string());
                }
            }
        }
        hosts
    }

    fn endpoint_from(key: &NamespacedName, route: &serde_json::Value) -> Result<MasterEndpoint> {
        match Self::hosts(route).as_slice() {
            [host] => Ok(endpoint(host, DEFAULT_HTTPS_PORT, EndpointSource::Route)),
            hosts => Err(Error::AmbiguousEndpoint(format!(
                "route {} has {} hosts, expected exactly one",
                key,
                hosts.len()
            ))),
        }
    }
}

#[async_trait]
impl EndpointStrategy for RouteHost {
    fn name(&self) -> &'static str {
        "route"
    }

    async fn attempt(&self, cluster: &dyn ClusterReader) -> Result<Option<MasterEndpoint>> {
        let Some(key) = &self.0 else {
            return Ok(None);
        };
        let route = cluster
            .get_route(key)
            .await?
            .ok_or_else(|| Error::NotFound(format!("route {}", key)))?;
        Self::endpoint_from(key, &route).map(Some)
    }
}

/// Ordered fallback chain of [`EndpointStrategy`]s
pub struct AddressResolver {
    strategies: Vec<Box<dyn EndpointStrategy>>,
}

impl AddressResolver {
    pub fn new(strategies: Vec<Box<dyn EndpointStrategy>>) -> Self {
        Self { strategies }
    }

    /// The standard chain: static, service, ingress, route
    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(vec![
            Box::new(StaticAddress(config.agent_address.clone())),
            Box::new(LoadBalancerService(config.agent_service.clone())),
            Box::new(IngressRule(config.agent_ingress.clone())),
            Box::new(RouteHost(config.agent_route.clone())),
        ])
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn resolve(&self, cluster: &dyn ClusterReader) -> Result<MasterEndpoint> {
        let mut last_error = None;

        for strategy in &self.strategies {
            match strategy.attempt(cluster).await {
                Ok(Some(endpoint)) => {
                    debug!(
                        "Resolved master endpoint {} via {}",
                        endpoint.url,
                        strategy.name()
                    );
                    return Ok(endpoint);
                }
                Ok(None) => {}
                Err(e) => {
                    debug!("Endpoint strategy {} failed: {}", strategy.name(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::ConfigError("no agent endpoint source configured".to_string())
        }))
    }
}

/// Advisory API server address and console URL
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MasterAddresses {
    /// Empty when nothing could be found
    pub address: String,
    /// 0 when unknown
    pub port: i32,
    pub cluster_url: String,
}

impl MasterAddresses {
    pub fn api_server(&self) -> Option<ApiServerAddress> {
        if self.address.is_empty() {
            return None;
        }
        Some(ApiServerAddress {
            address: self.address.clone(),
            port: self.port,
        })
    }
}

/// Host and port of an http(s) URL, the port defaulting by scheme
fn split_url(raw: &str) -> Option<(String, i32)> {
    let url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    // IPv6 literals come back bracketed
    let host = url.host_str()?.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return None;
    }
    let port = i32::from(url.port_or_known_default()?);
    Some((host.to_string(), port))
}

/// Read `clusterInfo.consoleBaseAddress` and `clusterInfo.masterPublicURL`
/// from the OpenShift console config
fn parse_console_config(raw: &str) -> (Option<String>, Option<(String, i32)>) {
    let doc: YamlValue = match serde_yaml::from_str(raw) {
        Ok(doc) => doc,
        Err(e) => {
            debug!("Console config is not valid YAML: {}", e);
            return (None, None);
        }
    };
    let cluster_info = &doc["clusterInfo"];
    let console = cluster_info["consoleBaseAddress"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let master = cluster_info["masterPublicURL"].as_str().and_then(split_url);
    (console, master)
}

async fn console_addresses(cluster: &dyn ClusterReader) -> (Option<String>, Option<(String, i32)>) {
    let key = NamespacedName::new(CONSOLE_CONFIG_NAMESPACE, CONSOLE_CONFIG_NAME);
    match cluster.get_config_map(&key).await {
        Ok(Some(cm)) => cm
            .data
            .as_ref()
            .and_then(|d| d.get(CONSOLE_CONFIG_KEY))
            .map(|raw| parse_console_config(raw))
            .unwrap_or((None, None)),
        Ok(None) => (None, None),
        Err(e) => {
            debug!("Failed to read console config {}: {}", key, e);
            (None, None)
        }
    }
}

async fn kubernetes_endpoint(cluster: &dyn ClusterReader) -> Option<(String, i32)> {
    let key = NamespacedName::new("default", "kubernetes");
    let endpoints = match cluster.get_endpoints(&key).await {
        Ok(endpoints) => endpoints?,
        Err(e) => {
            debug!("Failed to read endpoints {}: {}", key, e);
            return None;
        }
    };
    let subset = endpoints.subsets.as_ref()?.first()?;
    let address = subset.addresses.as_ref()?.first()?.ip.clone();
    let port = subset.ports.as_ref()?.first()?.port;
    Some((address, port))
}

/// Best-effort API server address and console URL for display
///
/// Prefers the public URLs of the OpenShift console config and falls back
/// to the `default/kubernetes` endpoints. Returns empty values instead of
/// failing.
pub async fn master_addresses(cluster: &dyn ClusterReader) -> MasterAddresses {
    let (console_url, master) = console_addresses(cluster).await;

    let (address, port) = match master {
        Some(master) => master,
        None => kubernetes_endpoint(cluster).await.unwrap_or_default(),
    };

    if address.is_empty() {
        warn!("Could not determine the API server address of the managed cluster");
    } else {
        debug!("API server address {}:{}", address, port);
    }

    MasterAddresses {
        address,
        port,
        cluster_url: console_url.unwrap_or_default(),
    }
}
