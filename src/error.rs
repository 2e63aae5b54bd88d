//! Error types for the cluster info agent

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API call failed (transport, authz, server errors)
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Status write rejected because the stored object changed underneath us
    #[error("Conflict updating {0}")]
    Conflict(String),

    /// A required object does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// The load balancer exists but has no ingress point assigned yet
    #[error("Endpoint pending: {0}")]
    EndpointPending(String),

    /// An ingress-style object has zero or several host rules
    #[error("Ambiguous endpoint: {0}")]
    AmbiguousEndpoint(String),

    /// An object has an unexpected shape
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Invalid agent configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The reconcile key cannot address a ManagedClusterInfo
    #[error("Invalid resource key: {0}")]
    InvalidKey(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl Error {
    /// Whether the controller should requeue quickly after this error
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::KubeError(e) => match e {
                kube::Error::Api(ae) => ae.code == 409 || ae.code == 429 || ae.code >= 500,
                _ => true,
            },
            Error::Conflict(_) | Error::EndpointPending(_) => true,
            Error::NotFound(_)
            | Error::AmbiguousEndpoint(_)
            | Error::DecodeError(_)
            | Error::ConfigError(_)
            | Error::InvalidKey(_)
            | Error::SerializationError(_) => false,
        }
    }

    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict(_) => true,
            Error::KubeError(kube::Error::Api(ae)) => ae.code == 409,
            _ => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
