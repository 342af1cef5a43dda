//! Shared context and error types for the reconcilers

use super::config::OperatorConfig;
use super::discovery::client::DiscoveryClient;
use super::discovery::retry::RetryTracker;
use kube::Client;
use std::sync::Arc;
use thiserror::Error;

/// Field manager for server-side apply writes.
pub const FIELD_MANAGER: &str = "capability-operator";

/// Label selector for deployments that take part in capability discovery.
pub const AGENT_LABEL_SELECTOR: &str = "capability-agent=true";

/// Annotation overriding the well-known capabilities path per workload.
pub const CAPABILITIES_PATH_ANNOTATION: &str = "routing.platform/capabilities-path";

/// Finalizer guarding Agent cleanup when a discovered deployment is deleted.
pub const DISCOVERY_FINALIZER_NAME: &str = "routing.platform/discovery-cleanup";

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("object has no name or namespace")]
    MissingObjectKey,

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("deployment {deployment} has no selector labels")]
    MissingSelector { deployment: String },

    #[error("expected exactly one service for deployment {deployment}, found {found}")]
    AmbiguousService { deployment: String, found: usize },

    #[error("discovery request to {url} failed: {source}")]
    DiscoveryRequest {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("discovery endpoint {url} returned status {status}")]
    DiscoveryStatus { url: String, status: u16 },

    #[error("discovery endpoint {url} returned an empty body")]
    EmptyManifest { url: String },

    #[error("failed to decode capability manifest from {url}: {source}")]
    ManifestDecode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Shared state handed to every reconcile invocation.
#[derive(Clone)]
pub struct Context {
    pub client: Client,
    pub config: Arc<OperatorConfig>,
    pub discovery: DiscoveryClient,
    pub retries: RetryTracker,
}
