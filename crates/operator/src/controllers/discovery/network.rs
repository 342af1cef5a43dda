//! Workload readiness and service address resolution

use crate::controllers::types::{Error, Result};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use tracing::debug;

/// A deployment is ready when every desired replica is observed available.
pub fn deployment_ready(deployment: &Deployment) -> bool {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    let Some(status) = deployment.status.as_ref() else {
        return false;
    };
    status.replicas == Some(desired) && status.available_replicas == Some(desired)
}

/// Resolves the in-cluster base URL of the single service fronting the
/// deployment. Zero or multiple matching services is a configuration error
/// for that workload, never a silent pick.
pub async fn service_base_url(client: &Client, deployment: &Deployment) -> Result<String> {
    let name = deployment.name_any();
    let namespace = deployment.namespace().ok_or(Error::MissingObjectKey)?;

    let selector = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.selector.match_labels.as_ref())
        .filter(|labels| !labels.is_empty())
        .ok_or_else(|| Error::MissingSelector {
            deployment: name.clone(),
        })?;

    let selector = selector
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",");

    let services: Api<Service> = Api::namespaced(client.clone(), &namespace);
    let matching = services
        .list(&ListParams::default().labels(&selector))
        .await?
        .items;

    if matching.len() != 1 {
        return Err(Error::AmbiguousService {
            deployment: name,
            found: matching.len(),
        });
    }

    let url = base_url(&matching[0]);
    debug!(deployment = %name, url = %url, "Resolved service URL");
    Ok(url)
}

fn base_url(service: &Service) -> String {
    let name = service.name_any();
    let namespace = service.namespace().unwrap_or_default();
    let port = service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_ref())
        .and_then(|ports| ports.first());

    let port_number = port.map_or(8080, |p| p.port);
    let is_https = port_number == 443
        || port
            .and_then(|p| p.name.as_deref())
            .is_some_and(|n| n.eq_ignore_ascii_case("https"));
    let protocol = if is_https { "https" } else { "http" };

    format!("{protocol}://{name}.{namespace}.svc.cluster.local:{port_number}")
}
