//! Agent discovery controller
//!
//! Watches deployments labeled `capability-agent=true`. Once a deployment is
//! fully available, the controller resolves its service address, fetches the
//! well-known capability manifest over HTTP and materializes it as an Agent
//! resource. The upsert is a server-side apply, so repeating it is harmless;
//! deleting the deployment removes the Agent through a finalizer.

pub mod client;
pub mod network;
pub mod retry;

use self::client::CapabilityManifest;
use self::retry::RetryPolicy;
use crate::controllers::types::{
    Context, Error, Result, AGENT_LABEL_SELECTOR, CAPABILITIES_PATH_ANNOTATION,
    DISCOVERY_FINALIZER_NAME, FIELD_MANAGER,
};
use crate::crds::{Agent, AgentSpec, AGENT_ID_LABEL_KEY, SUBSET_DEFAULT, SUBSET_LABEL_KEY};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{DeleteParams, Patch, PatchParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::finalizer::{finalizer, Event as FinalizerEvent};
use kube::runtime::watcher::Config;
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Runs the discovery controller until the watch stream ends.
#[instrument(skip(client, context))]
pub async fn run(client: Client, context: Arc<Context>) -> Result<()> {
    info!("Starting agent discovery controller");

    let deployments: Api<Deployment> = Api::all(client);
    let watcher_config = Config::default()
        .labels(AGENT_LABEL_SELECTOR)
        .any_semantic();

    Controller::new(deployments, watcher_config)
        .run(reconcile_deployment, error_policy, context)
        .for_each(|reconciliation_result| async move {
            match reconciliation_result {
                Ok(deployment) => {
                    debug!(resource = ?deployment, "Discovery reconciliation successful");
                }
                Err(reconciliation_err) => {
                    error!(error = ?reconciliation_err, "Discovery reconciliation error");
                }
            }
        })
        .await;

    info!("Agent discovery controller shutting down");
    Ok(())
}

#[instrument(skip(ctx), fields(deployment = %deployment.name_any()))]
pub async fn reconcile_deployment(
    deployment: Arc<Deployment>,
    ctx: Arc<Context>,
) -> Result<Action> {
    let namespace = deployment.namespace().ok_or(Error::MissingObjectKey)?;
    let deployments: Api<Deployment> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(
        &deployments,
        DISCOVERY_FINALIZER_NAME,
        deployment,
        |event| async {
            match event {
                FinalizerEvent::Apply(d) => discover_agent(d, &ctx).await,
                FinalizerEvent::Cleanup(d) => delete_agent(d, &ctx).await,
            }
        },
    )
    .await
    .map_err(|e| match e {
        kube::runtime::finalizer::Error::ApplyFailed(err)
        | kube::runtime::finalizer::Error::CleanupFailed(err) => err,
        kube::runtime::finalizer::Error::AddFinalizer(e)
        | kube::runtime::finalizer::Error::RemoveFinalizer(e) => Error::KubeError(e),
        kube::runtime::finalizer::Error::UnnamedObject => Error::MissingObjectKey,
        kube::runtime::finalizer::Error::InvalidFinalizer => {
            Error::ConfigError("Invalid finalizer name".to_string())
        }
    })
}

async fn discover_agent(deployment: Arc<Deployment>, ctx: &Context) -> Result<Action> {
    let name = deployment.name_any();
    let namespace = deployment.namespace().ok_or(Error::MissingObjectKey)?;

    if !network::deployment_ready(&deployment) {
        // Control-loop poll, not an error: the deployment is still rolling out.
        debug!("Deployment {} not fully available, re-checking later", name);
        return Ok(Action::requeue(ctx.config.discovery.not_ready_requeue()));
    }

    let base_url = network::service_base_url(&ctx.client, &deployment).await?;
    let path = deployment
        .annotations()
        .get(CAPABILITIES_PATH_ANNOTATION)
        .map_or(ctx.config.discovery.well_known_path.as_str(), String::as_str);
    let manifest = ctx.discovery.fetch_manifest(&base_url, path).await?;

    let agent = agent_from_manifest(&deployment, manifest);
    let agents: Api<Agent> = Api::namespaced(ctx.client.clone(), &namespace);
    agents
        .patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&agent),
        )
        .await?;

    info!("Upserted Agent {}/{} from discovered manifest", namespace, name);
    ctx.retries.reset(&retry_key(&deployment));
    Ok(Action::await_change())
}

async fn delete_agent(deployment: Arc<Deployment>, ctx: &Context) -> Result<Action> {
    let name = deployment.name_any();
    let namespace = deployment.namespace().ok_or(Error::MissingObjectKey)?;
    let agents: Api<Agent> = Api::namespaced(ctx.client.clone(), &namespace);

    match agents.delete(&name, &DeleteParams::default()).await {
        Ok(_) => info!("Deleted Agent {}/{} for removed deployment", namespace, name),
        Err(kube::Error::Api(response)) if response.code == 404 => {
            debug!("Agent {}/{} already absent", namespace, name);
        }
        Err(e) => return Err(e.into()),
    }

    ctx.retries.reset(&retry_key(&deployment));
    Ok(Action::await_change())
}

/// Builds the Agent mirroring a discovered manifest, labeled with the
/// deployment's subset and the manifest id.
fn agent_from_manifest(deployment: &Deployment, manifest: CapabilityManifest) -> Agent {
    let subset = deployment
        .labels()
        .get(SUBSET_LABEL_KEY)
        .cloned()
        .unwrap_or_else(|| SUBSET_DEFAULT.to_string());

    let mut agent = Agent::new(
        &deployment.name_any(),
        AgentSpec {
            id: manifest.id.clone(),
            description: manifest.description,
            supported_tenants: manifest.supported_tenants,
            supported_channels: manifest.supported_channels,
            provided_capabilities: manifest.capabilities.into_iter().collect(),
        },
    );
    agent.metadata.namespace = deployment.namespace();
    agent.metadata.labels = Some(
        [
            (SUBSET_LABEL_KEY.to_string(), subset),
            (AGENT_ID_LABEL_KEY.to_string(), manifest.id),
        ]
        .into(),
    );
    agent
}

fn retry_key(deployment: &Deployment) -> String {
    format!(
        "{}/{}",
        deployment.namespace().unwrap_or_default(),
        deployment.name_any()
    )
}

/// Applies the configured bounded exponential backoff to failed discovery
/// reconciles; once the attempt budget is spent the failure stays logged and
/// the deployment is left alone until it changes again.
///
/// Only failures of the discovery protocol itself consume the budget.
/// Kubernetes call failures (e.g. the Agent apply hitting a flaky apiserver)
/// stay on a fixed requeue so the write eventually lands.
pub fn error_policy(deployment: Arc<Deployment>, err: &Error, ctx: Arc<Context>) -> Action {
    if !is_discovery_failure(err) {
        warn!(
            error = %err,
            deployment = %deployment.name_any(),
            "Discovery reconciliation failed on a Kubernetes call, retrying"
        );
        return infrastructure_retry();
    }

    let key = retry_key(&deployment);
    let attempt = ctx.retries.record_failure(&key);
    let policy = RetryPolicy::from(&ctx.config.discovery.retry);

    match policy.delay_for(attempt) {
        Some(delay) => {
            warn!(
                error = %err,
                deployment = %deployment.name_any(),
                attempt,
                "Discovery failed, retrying with backoff"
            );
            Action::requeue(delay)
        }
        None => {
            error!(
                error = %err,
                deployment = %deployment.name_any(),
                "Discovery retries exhausted, waiting for the deployment to change"
            );
            ctx.retries.reset(&key);
            Action::await_change()
        }
    }
}

fn infrastructure_retry() -> Action {
    Action::requeue(Duration::from_secs(5))
}

/// True for failures of the discovery protocol: no resolvable service, an
/// unreachable endpoint or an unusable manifest. Everything else is an
/// infrastructure failure outside the backoff budget.
fn is_discovery_failure(err: &Error) -> bool {
    matches!(
        err,
        Error::MissingSelector { .. }
            | Error::AmbiguousService { .. }
            | Error::DiscoveryRequest { .. }
            | Error::DiscoveryStatus { .. }
            | Error::EmptyManifest { .. }
            | Error::ManifestDecode { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeSet;

    fn discovered_deployment(labels: &[(&str, &str)]) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some("billing".into()),
                namespace: Some("default".into()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn manifest() -> CapabilityManifest {
        CapabilityManifest {
            id: "billing-agent".into(),
            description: "Billing agent".into(),
            supported_tenants: BTreeSet::from(["acme".to_string()]),
            supported_channels: BTreeSet::from(["ivr".to_string(), "web".to_string()]),
            capabilities: vec![crate::crds::ProvidedCapability {
                id: "view-bill-id".into(),
                name: "view-bill".into(),
                version: "1.0.0".into(),
                description: String::new(),
                examples: Vec::new(),
            }],
        }
    }

    #[test]
    fn agent_mirrors_manifest_and_deployment_identity() {
        let deployment = discovered_deployment(&[("capability-agent", "true")]);
        let agent = agent_from_manifest(&deployment, manifest());

        assert_eq!(agent.name_unchecked(), "billing");
        assert_eq!(agent.metadata.namespace.as_deref(), Some("default"));
        assert_eq!(agent.spec.id, "billing-agent");
        assert!(agent.spec.supported_channels.contains("ivr"));
        assert_eq!(agent.spec.provided_capabilities.len(), 1);
    }

    #[test]
    fn agent_labels_carry_subset_and_manifest_id() {
        let deployment =
            discovered_deployment(&[("capability-agent", "true"), ("subset", "canary")]);
        let agent = agent_from_manifest(&deployment, manifest());

        let labels = agent.metadata.labels.as_ref().unwrap();
        assert_eq!(labels.get("subset").map(String::as_str), Some("canary"));
        assert_eq!(
            labels.get("agent-id").map(String::as_str),
            Some("billing-agent")
        );
    }

    #[test]
    fn agent_subset_defaults_to_stable() {
        let deployment = discovered_deployment(&[("capability-agent", "true")]);
        let agent = agent_from_manifest(&deployment, manifest());
        assert_eq!(agent.subset(), "stable");
    }

    #[test]
    fn kubernetes_write_failures_keep_the_fixed_retry() {
        let apply_failure = Error::KubeError(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".into(),
            message: "etcdserver: request timed out".into(),
            reason: "InternalError".into(),
            code: 500,
        }));

        assert!(!is_discovery_failure(&apply_failure));
        assert!(!is_discovery_failure(&Error::MissingObjectKey));
        assert_eq!(
            infrastructure_retry(),
            Action::requeue(Duration::from_secs(5))
        );
    }

    #[test]
    fn protocol_failures_consume_the_backoff_budget() {
        let policy = RetryPolicy::from(&crate::controllers::config::RetryConfig::default());
        let failures = [
            Error::MissingSelector {
                deployment: "billing".into(),
            },
            Error::AmbiguousService {
                deployment: "billing".into(),
                found: 2,
            },
            Error::DiscoveryStatus {
                url: "http://billing.default.svc.cluster.local:8080/.well-known/capabilities.json"
                    .into(),
                status: 503,
            },
            Error::EmptyManifest {
                url: "http://billing.default.svc.cluster.local:8080/.well-known/capabilities.json"
                    .into(),
            },
        ];

        for failure in &failures {
            assert!(is_discovery_failure(failure), "{failure}");
        }
        assert!(policy.delay_for(1).is_some());
        assert!(policy.delay_for(4).is_none());
    }
}
