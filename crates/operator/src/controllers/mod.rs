//! Reconciliation control loops
//!
//! Two independent controllers run concurrently: agent discovery (watching
//! deployments) and channel routing (watching channels, their routings and
//! agents). The kube runtime serializes reconciles per resource instance;
//! across instances and kinds everything runs in parallel against the
//! cluster store only.

pub mod channel;
pub mod config;
pub mod discovery;
pub mod types;

pub use config::OperatorConfig;
pub use types::{Context, Error, Result};

use discovery::client::DiscoveryClient;
use discovery::retry::RetryTracker;
use kube::Client;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Main entry point: wires up shared context and runs both controllers
/// until they stop.
#[instrument(skip(client, config))]
pub async fn run_operator(client: Client, config: OperatorConfig) -> Result<()> {
    info!("Starting capability routing operator");

    if let Err(validation_error) = config.validate() {
        error!("Configuration validation failed: {}", validation_error);
        return Err(Error::ConfigError(validation_error));
    }

    let discovery_client = DiscoveryClient::new(config.discovery.request_timeout())?;
    let context = Arc::new(Context {
        client: client.clone(),
        config: Arc::new(config),
        discovery: discovery_client,
        retries: RetryTracker::new(),
    });

    let discovery_handle = tokio::spawn({
        let client = client.clone();
        let context = context.clone();
        async move { discovery::run(client, context).await }
    });

    let channel_handle = tokio::spawn({
        let context = context.clone();
        async move { channel::run(client, context).await }
    });

    match tokio::try_join!(discovery_handle, channel_handle) {
        Ok((discovery_result, channel_result)) => {
            if let Err(e) = discovery_result {
                error!("Discovery controller failed: {:?}", e);
            }
            if let Err(e) = channel_result {
                error!("Channel controller failed: {:?}", e);
            }
        }
        Err(e) => {
            error!("Controller task join error: {:?}", e);
        }
    }

    info!("Operator shutting down");
    Ok(())
}
