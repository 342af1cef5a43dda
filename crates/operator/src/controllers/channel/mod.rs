//! Channel routing controller
//!
//! Watches Channels, owns their derived ChannelRouting and re-reconciles on
//! Agent changes through the correlator. Every reconcile recomputes the full
//! result from current state: filter the namespace's agents, resolve, patch
//! status, apply the routing resource.

pub mod correlator;
pub mod filter;
pub mod routing;

use self::filter::AgentFilter;
use crate::controllers::types::{Context, Error, Result, FIELD_MANAGER};
use crate::crds::{Agent, Channel, ChannelRouting, ChannelScope, ChannelStatus};
use crate::resolver::resolve;
use futures::StreamExt;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config;
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Runs the channel controller until the watch stream ends.
#[instrument(skip(client, context))]
pub async fn run(client: Client, context: Arc<Context>) -> Result<()> {
    info!("Starting channel routing controller");

    let channels: Api<Channel> = Api::all(client.clone());
    let agents: Api<Agent> = Api::all(client.clone());
    let routings: Api<ChannelRouting> = Api::all(client);
    let watcher_config = Config::default().any_semantic();

    let controller = Controller::new(channels, watcher_config.clone());
    let store = controller.store();

    controller
        .owns(routings, watcher_config.clone())
        .watches(agents, watcher_config, move |agent| {
            correlator::channels_for_agent(&store, &agent)
        })
        .run(reconcile_channel, error_policy, context)
        .for_each(|reconciliation_result| async move {
            match reconciliation_result {
                Ok(channel) => {
                    debug!(resource = ?channel, "Channel reconciliation successful");
                }
                Err(reconciliation_err) => {
                    error!(error = ?reconciliation_err, "Channel reconciliation error");
                }
            }
        })
        .await;

    info!("Channel routing controller shutting down");
    Ok(())
}

#[instrument(skip(ctx), fields(channel = %channel.name_any()))]
pub async fn reconcile_channel(channel: Arc<Channel>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = channel.namespace().ok_or(Error::MissingObjectKey)?;
    let name = channel.name_any();
    let scope = ChannelScope::of(&channel);

    if scope.routing_name().is_none() {
        // Without tenant/channel coordinates nothing can match and no
        // routing can be named; record the shortfall and wait for an edit.
        warn!(
            "Channel {}/{} is missing tenant or channel labels, all requirements unresolved",
            namespace, name
        );
        let status = ChannelStatus::from_unresolved(channel.spec.required_capabilities.clone());
        patch_status(&channel, &ctx, &status).await?;
        prune_stale_routings(&channel, &ctx, None).await?;
        return Ok(Action::await_change());
    }

    let agents: Api<Agent> = Api::namespaced(ctx.client.clone(), &namespace);
    let agent_filter = AgentFilter::for_channel(&channel);
    let candidates: Vec<Agent> = agents
        .list(&ListParams::default())
        .await?
        .items
        .into_iter()
        .filter(|agent| agent_filter.matches(agent))
        .collect();
    debug!(
        "{} candidate agent(s) for channel {}/{}",
        candidates.len(),
        namespace,
        name
    );

    let resolution = resolve(&channel.spec.required_capabilities, &candidates);

    let status = ChannelStatus::from_unresolved(resolution.unresolved.clone());
    patch_status(&channel, &ctx, &status).await?;

    let routing = routing::build_channel_routing(&channel, &resolution.wires)?;
    let routings: Api<ChannelRouting> = Api::namespaced(ctx.client.clone(), &namespace);
    routings
        .patch(
            &routing.name_unchecked(),
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&routing),
        )
        .await?;
    prune_stale_routings(&channel, &ctx, Some(&routing.name_unchecked())).await?;

    match resolution.into_result() {
        Ok(wires) => info!(
            channel = %name,
            wires = wires.len(),
            "Channel resolved"
        ),
        // An unresolved channel is an expected steady state (e.g. during a
        // rollout), reported as data, not as a reconcile error.
        Err(shortfall) => warn!(channel = %name, %shortfall, "Channel left unresolved"),
    }

    Ok(Action::await_change())
}

/// Deletes routings this channel owns under any name other than `keep`.
/// They appear when the channel's tenant, channel or subset labels change:
/// the apply happens under the new routing name and the old resource would
/// otherwise linger until the channel itself is deleted.
async fn prune_stale_routings(channel: &Channel, ctx: &Context, keep: Option<&str>) -> Result<()> {
    let Some(uid) = channel.uid() else {
        return Ok(());
    };
    let namespace = channel.namespace().ok_or(Error::MissingObjectKey)?;
    let routings: Api<ChannelRouting> = Api::namespaced(ctx.client.clone(), &namespace);
    let owned = routings.list(&ListParams::default()).await?.items;

    for name in routing::stale_routing_names(&owned, &uid, keep) {
        match routings.delete(&name, &DeleteParams::default()).await {
            Ok(_) => info!(
                "Deleted stale routing {}/{} for channel {}",
                namespace,
                name,
                channel.name_any()
            ),
            Err(kube::Error::Api(response)) if response.code == 404 => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

async fn patch_status(channel: &Channel, ctx: &Context, status: &ChannelStatus) -> Result<()> {
    let namespace = channel.namespace().ok_or(Error::MissingObjectKey)?;
    let channels: Api<Channel> = Api::namespaced(ctx.client.clone(), &namespace);
    channels
        .patch_status(
            &channel.name_any(),
            &PatchParams::default(),
            &Patch::Merge(&json!({ "status": status })),
        )
        .await?;
    Ok(())
}

/// Only infrastructure failures reach this policy; the control loop's
/// default fixed requeue retries them.
pub fn error_policy(channel: Arc<Channel>, err: &Error, _ctx: Arc<Context>) -> Action {
    warn!(
        error = %err,
        channel = %channel.name_any(),
        "Channel reconciliation failed, retrying"
    );
    Action::requeue(Duration::from_secs(5))
}
