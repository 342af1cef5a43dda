//! ChannelRouting construction
//!
//! Turns resolved wires into the derived routing resource: one capability
//! group per contributing agent, owner-referenced to the channel so cluster
//! garbage collection ties their lifecycles together.

use crate::controllers::types::{Error, Result};
use crate::crds::{
    CapabilityGroup, Channel, ChannelRouting, ChannelRoutingSpec, ChannelScope, RoutedCapability,
    CHANNEL_LABEL_KEY, SUBSET_LABEL_KEY, TENANT_LABEL_KEY,
};
use crate::resolver::Wire;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

/// Builds the routing resource for a channel from its resolved wires.
///
/// Agents that contributed no wire get no group, so consumers can assert
/// that a group for a non-contributing agent does not exist. Returns a
/// whole, immutable resource; the caller applies it idempotently.
pub fn build_channel_routing(channel: &Channel, wires: &[Wire]) -> Result<ChannelRouting> {
    let scope = ChannelScope::of(channel);
    let name = scope.routing_name().ok_or_else(|| {
        Error::ConfigError(format!(
            "channel {} is missing tenant or channel labels",
            channel.name_any()
        ))
    })?;
    let owner = channel
        .controller_owner_ref(&())
        .ok_or(Error::MissingObjectKey)?;

    // BTreeMap keeps group order stable across reconciles.
    let mut groups: BTreeMap<String, Vec<RoutedCapability>> = BTreeMap::new();
    for wire in wires {
        let group_name = format!("{}-{}", wire.provider.name_any(), wire.provider.subset());
        groups.entry(group_name).or_default().push(RoutedCapability {
            name: wire.provided.name.clone(),
            provided_version: wire.provided.version.clone(),
        });
    }

    let capability_groups = groups
        .into_iter()
        .map(|(group_name, mut capabilities)| {
            capabilities.sort_by(|a, b| a.name.cmp(&b.name));
            CapabilityGroup {
                name: group_name,
                capabilities,
            }
        })
        .collect();

    let mut routing = ChannelRouting::new(&name, ChannelRoutingSpec { capability_groups });
    routing.metadata.namespace = channel.namespace();
    routing.metadata.owner_references = Some(vec![owner]);

    let mut labels = BTreeMap::new();
    if let Some(tenant) = scope.tenant {
        labels.insert(TENANT_LABEL_KEY.to_string(), tenant);
    }
    if let Some(chan) = scope.channel {
        labels.insert(CHANNEL_LABEL_KEY.to_string(), chan);
    }
    labels.insert(SUBSET_LABEL_KEY.to_string(), scope.subset);
    routing.metadata.labels = Some(labels);

    Ok(routing)
}

/// Names of routings owned by the channel that no longer match its current
/// routing name. Relabeling a channel changes the derived name, and the
/// apply under the new name leaves the old resource behind; these are the
/// leftovers the reconciler deletes.
pub fn stale_routing_names(
    routings: &[ChannelRouting],
    owner_uid: &str,
    keep: Option<&str>,
) -> Vec<String> {
    routings
        .iter()
        .filter(|routing| {
            routing
                .owner_references()
                .iter()
                .any(|owner| owner.uid == owner_uid)
        })
        .map(ResourceExt::name_any)
        .filter(|name| keep != Some(name.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{Agent, AgentSpec, ChannelSpec, ProvidedCapability, RequiredCapability, ResolveStrategy};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeSet;

    fn owned_channel() -> Channel {
        let mut channel = Channel::new(
            "ivr",
            ChannelSpec {
                required_capabilities: BTreeSet::new(),
            },
        );
        channel.metadata = ObjectMeta {
            name: Some("ivr".into()),
            namespace: Some("default".into()),
            uid: Some("11111111-2222-3333-4444-555555555555".into()),
            labels: Some(
                [
                    ("tenant".to_string(), "acme".to_string()),
                    ("channel".to_string(), "ivr".to_string()),
                ]
                .into(),
            ),
            ..Default::default()
        };
        channel
    }

    fn wire(agent_name: &str, capability: &str, version: &str) -> Wire {
        let mut agent = Agent::new(
            agent_name,
            AgentSpec {
                id: agent_name.into(),
                description: String::new(),
                supported_tenants: BTreeSet::new(),
                supported_channels: BTreeSet::new(),
                provided_capabilities: BTreeSet::new(),
            },
        );
        agent.metadata = ObjectMeta {
            name: Some(agent_name.into()),
            namespace: Some("default".into()),
            ..Default::default()
        };
        Wire {
            required: RequiredCapability {
                id: capability.into(),
                name: capability.into(),
                version: ">=1.0.0".into(),
                strategy: ResolveStrategy::Highest,
            },
            provided: ProvidedCapability {
                id: capability.into(),
                name: capability.into(),
                version: version.into(),
                description: String::new(),
                examples: Vec::new(),
            },
            provider: agent,
        }
    }

    #[test]
    fn groups_wires_by_contributing_agent() {
        let wires = vec![
            wire("billing", "view-bill", "1.0.0"),
            wire("billing", "download-bill", "1.1.0"),
            wire("contract", "view-contract", "2.0.0"),
        ];

        let routing = build_channel_routing(&owned_channel(), &wires).unwrap();

        assert_eq!(routing.name_unchecked(), "acme-ivr-stable");
        assert_eq!(routing.spec.capability_groups.len(), 2);

        let billing = &routing.spec.capability_groups[0];
        assert_eq!(billing.name, "billing-stable");
        assert_eq!(billing.capabilities.len(), 2);
        // Capabilities are sorted by name for stable output.
        assert_eq!(billing.capabilities[0].name, "download-bill");
        assert_eq!(billing.capabilities[0].provided_version, "1.1.0");
        assert_eq!(billing.capabilities[1].name, "view-bill");

        let contract = &routing.spec.capability_groups[1];
        assert_eq!(contract.name, "contract-stable");
    }

    #[test]
    fn non_contributing_agents_have_no_group() {
        let wires = vec![wire("billing", "view-bill", "1.0.0")];
        let routing = build_channel_routing(&owned_channel(), &wires).unwrap();

        assert!(routing
            .spec
            .capability_groups
            .iter()
            .all(|g| g.name != "contract-stable"));
    }

    #[test]
    fn routing_is_owned_by_the_channel() {
        let routing = build_channel_routing(&owned_channel(), &[]).unwrap();
        let owners = routing.metadata.owner_references.as_ref().unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "Channel");
        assert_eq!(owners[0].name, "ivr");
        assert_eq!(owners[0].controller, Some(true));
    }

    #[test]
    fn unlabeled_channel_cannot_build_routing() {
        let mut channel = owned_channel();
        channel.metadata.labels = None;
        assert!(build_channel_routing(&channel, &[]).is_err());
    }

    fn routing_owned_by(name: &str, owner_uid: &str) -> ChannelRouting {
        let mut routing = ChannelRouting::new(
            name,
            ChannelRoutingSpec {
                capability_groups: Vec::new(),
            },
        );
        routing.metadata.namespace = Some("default".into());
        routing.metadata.owner_references = Some(vec![
            k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference {
                api_version: "routing.platform/v1".into(),
                kind: "Channel".into(),
                name: "ivr".into(),
                uid: owner_uid.into(),
                controller: Some(true),
                ..Default::default()
            },
        ]);
        routing
    }

    #[test]
    fn relabeled_channel_leaves_its_old_routing_stale() {
        let uid = "11111111-2222-3333-4444-555555555555";
        let routings = vec![
            routing_owned_by("acme-ivr-stable", uid),
            routing_owned_by("acme-web-stable", uid),
        ];

        // Channel was relabeled from ivr to web; only the old name is stale.
        let stale = stale_routing_names(&routings, uid, Some("acme-web-stable"));
        assert_eq!(stale, vec!["acme-ivr-stable".to_string()]);
    }

    #[test]
    fn other_channels_routings_are_never_stale() {
        let routings = vec![routing_owned_by("acme-ivr-stable", "other-uid")];
        let stale = stale_routing_names(
            &routings,
            "11111111-2222-3333-4444-555555555555",
            Some("acme-web-stable"),
        );
        assert!(stale.is_empty());
    }

    #[test]
    fn unlabeled_channel_keeps_no_routing() {
        let uid = "11111111-2222-3333-4444-555555555555";
        let routings = vec![routing_owned_by("acme-ivr-stable", uid)];
        let stale = stale_routing_names(&routings, uid, None);
        assert_eq!(stale, vec!["acme-ivr-stable".to_string()]);
    }
}
