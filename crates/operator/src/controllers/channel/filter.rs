//! Candidate pre-filter for the resolver
//!
//! Narrows the agents of a namespace down to those eligible for a channel
//! before any version matching happens: the subset must be equal, the
//! tenant must be listed (an empty tenant set is a wildcard) and the channel
//! must be listed (no wildcard for channels).

use crate::crds::{Agent, Channel, ChannelScope};

#[derive(Debug, Clone)]
pub struct AgentFilter {
    scope: ChannelScope,
}

impl AgentFilter {
    pub fn for_channel(channel: &Channel) -> Self {
        AgentFilter {
            scope: ChannelScope::of(channel),
        }
    }

    pub fn matches(&self, agent: &Agent) -> bool {
        if agent.subset() != self.scope.subset {
            return false;
        }

        let tenants = &agent.spec.supported_tenants;
        let tenant_matches = tenants.is_empty()
            || self
                .scope
                .tenant
                .as_ref()
                .is_some_and(|tenant| tenants.contains(tenant));

        let channel_matches = self
            .scope
            .channel
            .as_ref()
            .is_some_and(|channel| agent.spec.supported_channels.contains(channel));

        tenant_matches && channel_matches
    }
}
