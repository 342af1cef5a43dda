//! `Channel` Custom Resource Definition
//!
//! A channel is a routing endpoint (e.g. "web", "ivr") declared by an
//! external actor. Tenant, channel id and subset are carried as labels;
//! `.spec` holds the required capabilities. The operator owns the status
//! subresource and recomputes it fully on every reconcile.

use super::capability::RequiredCapability;
use super::{CHANNEL_LABEL_KEY, SUBSET_DEFAULT, SUBSET_LABEL_KEY, TENANT_LABEL_KEY};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(group = "routing.platform", version = "v1", kind = "Channel")]
#[kube(namespaced)]
#[kube(status = "ChannelStatus")]
#[kube(printcolumn = r#"{"name":"Resolved","type":"string","jsonPath":".status.resolveStatus"}"#)]
#[kube(printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSpec {
    #[serde(default)]
    pub required_capabilities: BTreeSet<RequiredCapability>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStatus {
    pub resolve_status: ResolveStatus,
    #[serde(default)]
    pub unresolved_required_capabilities: BTreeSet<RequiredCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
}

impl ChannelStatus {
    /// Builds a status from the set of requirements left unresolved,
    /// keeping the invariant that RESOLVED means an empty unresolved set.
    pub fn from_unresolved(unresolved: BTreeSet<RequiredCapability>) -> Self {
        let resolve_status = if unresolved.is_empty() {
            ResolveStatus::Resolved
        } else {
            ResolveStatus::Unresolved
        };
        ChannelStatus {
            resolve_status,
            unresolved_required_capabilities: unresolved,
            last_update: Some(chrono::Utc::now().to_rfc3339()),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResolveStatus {
    Resolved,
    Unresolved,
}

/// Tenant/channel/subset coordinates read from a Channel's labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelScope {
    pub tenant: Option<String>,
    pub channel: Option<String>,
    pub subset: String,
}

impl ChannelScope {
    pub fn of(channel: &Channel) -> Self {
        let labels = channel.labels();
        ChannelScope {
            tenant: labels.get(TENANT_LABEL_KEY).cloned(),
            channel: labels.get(CHANNEL_LABEL_KEY).cloned(),
            subset: labels
                .get(SUBSET_LABEL_KEY)
                .cloned()
                .unwrap_or_else(|| SUBSET_DEFAULT.to_string()),
        }
    }

    /// Routing resources are named after the full scope, e.g. `acme-ivr-stable`.
    /// Returns `None` when the tenant or channel label is missing.
    pub fn routing_name(&self) -> Option<String> {
        let tenant = self.tenant.as_deref()?;
        let channel = self.channel.as_deref()?;
        Some(format!("{tenant}-{channel}-{}", self.subset))
    }
}
