//! `ChannelRouting` Custom Resource Definition
//!
//! Derived resource consumed by the traffic router. The channel controller
//! owns it completely: it is rebuilt from scratch on every reconcile and
//! garbage-collected with its owning Channel through the owner reference.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(group = "routing.platform", version = "v1", kind = "ChannelRouting")]
#[kube(namespaced)]
#[kube(printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#)]
#[kube(derive = "PartialEq")]
#[serde(rename_all = "camelCase")]
pub struct ChannelRoutingSpec {
    /// One group per agent that contributed at least one resolved wire
    #[serde(default)]
    pub capability_groups: Vec<CapabilityGroup>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityGroup {
    /// `<agentName>-<agentSubset>`
    pub name: String,
    pub capabilities: Vec<RoutedCapability>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoutedCapability {
    pub name: String,
    /// Exact version the wire resolved to
    pub provided_version: String,
}
