//! `Agent` Custom Resource Definition
//!
//! Agents are not created by users: the discovery controller materializes one
//! for every ready deployment that answers the well-known capabilities
//! endpoint, and deletes it again when the deployment goes away.

use super::capability::ProvidedCapability;
use super::{SUBSET_DEFAULT, SUBSET_LABEL_KEY};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(group = "routing.platform", version = "v1", kind = "Agent")]
#[kube(namespaced)]
#[kube(printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpec {
    /// Identifier reported by the workload's capability manifest
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Tenants this agent serves; empty means any tenant
    #[serde(default)]
    pub supported_tenants: BTreeSet<String>,
    /// Channels this agent serves; no wildcard, empty matches nothing
    #[serde(default)]
    pub supported_channels: BTreeSet<String>,
    #[serde(default)]
    pub provided_capabilities: BTreeSet<ProvidedCapability>,
}

impl Agent {
    /// Deployment ring this agent belongs to, from the `subset` label.
    pub fn subset(&self) -> &str {
        self.labels()
            .get(SUBSET_LABEL_KEY)
            .map_or(SUBSET_DEFAULT, String::as_str)
    }

    /// Stable ordering key used to break version ties deterministically.
    pub fn identity(&self) -> (String, String) {
        (self.namespace().unwrap_or_default(), self.name_any())
    }
}
