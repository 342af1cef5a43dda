//! Capability value types shared by the CRDs and the discovery manifest

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A capability advertised by an agent, pinned to an exact semver version.
#[derive(
    Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "camelCase")]
pub struct ProvidedCapability {
    /// Capability identifier, unique within a single agent
    pub id: String,
    pub name: String,
    /// Exact version, must parse as semver
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Free-text usage examples, carried through for downstream consumers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

/// A capability a channel requires, expressed as a semver range.
#[derive(
    Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "camelCase")]
pub struct RequiredCapability {
    /// Must equal the id of a provided capability to match
    pub id: String,
    pub name: String,
    /// Semver range expression, e.g. ">=1.0.0"
    pub version: String,
    #[serde(default)]
    pub strategy: ResolveStrategy,
}

/// Tie-break policy when several provided versions satisfy a requirement.
#[derive(
    Deserialize,
    Serialize,
    Clone,
    Copy,
    Debug,
    JsonSchema,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResolveStrategy {
    /// Pick the maximum satisfying version
    #[default]
    Highest,
    /// Pick the minimum satisfying version
    Lowest,
}

impl std::fmt::Display for ResolveStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveStrategy::Highest => write!(f, "HIGHEST"),
            ResolveStrategy::Lowest => write!(f, "LOWEST"),
        }
    }
}

impl std::fmt::Display for RequiredCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.id, self.version, self.strategy)
    }
}
