//! Capability resolution
//!
//! Pure matching of required capabilities against the provided capabilities
//! of a set of candidate agents. No I/O: the channel controller filters the
//! candidates (tenant/channel/subset) and persists the outcome; this module
//! only decides which provided capability, if any, satisfies each
//! requirement.
//!
//! Matching is per-requirement and independent: several requirements may
//! bind to the same agent, and the whole result is recomputed on every call.
//! "No match" is never an error here; it is reported through the
//! `unresolved` set, and [`ResolverError`] exists so callers can surface a
//! terminal shortfall without losing the partial wires.

use crate::crds::{Agent, ProvidedCapability, RequiredCapability, ResolveStrategy};
use semver::{Version, VersionReq};
use std::collections::BTreeSet;

/// A resolved binding from one requirement to one provided capability and
/// the agent that provides it.
#[derive(Debug, Clone)]
pub struct Wire {
    pub required: RequiredCapability,
    pub provided: ProvidedCapability,
    pub provider: Agent,
}

/// Outcome of a resolution pass. Requirements appear either as a wire or in
/// the unresolved set, never both and never dropped.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub wires: Vec<Wire>,
    pub unresolved: BTreeSet<RequiredCapability>,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// Converts the outcome into a result, keeping the partial wires on the
    /// error path so callers can still report what did resolve.
    pub fn into_result(self) -> Result<Vec<Wire>, ResolverError> {
        if self.unresolved.is_empty() {
            Ok(self.wires)
        } else {
            Err(ResolverError {
                wires: self.wires,
                unresolved: self.unresolved,
            })
        }
    }
}

/// Terminal resolution failure carrying partial results.
#[derive(Debug, Clone, thiserror::Error)]
#[error("required capabilities not resolved: {}", format_unresolved(.unresolved))]
pub struct ResolverError {
    pub wires: Vec<Wire>,
    pub unresolved: BTreeSet<RequiredCapability>,
}

fn format_unresolved(unresolved: &BTreeSet<RequiredCapability>) -> String {
    unresolved
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolves each required capability against the candidate agents.
///
/// A provided capability matches when its id equals the requirement's id and
/// its version satisfies the requirement's range. Among matches the strategy
/// picks the highest or lowest version; equal versions offered by several
/// agents are broken by agent identity (namespace, name) ascending, so the
/// choice is stable across reconciles and routing does not flap.
///
/// Malformed versions never abort the pass: a provided version that does not
/// parse is skipped as a candidate, and a requirement whose range expression
/// does not parse ends up unresolved.
pub fn resolve(required: &BTreeSet<RequiredCapability>, candidates: &[Agent]) -> Resolution {
    let mut resolution = Resolution::default();

    for requirement in required {
        let Ok(range) = VersionReq::parse(&requirement.version) else {
            resolution.unresolved.insert(requirement.clone());
            continue;
        };

        let mut matches: Vec<Candidate<'_>> = Vec::new();
        for agent in candidates {
            for provided in &agent.spec.provided_capabilities {
                if provided.id != requirement.id {
                    continue;
                }
                let Ok(version) = Version::parse(&provided.version) else {
                    continue;
                };
                if range.matches(&version) {
                    matches.push(Candidate {
                        version,
                        agent,
                        provided,
                    });
                }
            }
        }

        match select(matches, requirement.strategy) {
            Some(best) => resolution.wires.push(Wire {
                required: requirement.clone(),
                provided: best.provided.clone(),
                provider: best.agent.clone(),
            }),
            None => {
                resolution.unresolved.insert(requirement.clone());
            }
        }
    }

    resolution
}

struct Candidate<'a> {
    version: Version,
    agent: &'a Agent,
    provided: &'a ProvidedCapability,
}

fn select(matches: Vec<Candidate<'_>>, strategy: ResolveStrategy) -> Option<Candidate<'_>> {
    match strategy {
        // On equal versions the comparator prefers the smaller agent
        // identity, for both strategies.
        ResolveStrategy::Highest => matches.into_iter().max_by(|a, b| {
            a.version
                .cmp(&b.version)
                .then_with(|| b.agent.identity().cmp(&a.agent.identity()))
        }),
        ResolveStrategy::Lowest => matches.into_iter().min_by(|a, b| {
            a.version
                .cmp(&b.version)
                .then_with(|| a.agent.identity().cmp(&b.agent.identity()))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::AgentSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::ResourceExt;

    fn agent(name: &str, capabilities: &[(&str, &str)]) -> Agent {
        let mut agent = Agent::new(
            name,
            AgentSpec {
                id: name.to_string(),
                description: String::new(),
                supported_tenants: BTreeSet::new(),
                supported_channels: BTreeSet::new(),
                provided_capabilities: capabilities
                    .iter()
                    .map(|(id, version)| ProvidedCapability {
                        id: (*id).to_string(),
                        name: (*id).to_string(),
                        version: (*version).to_string(),
                        description: String::new(),
                        examples: Vec::new(),
                    })
                    .collect(),
            },
        );
        agent.metadata = ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        };
        agent
    }

    fn required(id: &str, range: &str, strategy: ResolveStrategy) -> RequiredCapability {
        RequiredCapability {
            id: id.to_string(),
            name: id.to_string(),
            version: range.to_string(),
            strategy,
        }
    }

    fn required_set(items: &[RequiredCapability]) -> BTreeSet<RequiredCapability> {
        items.iter().cloned().collect()
    }

    #[test]
    fn resolves_highest_satisfying_version() {
        let agents = vec![
            agent("billing-old", &[("view-bill", "1.0.0")]),
            agent("billing-new", &[("view-bill", "1.2.0")]),
        ];
        let required = required_set(&[required("view-bill", ">=1.0.0", ResolveStrategy::Highest)]);

        let resolution = resolve(&required, &agents);

        assert!(resolution.is_resolved());
        assert_eq!(resolution.wires.len(), 1);
        assert_eq!(resolution.wires[0].provided.version, "1.2.0");
        assert_eq!(resolution.wires[0].provider.name_unchecked(), "billing-new");
    }

    #[test]
    fn resolves_lowest_satisfying_version() {
        let agents = vec![
            agent("billing-old", &[("view-bill", "1.0.0")]),
            agent("billing-new", &[("view-bill", "1.2.0")]),
        ];
        let required = required_set(&[required("view-bill", ">=1.0.0", ResolveStrategy::Lowest)]);

        let resolution = resolve(&required, &agents);

        assert_eq!(resolution.wires[0].provided.version, "1.0.0");
    }

    #[test]
    fn unsatisfied_range_is_unresolved_with_no_wire() {
        let agents = vec![agent("billing", &[("view-bill", "1.0.0")])];
        let required = required_set(&[required("view-bill", ">=2.0.0", ResolveStrategy::Highest)]);

        let resolution = resolve(&required, &agents);

        assert!(!resolution.is_resolved());
        assert!(resolution.wires.is_empty());
        assert_eq!(resolution.unresolved.len(), 1);
    }

    #[test]
    fn unknown_capability_id_is_unresolved() {
        let agents = vec![agent("billing", &[("view-bill", "1.0.0")])];
        let required = required_set(&[required(
            "download-bill",
            ">=1.0.0",
            ResolveStrategy::Highest,
        )]);

        let resolution = resolve(&required, &agents);

        assert!(resolution.wires.is_empty());
        assert_eq!(resolution.unresolved.len(), 1);
    }

    #[test]
    fn equal_versions_break_ties_by_agent_identity() {
        // Both strategies must pick the lexicographically smaller agent.
        for strategy in [ResolveStrategy::Highest, ResolveStrategy::Lowest] {
            let agents = vec![
                agent("zeta-billing", &[("view-bill", "1.1.0")]),
                agent("alpha-billing", &[("view-bill", "1.1.0")]),
            ];
            let required = required_set(&[required("view-bill", ">=1.0.0", strategy)]);

            let resolution = resolve(&required, &agents);

            assert_eq!(
                resolution.wires[0].provider.name_unchecked(),
                "alpha-billing",
                "strategy {strategy}"
            );
        }
    }

    #[test]
    fn one_agent_can_satisfy_multiple_requirements() {
        let agents = vec![agent(
            "billing",
            &[("view-bill", "1.0.0"), ("download-bill", "1.1.0")],
        )];
        let required = required_set(&[
            required("view-bill", ">=1.0.0", ResolveStrategy::Highest),
            required("download-bill", ">=1.0.0", ResolveStrategy::Highest),
        ]);

        let resolution = resolve(&required, &agents);

        assert!(resolution.is_resolved());
        assert_eq!(resolution.wires.len(), 2);
    }

    #[test]
    fn malformed_provided_version_is_skipped() {
        let agents = vec![
            agent("broken", &[("view-bill", "not-a-version")]),
            agent("billing", &[("view-bill", "1.0.0")]),
        ];
        let required = required_set(&[required("view-bill", ">=1.0.0", ResolveStrategy::Highest)]);

        let resolution = resolve(&required, &agents);

        assert_eq!(resolution.wires[0].provider.name_unchecked(), "billing");
    }

    #[test]
    fn malformed_requirement_range_is_unresolved() {
        let agents = vec![agent("billing", &[("view-bill", "1.0.0")])];
        let required = required_set(&[required("view-bill", "not a range", ResolveStrategy::Highest)]);

        let resolution = resolve(&required, &agents);

        assert!(resolution.wires.is_empty());
        assert_eq!(resolution.unresolved.len(), 1);
    }

    #[test]
    fn resolution_is_idempotent() {
        let agents = vec![
            agent("billing", &[("view-bill", "1.0.0"), ("view-bill-2", "2.0.0")]),
            agent("contract", &[("view-contract", "1.3.5")]),
        ];
        let required = required_set(&[
            required("view-bill", ">=1.0.0", ResolveStrategy::Highest),
            required("view-contract", ">=1.0.0", ResolveStrategy::Lowest),
            required("missing", ">=1.0.0", ResolveStrategy::Highest),
        ]);

        let first = resolve(&required, &agents);
        let second = resolve(&required, &agents);

        assert_eq!(first.unresolved, second.unresolved);
        assert_eq!(first.wires.len(), second.wires.len());
        for (a, b) in first.wires.iter().zip(second.wires.iter()) {
            assert_eq!(a.required, b.required);
            assert_eq!(a.provided, b.provided);
            assert_eq!(a.provider.identity(), b.provider.identity());
        }
    }

    #[test]
    fn into_result_keeps_partial_wires_on_failure() {
        let agents = vec![agent("billing", &[("view-bill", "1.0.0")])];
        let required = required_set(&[
            required("view-bill", ">=1.0.0", ResolveStrategy::Highest),
            required("missing", ">=1.0.0", ResolveStrategy::Highest),
        ]);

        let err = resolve(&required, &agents).into_result().unwrap_err();

        assert_eq!(err.wires.len(), 1);
        assert_eq!(err.unresolved.len(), 1);
        assert!(err.to_string().contains("missing"));
    }
}
