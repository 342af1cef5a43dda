//! Agent-to-channel event correlation
//!
//! Maps a changed Agent to the channels that must re-resolve. Filtering to
//! channels whose labels currently match the agent would miss the narrowing
//! case: when a tenant or channel is removed from an agent's supported sets,
//! the previously matching channels no longer match the filter and would
//! stay wrongly RESOLVED. Every channel in the agent's namespace is mapped
//! instead; per-namespace channel counts are small, so the extra reconciles
//! are cheap and convergence is guaranteed.

use crate::crds::{Agent, Channel};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::ResourceExt;

/// Mapper for the channel controller's Agent watch.
pub fn channels_for_agent(store: &Store<Channel>, agent: &Agent) -> Vec<ObjectRef<Channel>> {
    let namespace = agent.namespace();
    correlate(
        store.state().iter().map(std::convert::AsRef::as_ref),
        namespace.as_deref(),
    )
}

/// Every known channel in the given namespace.
pub(crate) fn correlate<'a>(
    channels: impl Iterator<Item = &'a Channel>,
    namespace: Option<&str>,
) -> Vec<ObjectRef<Channel>> {
    let Some(namespace) = namespace else {
        return Vec::new();
    };
    channels
        .filter(|channel| channel.namespace().as_deref() == Some(namespace))
        .map(|channel| ObjectRef::new(&channel.name_any()).within(namespace))
        .collect()
}
