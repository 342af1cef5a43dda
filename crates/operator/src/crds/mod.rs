//! Custom Resource Definitions for the capability routing operator

pub mod agent;
pub mod capability;
pub mod channel;
pub mod channelrouting;

pub use agent::{Agent, AgentSpec};
pub use capability::{ProvidedCapability, RequiredCapability, ResolveStrategy};
pub use channel::{Channel, ChannelScope, ChannelSpec, ChannelStatus, ResolveStatus};
pub use channelrouting::{CapabilityGroup, ChannelRouting, ChannelRoutingSpec, RoutedCapability};

/// Label partitioning agents and channels into deployment rings.
pub const SUBSET_LABEL_KEY: &str = "subset";
pub const SUBSET_DEFAULT: &str = "stable";

/// Labels carrying a channel's routing coordinates.
pub const TENANT_LABEL_KEY: &str = "tenant";
pub const CHANNEL_LABEL_KEY: &str = "channel";

/// Label a discovered agent gets stamped with, carrying the manifest id.
pub const AGENT_ID_LABEL_KEY: &str = "agent-id";
