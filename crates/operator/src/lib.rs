#![allow(clippy::missing_errors_doc, clippy::doc_markdown)]

//! Capability routing operator core library
//!
//! Keeps the capabilities required by Channels in sync with the capabilities
//! advertised by discovered Agents, and materializes the outcome as
//! ChannelRouting resources for the traffic-routing layer.

pub mod controllers;
pub mod crds;
pub mod resolver;

// Re-export commonly used types
pub use controllers::{run_operator, Context, Error, OperatorConfig, Result};
pub use crds::{
    Agent, AgentSpec, Channel, ChannelRouting, ChannelRoutingSpec, ChannelSpec, ChannelStatus,
    ProvidedCapability, RequiredCapability, ResolveStatus, ResolveStrategy,
};
pub use resolver::{resolve, Resolution, ResolverError, Wire};
