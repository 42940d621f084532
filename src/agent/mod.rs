//! Agents: identity, configuration and the registry that wires the
//! subscription graph.
//!
//! Identities are immutable for the run. The registry keeps registration
//! order, which is also the order used to resolve environment write
//! conflicts.

pub mod identity;
pub mod profile;
pub mod registry;

pub use identity::{AgentIdentity, ParamValue};
pub use profile::{validate_agent_config, AgentConfig};
pub use registry::{AgentRegistry, SubscriptionEdge, ValidationResult};
