//! Mindgraph: a tick-driven multi-agent runtime.
//!
//! Agents wrap a language-model call, perceive a shared environment and each
//! other through receiver-filtered messages, reason privately, and keep an
//! append-only versioned private state.

pub mod agent;
pub mod config;
pub mod environment;
pub mod error;
pub mod feeds;
pub mod lens;
pub mod logging;
pub mod message;
pub mod mind;
pub mod percept;
pub mod provider;
pub mod router;
pub mod runtime;
pub mod store;
pub mod tools;
pub mod types;

pub use agent::{AgentIdentity, ParamValue};
pub use environment::{EnvironmentState, EnvironmentUpdate};
pub use error::{ModelError, RoutingError, RuntimeError, StorageError};
pub use feeds::{DataFeed, DataFeedRegistry};
pub use lens::{Lens, LensConfig, PerceptionFilter};
pub use message::{Payload, Projection, ProjectionRequest, Signal};
pub use mind::{MindConfig, MindMode, StateUpdate};
pub use percept::Percept;
pub use runtime::{GraphRuntime, TickReport};
pub use store::{PrivateContent, PrivateStateEnvelope, PrivateStateStore};
pub use types::{AgentId, Tick};
